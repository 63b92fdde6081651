//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use cnet_security::config::Config;
use cnet_security::context::SecurityContext;
use cnet_security::server::{build_router, AppState};
use tempfile::TempDir;

/// Configuration whose token file lives inside `dir`
pub fn create_test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.tokens.path = dir.path().join("tokens.json").display().to_string();
    config
}

/// Build a context from the default configuration in a fresh directory
///
/// The directory must outlive the context.
pub fn create_test_context() -> (Arc<SecurityContext>, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let context = SecurityContext::from_config(&create_test_config(&dir))
        .expect("Failed to build security context");
    (Arc::new(context), dir)
}

/// Run a test server in the background and return the address
/// The server will be shut down when the returned shutdown sender is dropped or sent
pub async fn run_test_server(
    context: Arc<SecurityContext>,
) -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to get local address");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let app = build_router(AppState::new(context))
        .layer(tower_http::trace::TraceLayer::new_for_http());

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        })
        .await
        .expect("Server error");
    });

    // Give the server a moment to start
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    (addr, shutdown_tx)
}

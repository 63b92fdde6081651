//! HTTP front end for cnet-security
//!
//! Serves the security middleware in front of a small router. Requests reach
//! the handlers only after the auth chains accepted them and no rate limit
//! refused them.

pub mod middleware;
pub mod router;

pub use middleware::{
    logging_middleware, security_middleware, SecurityRejection, RATE_LIMITED_MESSAGE,
};
pub use router::{build_router, AppState, HealthResponse, WhoAmIResponse};

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;

/// Configured but not yet listening server
pub struct Server {
    config: ServerConfig,
    state: AppState,
}

/// A server holding its listener, ready to accept connections
pub struct BoundServer {
    listener: TcpListener,
    app: Router,
}

impl Server {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Address from the configuration, unparsable hosts bind to all interfaces
    pub fn bind_addr(&self) -> SocketAddr {
        let ip = self
            .config
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        SocketAddr::new(ip, self.config.port)
    }

    /// Open the listener without serving yet
    pub async fn bind(self) -> Result<BoundServer, ServerError> {
        let addr = self.bind_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        Ok(BoundServer {
            listener,
            app: build_router(self.state).layer(TraceLayer::new_for_http()),
        })
    }

    /// Bind and serve until `shutdown` resolves
    pub async fn run(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        self.bind().await?.serve(shutdown).await
    }
}

impl BoundServer {
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::Serve)
    }

    /// Serve with peer addresses attached, so IP limits key on the caller
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let addr = self.local_addr()?;
        info!(addr = %addr, "Server listening");

        axum::serve(
            self.listener,
            self.app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ServerError::Serve)?;

        info!(addr = %addr, "Server stopped");
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

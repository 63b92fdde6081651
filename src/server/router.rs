//! HTTP router for cnet-security
//!
//! This module defines the axum router guarded by the security middleware.
//! It provides routes for:
//! - Health checks
//! - Inspecting the authenticated caller

use axum::{
    extract::Extension,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::AuthenticatedToken;
use crate::context::SecurityContext;

use super::middleware::{logging_middleware, security_middleware};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Security components consulted on every request
    pub context: Arc<SecurityContext>,
}

impl AppState {
    pub fn new(context: Arc<SecurityContext>) -> Self {
        Self { context }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Caller identity response
#[derive(Debug, Serialize, Deserialize)]
pub struct WhoAmIResponse {
    pub authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    #[serde(default)]
    pub permissions: usize,
}

/// Build the main application router
///
/// Every route passes through [`security_middleware`]; paths that should be
/// reachable anonymously are configured as auth exclusions.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/whoami", get(whoami_handler))
        .fallback(not_found_handler)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            security_middleware,
        ))
        .layer(middleware::from_fn(logging_middleware))
        .with_state(state)
}

/// Health check endpoint handler
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn not_found_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "not found" })),
    )
}

/// Report which token, if any, authenticated this request
async fn whoami_handler(token: Option<Extension<AuthenticatedToken>>) -> impl IntoResponse {
    let response = match token {
        Some(Extension(AuthenticatedToken(token))) => WhoAmIResponse {
            authenticated: true,
            token_id: Some(format!("{:016x}", token.id())),
            permissions: token.permissions().len(),
        },
        None => WhoAmIResponse {
            authenticated: false,
            token_id: None,
            permissions: 0,
        },
    };
    Json(response)
}

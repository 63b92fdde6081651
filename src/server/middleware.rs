//! HTTP middleware for cnet-security
//!
//! This module provides middleware layers for:
//! - Authentication and rate limiting through the
//!   [`SecurityContext`](crate::context::SecurityContext)
//! - Request/response logging

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Instant;

use crate::exchange::{self, Exchange, HttpMethod};

use super::router::AppState;

/// Body sent with every 429 response
pub const RATE_LIMITED_MESSAGE: &str = "You have been rate limited!";

/// Security middleware function
///
/// This middleware:
/// 1. Builds an [`Exchange`] from the request
/// 2. Runs it through the auth chains and rejects with 401 on failure
/// 3. Counts it against the rate limits and rejects with 429 when exceeded
/// 4. Hands the session storage to the handler as request extensions
/// 5. Copies the collected rate limit headers onto the response
pub async fn security_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Ok(method) = HttpMethod::try_from(request.method()) else {
        return SecurityRejection::new(StatusCode::METHOD_NOT_ALLOWED, "unsupported method")
            .into_response();
    };

    let view = exchange::Request::new(method, request.uri().path())
        .with_domain(domain_of(request.headers()))
        .with_ip(client_ip(&request))
        .with_headers(request.headers().clone());
    let mut exchange = Exchange::new(view);

    let context = &state.context;
    match context.authenticate(&mut exchange) {
        Ok(result) if result.is_cancelled() => {
            return SecurityRejection::new(StatusCode::UNAUTHORIZED, result.cancel_reason())
                .into_response();
        }
        Ok(_) => {}
        Err(e) => {
            tracing::error!(error = %e, "Security context is missing its auth chains");
            return SecurityRejection::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
                .into_response();
        }
    }

    let limited = match context.is_rate_limited(&mut exchange) {
        Ok(limited) => limited,
        Err(e) => {
            tracing::error!(error = %e, "Security context is missing its rate limits");
            return SecurityRejection::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
                .into_response();
        }
    };

    let (storage, rate_headers) = exchange.into_parts();
    if limited {
        return SecurityRejection::new(StatusCode::TOO_MANY_REQUESTS, RATE_LIMITED_MESSAGE)
            .with_headers(rate_headers)
            .into_response();
    }

    request.extensions_mut().extend(storage.into_extensions());
    let mut response = next.run(request).await;
    append_headers(response.headers_mut(), &rate_headers);
    response
}

/// Caller address: the socket peer if known, else the first X-Forwarded-For hop
fn client_ip(request: &Request) -> IpAddr {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip();
    }

    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Host header without the port
fn domain_of(headers: &HeaderMap) -> String {
    let Some(host) = headers.get(header::HOST).and_then(|v| v.to_str().ok()) else {
        return String::new();
    };

    if let Some(rest) = host.strip_prefix('[') {
        // bracketed IPv6 literal
        return rest.split(']').next().unwrap_or_default().to_string();
    }
    host.split(':').next().unwrap_or_default().to_string()
}

fn append_headers(target: &mut HeaderMap, source: &HeaderMap) {
    for (name, value) in source {
        target.append(name.clone(), value.clone());
    }
}

/// JSON error response produced by the security middleware
pub struct SecurityRejection {
    status: StatusCode,
    message: String,
    headers: HeaderMap,
}

impl SecurityRejection {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            headers: HeaderMap::new(),
        }
    }

    fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

impl IntoResponse for SecurityRejection {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message
        });
        let mut response = (self.status, Json(body)).into_response();
        append_headers(response.headers_mut(), &self.headers);
        response
    }
}

/// Logging middleware function
///
/// Logs request and response details including:
/// - Method and path
/// - Status code
/// - Response time
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    let elapsed = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        path = %uri.path(),
        status = %status.as_u16(),
        duration_ms = %elapsed.as_millis(),
        "Request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::HeaderValue;

    // Test 1: Host header parsing
    #[test]
    fn test_domain_of() {
        let mut headers = HeaderMap::new();
        assert_eq!(domain_of(&headers), "");

        headers.insert(header::HOST, HeaderValue::from_static("api.example.com:8080"));
        assert_eq!(domain_of(&headers), "api.example.com");

        headers.insert(header::HOST, HeaderValue::from_static("example.org"));
        assert_eq!(domain_of(&headers), "example.org");

        headers.insert(header::HOST, HeaderValue::from_static("[::1]:8080"));
        assert_eq!(domain_of(&headers), "::1");
    }

    // Test 2: Peer address wins over X-Forwarded-For
    #[test]
    fn test_client_ip() {
        let forwarded = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&forwarded), "203.0.113.7".parse::<IpAddr>().unwrap());

        let mut peer = Request::builder()
            .header("x-forwarded-for", "203.0.113.7")
            .body(Body::empty())
            .unwrap();
        let addr: SocketAddr = "192.0.2.1:5000".parse().unwrap();
        peer.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(client_ip(&peer), addr.ip());

        let bare = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_ip(&bare), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }

    // Test 3: Rejections carry a JSON error body and extra headers
    #[tokio::test]
    async fn test_rejection_response() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-limit", HeaderValue::from_static("IP=1"));

        let response = SecurityRejection::new(StatusCode::TOO_MANY_REQUESTS, RATE_LIMITED_MESSAGE)
            .with_headers(headers)
            .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["x-ratelimit-limit"], "IP=1");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], RATE_LIMITED_MESSAGE);
    }
}

//! Bearer token authentication
//!
//! Validates `Authorization: Bearer cnet_<id><secret>` against the
//! [`TokenManager`] and checks the token's permissions for the request.

use std::sync::Arc;

use axum::http::header::AUTHORIZATION;

use crate::exchange::{Request, SessionStorage};
use crate::models::Token;

use super::adapter::{fail_auth, AuthAdapter, INVALID_TOKEN_REASON, NO_ACCESS_REASON};
use super::manager::TokenManager;
use super::result::AuthResult;
use super::token::{parse_bearer, verify_secret};

const BEARER_SCHEME: &str = "Bearer";

/// Session storage entry holding the token that authenticated the request
#[derive(Debug, Clone)]
pub struct AuthenticatedToken(pub Arc<Token>);

/// Auth adapter for `cnet_` bearer tokens
#[derive(Debug, Clone)]
pub struct TokenAuthAdapter {
    tokens: Arc<TokenManager>,
}

impl TokenAuthAdapter {
    pub fn new(tokens: Arc<TokenManager>) -> Self {
        Self { tokens }
    }

    /// Resolve the bearer credential to a registered token
    fn resolve(&self, request: &Request) -> Option<Arc<Token>> {
        let header = request.headers().get(AUTHORIZATION)?.to_str().ok()?;

        let mut parts = header.split(' ');
        let (scheme, credential) = (parts.next()?, parts.next()?);
        if parts.next().is_some() || !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
            return None;
        }

        let (id, secret) = parse_bearer(credential)?;
        let token = self.tokens.get(id)?;
        verify_secret(secret, token.hash()).then_some(token)
    }
}

impl AuthAdapter for TokenAuthAdapter {
    fn authenticate(&self, result: &mut AuthResult, request: &Request, storage: &mut SessionStorage) {
        let Some(token) = self.resolve(request) else {
            fail_auth(result, request, INVALID_TOKEN_REASON);
            return;
        };

        if !token.allows(request.method(), request.domain(), request.url()) {
            fail_auth(result, request, NO_ACCESS_REASON);
            return;
        }

        self.tokens.events().token_used(&token);
        storage.insert(AuthenticatedToken(token));
    }

    fn name(&self) -> &str {
        "token"
    }
}

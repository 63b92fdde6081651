//! Built-in rate limit adapters

use crate::auth::AuthenticatedToken;
use crate::exchange::{Request, SessionStorage};

use super::adapter::{RateLimitAdapter, RateLimitSettings};
use super::index::{IndexSource, RateLimitIndex};

/// Counts requests per caller address
///
/// Defaults to one request per 60 second window under the id `IP`.
#[derive(Debug, Clone)]
pub struct IpRateLimitAdapter {
    settings: RateLimitSettings,
}

impl IpRateLimitAdapter {
    pub const ID: &'static str = "IP";
    pub const DEFAULT_MAX: u64 = 1;

    pub fn new() -> Self {
        Self::with_settings(RateLimitSettings::builtin(Self::ID, Self::DEFAULT_MAX))
    }

    pub fn with_settings(settings: RateLimitSettings) -> Self {
        Self { settings }
    }
}

impl Default for IpRateLimitAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitAdapter for IpRateLimitAdapter {
    fn settings(&self) -> &RateLimitSettings {
        &self.settings
    }

    fn adapt(&self, request: &Request, _storage: &SessionStorage) -> Option<RateLimitIndex> {
        Some(RateLimitIndex::scoped(self.id(), IndexSource::Ip(request.ip())))
    }
}

/// Counts requests per authenticated token
///
/// Skips requests that carry no [`AuthenticatedToken`]. Defaults to 60
/// requests per 60 second window under the id `TOKEN`.
#[derive(Debug, Clone)]
pub struct TokenRateLimitAdapter {
    settings: RateLimitSettings,
}

impl TokenRateLimitAdapter {
    pub const ID: &'static str = "TOKEN";
    pub const DEFAULT_MAX: u64 = 60;

    pub fn new() -> Self {
        Self::with_settings(RateLimitSettings::builtin(Self::ID, Self::DEFAULT_MAX))
    }

    pub fn with_settings(settings: RateLimitSettings) -> Self {
        Self { settings }
    }
}

impl Default for TokenRateLimitAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitAdapter for TokenRateLimitAdapter {
    fn settings(&self) -> &RateLimitSettings {
        &self.settings
    }

    fn adapt(&self, _request: &Request, storage: &SessionStorage) -> Option<RateLimitIndex> {
        let AuthenticatedToken(token) = storage.get::<AuthenticatedToken>()?;
        Some(RateLimitIndex::scoped(self.id(), IndexSource::Token(token.id())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::HttpMethod;
    use crate::models::Token;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;

    // Test 1: Defaults
    #[test]
    fn test_defaults() {
        let ip = IpRateLimitAdapter::new();
        assert_eq!(ip.id(), "IP");
        assert_eq!(ip.max(), 1);
        assert_eq!(ip.window_ms(), 60_000);
        assert!(ip.include_headers());

        let token = TokenRateLimitAdapter::default();
        assert_eq!(token.id(), "TOKEN");
        assert_eq!(token.max(), 60);
    }

    // Test 2: The IP adapter keys on the caller address
    #[test]
    fn test_ip_adapt() {
        let addr = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20));
        let request = Request::new(HttpMethod::Get, "/").with_ip(addr);

        let index = IpRateLimitAdapter::new()
            .adapt(&request, &SessionStorage::new())
            .unwrap();
        assert_eq!(index, RateLimitIndex::scoped("IP", IndexSource::Ip(addr)));
    }

    // Test 3: The token adapter opts out without a token
    #[test]
    fn test_token_adapt() {
        let adapter = TokenRateLimitAdapter::new();
        let request = Request::new(HttpMethod::Get, "/");
        let mut storage = SessionStorage::new();

        assert!(adapter.adapt(&request, &storage).is_none());

        storage.insert(AuthenticatedToken(Arc::new(Token::new(42, "hash"))));
        assert_eq!(
            adapter.adapt(&request, &storage),
            Some(RateLimitIndex::scoped("TOKEN", IndexSource::Token(42)))
        );
    }
}

//! Security context
//!
//! The explicit registry of every security component. One context is built
//! at startup and shared by reference with the HTTP layer; tests build a
//! fresh one each.
//!
//! Components are optional. Asking for one that was never installed is a
//! [`ContextError::NotRegistered`].

use std::sync::Arc;

use tracing::info;

use crate::auth::{
    AuthChain, AuthChainManager, AuthResult, JsonFileStore, SimpleAuthChain, TokenAuthAdapter,
    TokenManager,
};
use crate::config::Config;
use crate::error::{AppError, ContextError};
use crate::events::EventBus;
use crate::exchange::Exchange;
use crate::ratelimit::{IpRateLimitAdapter, RateLimitManager, TokenRateLimitAdapter};

/// Registry of the token manager, auth chains and rate limits
#[derive(Debug)]
pub struct SecurityContext {
    events: Arc<EventBus>,
    tokens: Option<Arc<TokenManager>>,
    auth_chains: Option<Arc<AuthChainManager>>,
    rate_limits: Option<Arc<RateLimitManager>>,
}

/// Builder for [`SecurityContext`]
///
/// Components given to the builder should share the builder's
/// [`EventBus`], available through [`SecurityContextBuilder::events`].
#[derive(Debug, Default)]
pub struct SecurityContextBuilder {
    events: Arc<EventBus>,
    tokens: Option<Arc<TokenManager>>,
    auth_chains: Option<Arc<AuthChainManager>>,
    rate_limits: Option<Arc<RateLimitManager>>,
}

impl SecurityContextBuilder {
    /// Use an existing event bus instead of a fresh one
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn token_manager(mut self, tokens: Arc<TokenManager>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn auth_chains(mut self, chains: Arc<AuthChainManager>) -> Self {
        self.auth_chains = Some(chains);
        self
    }

    pub fn rate_limits(mut self, rate_limits: Arc<RateLimitManager>) -> Self {
        self.rate_limits = Some(rate_limits);
        self
    }

    pub fn build(self) -> SecurityContext {
        SecurityContext {
            events: self.events,
            tokens: self.tokens,
            auth_chains: self.auth_chains,
            rate_limits: self.rate_limits,
        }
    }
}

impl SecurityContext {
    pub fn builder() -> SecurityContextBuilder {
        SecurityContextBuilder::default()
    }

    /// Build the full context described by `config`
    ///
    /// Loads the token file, installs a token auth chain with the configured
    /// exclusions when auth is enabled, and registers the enabled built-in
    /// rate limit adapters.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        config.validate()?;

        let builder = Self::builder();
        let events = Arc::clone(builder.events());

        let store = Arc::new(JsonFileStore::new(&config.tokens.path));
        let tokens = Arc::new(TokenManager::new(store, Arc::clone(&events)));
        tokens.load()?;

        let chains = Arc::new(AuthChainManager::new());
        if config.auth.enabled {
            let chain = SimpleAuthChain::new()
                .with_adapter(Arc::new(TokenAuthAdapter::new(Arc::clone(&tokens))));
            for exclusion in &config.auth.exclusions {
                chain.add_exclusion(exclusion)?;
            }
            chains.register(Arc::new(chain));
        }

        let rate_limits = Arc::new(RateLimitManager::new(Arc::clone(&events)));
        let limits = &config.rate_limit;
        if limits.ip.enabled {
            let settings = limits.ip.settings(IpRateLimitAdapter::ID)?;
            rate_limits.register(Arc::new(IpRateLimitAdapter::with_settings(settings)))?;
        }
        if limits.token.enabled {
            let settings = limits.token.settings(TokenRateLimitAdapter::ID)?;
            rate_limits.register(Arc::new(TokenRateLimitAdapter::with_settings(settings)))?;
        }

        info!(
            tokens = tokens.len(),
            auth_chains = chains.len(),
            rate_limit_adapters = rate_limits.adapters().len(),
            "Security context initialized"
        );

        Ok(builder
            .token_manager(tokens)
            .auth_chains(chains)
            .rate_limits(rate_limits)
            .build())
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn token_manager(&self) -> Result<&Arc<TokenManager>, ContextError> {
        self.tokens
            .as_ref()
            .ok_or(ContextError::NotRegistered("TokenManager"))
    }

    pub fn auth_chains(&self) -> Result<&Arc<AuthChainManager>, ContextError> {
        self.auth_chains
            .as_ref()
            .ok_or(ContextError::NotRegistered("AuthChainManager"))
    }

    pub fn rate_limits(&self) -> Result<&Arc<RateLimitManager>, ContextError> {
        self.rate_limits
            .as_ref()
            .ok_or(ContextError::NotRegistered("RateLimitManager"))
    }

    /// Install an additional auth chain
    pub fn register_chain(&self, chain: Arc<dyn AuthChain>) -> Result<(), ContextError> {
        self.auth_chains()?.register(chain);
        Ok(())
    }

    /// Authenticate the exchange against every registered chain
    ///
    /// Fires the auth success or failure event exactly once.
    pub fn authenticate(&self, exchange: &mut Exchange) -> Result<AuthResult, ContextError> {
        let chains = self.auth_chains()?;

        let result = {
            let (request, storage) = exchange.parts_mut();
            chains.authenticate(request, storage)
        };

        if result.is_cancelled() {
            self.events.auth_failed(exchange, result.cancel_reason());
        } else {
            self.events.auth_succeeded(exchange);
        }
        Ok(result)
    }

    pub fn is_rate_limited(&self, exchange: &mut Exchange) -> Result<bool, ContextError> {
        Ok(self.rate_limits()?.is_rate_limited(exchange))
    }

    /// Sweep expired rate limit counters
    pub fn tick(&self) -> Result<usize, ContextError> {
        Ok(self.rate_limits()?.tick())
    }

    /// Persist the tokens, if a token manager is installed
    pub fn shutdown(&self) -> Result<(), AppError> {
        if let Some(tokens) = &self.tokens {
            tokens.save()?;
        }
        info!("Security context shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{fail_auth, AuthAdapter, INVALID_TOKEN_REASON};
    use crate::config::Config;
    use crate::events::AuthListener;
    use crate::exchange::{HttpMethod, Request, SessionStorage};
    use crate::models::TokenPermission;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct Outcomes {
        success: AtomicUsize,
        failed: AtomicUsize,
    }

    impl AuthListener for Outcomes {
        fn on_auth_success(&self, _exchange: &Exchange) {
            self.success.fetch_add(1, Ordering::SeqCst);
        }

        fn on_auth_failed(&self, _exchange: &Exchange, _reason: &str) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Reject;

    impl AuthAdapter for Reject {
        fn authenticate(&self, result: &mut AuthResult, request: &Request, _: &mut SessionStorage) {
            fail_auth(result, request, "rejected");
        }
    }

    fn config_in(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.tokens.path = dir.path().join("tokens.json").display().to_string();
        config
    }

    // Test 1: Missing components are reported, not silently skipped
    #[test]
    fn test_not_registered() {
        let context = SecurityContext::builder().build();
        let mut exchange = Exchange::new(Request::new(HttpMethod::Get, "/"));

        assert_eq!(
            context.token_manager().unwrap_err(),
            ContextError::NotRegistered("TokenManager")
        );
        assert!(context.authenticate(&mut exchange).is_err());
        assert!(context.is_rate_limited(&mut exchange).is_err());
        assert!(context.tick().is_err());
        assert!(context.shutdown().is_ok());
    }

    // Test 2: Auth events fire once per request
    #[test]
    fn test_auth_events() {
        let chains = Arc::new(AuthChainManager::new());
        let context = SecurityContext::builder().auth_chains(chains).build();
        let outcomes = Arc::new(Outcomes::default());
        context.events().subscribe_auth(outcomes.clone());

        let mut exchange = Exchange::new(Request::new(HttpMethod::Get, "/"));
        assert!(context.authenticate(&mut exchange).unwrap().is_success());

        context
            .register_chain(Arc::new(SimpleAuthChain::new().with_adapter(Arc::new(Reject))))
            .unwrap();
        let result = context.authenticate(&mut exchange).unwrap();
        assert_eq!(result.cancel_reason(), "rejected");

        assert_eq!(outcomes.success.load(Ordering::SeqCst), 1);
        assert_eq!(outcomes.failed.load(Ordering::SeqCst), 1);
    }

    // Test 3: from_config installs the default chain and adapters
    #[test]
    fn test_from_config() {
        let dir = TempDir::new().unwrap();
        let context = SecurityContext::from_config(&config_in(&dir)).unwrap();

        let rate_limits = context.rate_limits().unwrap();
        assert!(rate_limits.is_registered("IP"));
        assert!(rate_limits.is_registered("TOKEN"));
        assert_eq!(context.auth_chains().unwrap().len(), 1);

        let mut excluded = Exchange::new(Request::new(HttpMethod::Get, "/health"));
        assert!(context.authenticate(&mut excluded).unwrap().is_success());

        let mut anonymous = Exchange::new(Request::new(HttpMethod::Get, "/api"));
        let result = context.authenticate(&mut anonymous).unwrap();
        assert_eq!(result.cancel_reason(), INVALID_TOKEN_REASON);
    }

    // Test 4: Disabled sections are skipped
    #[test]
    fn test_from_config_disabled() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.auth.enabled = false;
        config.rate_limit.ip.enabled = false;

        let context = SecurityContext::from_config(&config).unwrap();
        assert!(context.auth_chains().unwrap().is_empty());
        assert!(!context.rate_limits().unwrap().is_registered("IP"));
        assert!(context.rate_limits().unwrap().is_registered("TOKEN"));
    }

    // Test 5: Invalid config refuses to build
    #[test]
    fn test_from_config_invalid() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.rate_limit.token.window_ms = 0;

        assert!(matches!(
            SecurityContext::from_config(&config),
            Err(AppError::Config(_))
        ));
    }

    // Test 6: Shutdown persists generated tokens
    #[test]
    fn test_shutdown_saves_tokens() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let context = SecurityContext::from_config(&config).unwrap();
        let (_, token) = context
            .token_manager()
            .unwrap()
            .generate(vec![TokenPermission::wildcard()])
            .unwrap();
        context.shutdown().unwrap();

        let restored = SecurityContext::from_config(&config).unwrap();
        assert!(restored.token_manager().unwrap().get(token.id()).is_some());
    }
}

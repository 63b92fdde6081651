//! Typed event dispatch
//!
//! Each event kind has its own listener trait. Listeners are registered on
//! an [`EventBus`] owned by the [`SecurityContext`](crate::context::SecurityContext)
//! and called synchronously on the thread that raised the event.
//!
//! Listener lists are copy-on-write, so dispatch never blocks on a
//! concurrent subscription.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::exchange::Exchange;
use crate::models::Token;
use crate::ratelimit::RateLimitAdapter;

/// Verdict returned by listeners of cancellable events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventControl {
    /// Let the operation proceed
    #[default]
    Continue,
    /// Veto the operation
    Cancel,
}

impl EventControl {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancel)
    }
}

/// Listener for per-request authentication outcomes
pub trait AuthListener: Send + Sync {
    fn on_auth_success(&self, _exchange: &Exchange) {}

    fn on_auth_failed(&self, _exchange: &Exchange, _reason: &str) {}
}

/// Listener for token lifecycle events
pub trait TokenListener: Send + Sync {
    /// Called before a freshly minted token is stored
    fn on_token_create(&self, _token: &Token) -> EventControl {
        EventControl::Continue
    }

    /// Called before a token is removed
    fn on_token_revoke(&self, _token: &Token) -> EventControl {
        EventControl::Continue
    }

    /// Called after a token authenticated a request
    fn on_token_used(&self, _token: &Token) {}
}

/// Listener for rate limit denials
#[cfg_attr(test, mockall::automock)]
pub trait RateLimitListener: Send + Sync {
    /// `exceeded` holds every adapter that denied the request
    fn on_rate_limit_exceeded(&self, exchange: &Exchange, exceeded: &[Arc<dyn RateLimitAdapter>]);
}

/// Registry of typed listeners
pub struct EventBus {
    auth: ArcSwap<Vec<Arc<dyn AuthListener>>>,
    tokens: ArcSwap<Vec<Arc<dyn TokenListener>>>,
    rate_limits: ArcSwap<Vec<Arc<dyn RateLimitListener>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("auth", &self.auth.load().len())
            .field("tokens", &self.tokens.load().len())
            .field("rate_limits", &self.rate_limits.load().len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            auth: ArcSwap::from_pointee(Vec::new()),
            tokens: ArcSwap::from_pointee(Vec::new()),
            rate_limits: ArcSwap::from_pointee(Vec::new()),
        }
    }

    pub fn subscribe_auth(&self, listener: Arc<dyn AuthListener>) {
        push(&self.auth, listener);
    }

    pub fn subscribe_tokens(&self, listener: Arc<dyn TokenListener>) {
        push(&self.tokens, listener);
    }

    pub fn subscribe_rate_limits(&self, listener: Arc<dyn RateLimitListener>) {
        push(&self.rate_limits, listener);
    }

    /// Remove every listener of every kind
    pub fn clear(&self) {
        self.auth.store(Arc::new(Vec::new()));
        self.tokens.store(Arc::new(Vec::new()));
        self.rate_limits.store(Arc::new(Vec::new()));
    }

    pub fn auth_succeeded(&self, exchange: &Exchange) {
        for listener in self.auth.load().iter() {
            listener.on_auth_success(exchange);
        }
    }

    pub fn auth_failed(&self, exchange: &Exchange, reason: &str) {
        for listener in self.auth.load().iter() {
            listener.on_auth_failed(exchange, reason);
        }
    }

    /// Every listener sees the event; any single veto cancels it
    pub fn token_create(&self, token: &Token) -> EventControl {
        fold_control(self.tokens.load().iter().map(|l| l.on_token_create(token)))
    }

    pub fn token_revoke(&self, token: &Token) -> EventControl {
        fold_control(self.tokens.load().iter().map(|l| l.on_token_revoke(token)))
    }

    pub fn token_used(&self, token: &Token) {
        for listener in self.tokens.load().iter() {
            listener.on_token_used(token);
        }
    }

    pub fn rate_limit_exceeded(&self, exchange: &Exchange, exceeded: &[Arc<dyn RateLimitAdapter>]) {
        for listener in self.rate_limits.load().iter() {
            listener.on_rate_limit_exceeded(exchange, exceeded);
        }
    }
}

fn push<T: ?Sized>(list: &ArcSwap<Vec<Arc<T>>>, listener: Arc<T>) {
    list.rcu(|current| {
        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(Arc::clone(&listener));
        next
    });
}

fn fold_control(verdicts: impl Iterator<Item = EventControl>) -> EventControl {
    verdicts.fold(EventControl::Continue, |acc, v| {
        if v.is_cancelled() {
            EventControl::Cancel
        } else {
            acc
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{HttpMethod, Request};
    use crate::ratelimit::IpRateLimitAdapter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Veto;

    impl TokenListener for Veto {
        fn on_token_create(&self, _token: &Token) -> EventControl {
            EventControl::Cancel
        }
    }

    #[derive(Default)]
    struct Counting {
        created: AtomicUsize,
        used: AtomicUsize,
    }

    impl TokenListener for Counting {
        fn on_token_create(&self, _token: &Token) -> EventControl {
            self.created.fetch_add(1, Ordering::SeqCst);
            EventControl::Continue
        }

        fn on_token_used(&self, _token: &Token) {
            self.used.fetch_add(1, Ordering::SeqCst);
        }
    }

    // Test 1: No listeners means every cancellable event continues
    #[test]
    fn test_empty_bus_continues() {
        let bus = EventBus::new();
        let token = Token::new(1, "hash");

        assert_eq!(bus.token_create(&token), EventControl::Continue);
        assert_eq!(bus.token_revoke(&token), EventControl::Continue);
    }

    // Test 2: A single veto cancels, but every listener still runs
    #[test]
    fn test_veto_cancels_and_all_listeners_run() {
        let bus = EventBus::new();
        let counting = Arc::new(Counting::default());
        bus.subscribe_tokens(Arc::new(Veto));
        bus.subscribe_tokens(counting.clone());

        let token = Token::new(1, "hash");
        assert_eq!(bus.token_create(&token), EventControl::Cancel);
        assert_eq!(counting.created.load(Ordering::SeqCst), 1);
    }

    // Test 3: Non-cancellable events reach listeners
    #[test]
    fn test_token_used_dispatch() {
        let bus = EventBus::new();
        let counting = Arc::new(Counting::default());
        bus.subscribe_tokens(counting.clone());

        bus.token_used(&Token::new(2, "hash"));
        bus.token_used(&Token::new(2, "hash"));
        assert_eq!(counting.used.load(Ordering::SeqCst), 2);
    }

    // Test 4: Rate limit listeners receive the denying adapters
    #[test]
    fn test_rate_limit_listener_receives_adapters() {
        let bus = EventBus::new();
        let mut mock = MockRateLimitListener::new();
        mock.expect_on_rate_limit_exceeded()
            .withf(|_, exceeded| exceeded.len() == 1 && exceeded[0].id() == "IP")
            .times(1)
            .return_const(());
        bus.subscribe_rate_limits(Arc::new(mock));

        let exchange = Exchange::new(Request::new(HttpMethod::Get, "/"));
        let adapter: Arc<dyn RateLimitAdapter> = Arc::new(IpRateLimitAdapter::new());
        bus.rate_limit_exceeded(&exchange, &[adapter]);
    }

    // Test 5: Clear drops all listeners
    #[test]
    fn test_clear() {
        let bus = EventBus::new();
        bus.subscribe_tokens(Arc::new(Veto));
        bus.clear();

        assert_eq!(bus.token_create(&Token::new(3, "hash")), EventControl::Continue);
    }
}

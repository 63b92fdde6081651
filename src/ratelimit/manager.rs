//! Rate limit manager
//!
//! Holds the registered adapters and the counter of every index seen so
//! far. [`RateLimitManager::is_rate_limited`] is called once per request,
//! [`RateLimitManager::tick`] periodically to drop expired counters.

use std::sync::Arc;

use dashmap::DashMap;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::events::EventBus;
use crate::exchange::Exchange;

use super::adapter::RateLimitAdapter;
use super::index::RateLimitIndex;
use super::info::RateLimitInfo;
use super::now_millis;

/// Index count from which the sweep scans in parallel
pub const PARALLEL_SWEEP_THRESHOLD: usize = 100;

/// Registry of rate limit adapters and their counters
pub struct RateLimitManager {
    adapters: DashMap<String, Arc<dyn RateLimitAdapter>>,
    indices: DashMap<RateLimitIndex, Arc<RateLimitInfo>>,
    events: Arc<EventBus>,
}

impl std::fmt::Debug for RateLimitManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitManager")
            .field(
                "adapters",
                &self.adapters.iter().map(|e| e.key().clone()).collect::<Vec<_>>(),
            )
            .field("indices", &self.indices.len())
            .finish()
    }
}

impl RateLimitManager {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            adapters: DashMap::new(),
            indices: DashMap::new(),
            events,
        }
    }

    /// Register an adapter; ids must be unique
    pub fn register(&self, adapter: Arc<dyn RateLimitAdapter>) -> Result<(), ConfigError> {
        let id = adapter.id().to_string();
        match self.adapters.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(ConfigError::DuplicateAdapter(id)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                info!(
                    adapter = %id,
                    max = adapter.max(),
                    window_ms = adapter.window_ms(),
                    "Registered rate limit adapter"
                );
                slot.insert(adapter);
                Ok(())
            }
        }
    }

    /// Remove the adapter with `id`. Its counters expire on their own.
    pub fn unregister(&self, id: &str) -> Option<Arc<dyn RateLimitAdapter>> {
        let removed = self.adapters.remove(id).map(|(_, adapter)| adapter);
        if removed.is_some() {
            info!(adapter = id, "Unregistered rate limit adapter");
        }
        removed
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.adapters.contains_key(id)
    }

    pub fn adapter(&self, id: &str) -> Option<Arc<dyn RateLimitAdapter>> {
        self.adapters.get(id).map(|e| Arc::clone(e.value()))
    }

    pub fn adapters(&self) -> Vec<Arc<dyn RateLimitAdapter>> {
        self.adapters.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Number of counters currently tracked
    pub fn tracked_indices(&self) -> usize {
        self.indices.len()
    }

    pub fn info(&self, index: &RateLimitIndex) -> Option<Arc<RateLimitInfo>> {
        self.indices.get(index).map(|e| Arc::clone(e.value()))
    }

    /// Count the request against every engaged adapter
    ///
    /// Returns `true` if at least one adapter refused it. Header-enabled
    /// adapters write their headers into the exchange either way.
    pub fn is_rate_limited(&self, exchange: &mut Exchange) -> bool {
        self.is_rate_limited_at(exchange, now_millis())
    }

    pub fn is_rate_limited_at(&self, exchange: &mut Exchange, now: i64) -> bool {
        if self.adapters.is_empty() {
            return false;
        }

        let adapters = self.adapters();
        let mut exceeded: Vec<Arc<dyn RateLimitAdapter>> = Vec::new();

        for adapter in adapters {
            let Some(index) = adapter.adapt(exchange.request(), exchange.storage()) else {
                continue;
            };

            let info = Arc::clone(
                self.indices
                    .entry(index)
                    .or_insert_with(|| Arc::new(RateLimitInfo::new(Arc::clone(&adapter), now)))
                    .value(),
            );

            let access = info.access_at(now);
            if adapter.include_headers() {
                adapter.append_headers(exchange.response_headers_mut(), &access, now);
            }
            if !access.allowed {
                exceeded.push(adapter);
            }
        }

        if exceeded.is_empty() {
            return false;
        }

        debug!(
            ip = %exchange.request().ip(),
            path = %exchange.request().url(),
            adapters = ?exceeded.iter().map(|a| a.id().to_string()).collect::<Vec<_>>(),
            "Request rate limited"
        );
        self.events.rate_limit_exceeded(exchange, &exceeded);
        true
    }

    /// Drop every counter whose window has elapsed
    ///
    /// Returns the number of removed counters.
    pub fn tick(&self) -> usize {
        self.tick_at(now_millis())
    }

    pub fn tick_at(&self, now: i64) -> usize {
        let expired: Vec<RateLimitIndex> = if self.indices.len() >= PARALLEL_SWEEP_THRESHOLD {
            self.indices
                .par_iter()
                .filter(|e| e.value().is_expired_at(now))
                .map(|e| e.key().clone())
                .collect()
        } else {
            self.indices
                .iter()
                .filter(|e| e.value().is_expired_at(now))
                .map(|e| e.key().clone())
                .collect()
        };

        // an entry touched since the scan has a fresh window and stays
        let removed = expired
            .iter()
            .filter(|key| {
                self.indices
                    .remove_if(*key, |_, info| info.is_expired_at(now))
                    .is_some()
            })
            .count();

        debug!(removed = removed, remaining = self.indices.len(), "Rate limit sweep");
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MockRateLimitListener;
    use crate::exchange::{HttpMethod, Request};
    use crate::ratelimit::adapter::{LIMIT_HEADER, REMAINING_HEADER, RESET_HEADER};
    use crate::ratelimit::{IndexSource, IpRateLimitAdapter, RateLimitSettings};
    use std::net::{IpAddr, Ipv4Addr};

    fn exchange(last_octet: u8) -> Exchange {
        Exchange::new(
            Request::new(HttpMethod::Get, "/").with_ip(IpAddr::V4(Ipv4Addr::new(10, 0, 0, last_octet))),
        )
    }

    fn ip_adapter(id: &str, max: u64, window_ms: u64, headers: bool) -> Arc<dyn RateLimitAdapter> {
        Arc::new(IpRateLimitAdapter::with_settings(
            RateLimitSettings::new(id, max, window_ms, headers).unwrap(),
        ))
    }

    fn manager() -> RateLimitManager {
        RateLimitManager::new(Arc::new(EventBus::new()))
    }

    // Test 1: No adapters means never limited
    #[test]
    fn test_no_adapters() {
        let manager = manager();
        for _ in 0..10 {
            assert!(!manager.is_rate_limited(&mut exchange(1)));
        }
        assert_eq!(manager.tracked_indices(), 0);
    }

    // Test 2: Duplicate ids are rejected
    #[test]
    fn test_register_duplicate() {
        let manager = manager();
        manager.register(ip_adapter("ip", 1, 1_000, true)).unwrap();

        let err = manager.register(ip_adapter("IP", 5, 1_000, true)).unwrap_err();
        assert_eq!(err, ConfigError::DuplicateAdapter("IP".to_string()));
        assert_eq!(manager.adapter("IP").unwrap().max(), 1);
    }

    // Test 3: Registry queries
    #[test]
    fn test_register_unregister() {
        let manager = manager();
        manager.register(ip_adapter("A", 1, 1_000, true)).unwrap();

        assert!(manager.is_registered("A"));
        assert_eq!(manager.adapters().len(), 1);
        assert!(manager.unregister("A").is_some());
        assert!(manager.unregister("A").is_none());
        assert!(!manager.is_registered("A"));
    }

    // Test 4: Limits apply per caller
    #[test]
    fn test_limit_per_ip() {
        let manager = manager();
        manager.register(ip_adapter("IP", 2, 1_000, false)).unwrap();

        assert!(!manager.is_rate_limited_at(&mut exchange(1), 0));
        assert!(!manager.is_rate_limited_at(&mut exchange(1), 1));
        assert!(manager.is_rate_limited_at(&mut exchange(1), 2));
        assert!(!manager.is_rate_limited_at(&mut exchange(2), 3));

        // window elapsed
        assert!(!manager.is_rate_limited_at(&mut exchange(1), 1_000));
        assert_eq!(manager.tracked_indices(), 2);
    }

    // Test 5: Headers are written for header-enabled adapters only
    #[test]
    fn test_headers() {
        let manager = manager();
        manager.register(ip_adapter("LOUD", 3, 1_000, true)).unwrap();
        manager.register(ip_adapter("QUIET", 3, 1_000, false)).unwrap();

        let mut ex = exchange(1);
        manager.is_rate_limited_at(&mut ex, 200);

        let headers = ex.response_headers();
        assert_eq!(headers.get_all(LIMIT_HEADER).iter().count(), 1);
        assert_eq!(headers[LIMIT_HEADER], "LOUD=3");
        assert_eq!(headers[REMAINING_HEADER], "LOUD=2");
        assert_eq!(headers[RESET_HEADER], "LOUD=1000");
    }

    // Test 6: Every engaged adapter is charged even if another denies
    #[test]
    fn test_all_adapters_charged() {
        let manager = manager();
        manager.register(ip_adapter("STRICT", 1, 10_000, false)).unwrap();
        manager.register(ip_adapter("LOOSE", 100, 10_000, false)).unwrap();

        for t in 0..5 {
            manager.is_rate_limited_at(&mut exchange(1), t);
        }

        let addr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let loose = manager
            .info(&RateLimitIndex::scoped("LOOSE", IndexSource::Ip(addr)))
            .unwrap();
        assert_eq!(loose.count(), 5);
    }

    // Test 7: Listeners receive only the denying adapters
    #[test]
    fn test_exceeded_event() {
        let events = Arc::new(EventBus::new());
        let mut listener = MockRateLimitListener::new();
        listener
            .expect_on_rate_limit_exceeded()
            .withf(|_, exceeded| exceeded.len() == 1 && exceeded[0].id() == "STRICT")
            .times(1)
            .return_const(());
        events.subscribe_rate_limits(Arc::new(listener));

        let manager = RateLimitManager::new(events);
        manager.register(ip_adapter("STRICT", 1, 10_000, false)).unwrap();
        manager.register(ip_adapter("LOOSE", 100, 10_000, false)).unwrap();

        assert!(!manager.is_rate_limited_at(&mut exchange(1), 0));
        assert!(manager.is_rate_limited_at(&mut exchange(1), 1));
    }

    // Test 8: Sweep removes expired entries and keeps refreshed ones
    #[test]
    fn test_sweep() {
        let manager = manager();
        manager.register(ip_adapter("IP", 5, 1_000, false)).unwrap();

        manager.is_rate_limited_at(&mut exchange(1), 0);
        manager.is_rate_limited_at(&mut exchange(2), 0);
        // refreshed after expiry
        manager.is_rate_limited_at(&mut exchange(2), 1_500);

        assert_eq!(manager.tick_at(1_600), 1);
        assert_eq!(manager.tracked_indices(), 1);

        let addr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
        let info = manager
            .info(&RateLimitIndex::scoped("IP", IndexSource::Ip(addr)))
            .unwrap();
        assert_eq!(info.count(), 0);
        assert_eq!(info.expires_at(), 2_500);
    }

    // Test 9: Large maps take the parallel sweep path
    #[test]
    fn test_parallel_sweep() {
        let manager = manager();
        manager.register(ip_adapter("IP", 5, 1_000, false)).unwrap();

        for octet in 0..=255u8 {
            manager.is_rate_limited_at(&mut exchange(octet), 0);
        }
        for octet in 0..50u8 {
            manager.is_rate_limited_at(&mut exchange(octet), 2_000);
        }
        assert_eq!(manager.tracked_indices(), 256);

        assert_eq!(manager.tick_at(2_000), 206);
        assert_eq!(manager.tracked_indices(), 50);
    }
}

//! Per-key counter state
//!
//! The reset/compare/increment sequence runs under one mutex per entry, so
//! concurrent requests on the same key can never slip past the limit.

use std::sync::Arc;

use parking_lot::Mutex;

use super::adapter::RateLimitAdapter;

/// Result of a single [`RateLimitInfo::access_at`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Counter value after the access
    pub count: u64,
    /// End of the current window, unix millis
    pub expires_at: i64,
}

#[derive(Debug)]
struct Window {
    count: u64,
    expires_at: i64,
}

/// Counter and window of one [`RateLimitIndex`](super::RateLimitIndex)
pub struct RateLimitInfo {
    adapter: Arc<dyn RateLimitAdapter>,
    window: Mutex<Window>,
}

impl std::fmt::Debug for RateLimitInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let window = self.window.lock();
        f.debug_struct("RateLimitInfo")
            .field("adapter", &self.adapter.id())
            .field("count", &window.count)
            .field("expires_at", &window.expires_at)
            .finish()
    }
}

impl RateLimitInfo {
    /// Fresh state whose first window starts at `now`
    pub fn new(adapter: Arc<dyn RateLimitAdapter>, now: i64) -> Self {
        let expires_at = now.saturating_add(window_of(adapter.as_ref()));
        Self {
            adapter,
            window: Mutex::new(Window {
                count: 0,
                expires_at,
            }),
        }
    }

    pub fn adapter(&self) -> &Arc<dyn RateLimitAdapter> {
        &self.adapter
    }

    /// Record one request at time `now`
    ///
    /// An elapsed window is reset and the request passes without being
    /// counted. Otherwise the request passes and is counted while the
    /// counter is below the limit, and is refused without counting once the
    /// limit is reached.
    pub fn access_at(&self, now: i64) -> Access {
        let mut window = self.window.lock();

        let allowed = if now >= window.expires_at {
            window.count = 0;
            window.expires_at = now.saturating_add(window_of(self.adapter.as_ref()));
            true
        } else if window.count >= self.adapter.max() {
            false
        } else {
            window.count += 1;
            true
        };

        Access {
            allowed,
            count: window.count,
            expires_at: window.expires_at,
        }
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.window.lock().expires_at
    }

    pub fn count(&self) -> u64 {
        self.window.lock().count
    }

    pub fn expires_at(&self) -> i64 {
        self.window.lock().expires_at
    }
}

fn window_of(adapter: &dyn RateLimitAdapter) -> i64 {
    i64::try_from(adapter.window_ms()).unwrap_or(i64::MAX)
}

//! Rate limiting for cnet-security
//!
//! This module provides request quotas:
//! - Adapters mapping requests to counter keys
//! - Fixed-window counters with atomic per-key transitions
//! - A manager that checks requests and sweeps expired counters
//!
//! All times are unix epoch milliseconds.

pub mod adapter;
pub mod builtin;
pub mod index;
pub mod info;
pub mod manager;

pub use adapter::{
    RateLimitAdapter, RateLimitSettings, DEFAULT_WINDOW_MILLIS, LIMIT_HEADER, MAX_WINDOW_MILLIS,
    REMAINING_HEADER, RESET_HEADER,
};
pub use builtin::{IpRateLimitAdapter, TokenRateLimitAdapter};
pub use index::{IndexSource, RateLimitIndex};
pub use info::{Access, RateLimitInfo};
pub use manager::{RateLimitManager, PARALLEL_SWEEP_THRESHOLD};

/// Current wall clock in unix milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

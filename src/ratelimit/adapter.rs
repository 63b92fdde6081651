//! Rate limit policies
//!
//! A [`RateLimitAdapter`] maps a request to the [`RateLimitIndex`] it is
//! counted against and carries the limit for that index.

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::error::ConfigError;
use crate::exchange::{Request, SessionStorage};

use super::index::RateLimitIndex;
use super::info::Access;

/// Longest accepted window: 31 days
pub const MAX_WINDOW_MILLIS: u64 = 31 * 24 * 60 * 60 * 1000;

/// Window used when none is given: 60 seconds
pub const DEFAULT_WINDOW_MILLIS: u64 = 60 * 1000;

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Validated configuration of a rate limit adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitSettings {
    id: String,
    max: u64,
    window_ms: u64,
    include_headers: bool,
}

impl RateLimitSettings {
    /// Validate and build settings
    ///
    /// `id` must consist of ASCII letters only and is stored upper-cased.
    /// `window_ms` must lie in `1..=MAX_WINDOW_MILLIS`.
    pub fn new(
        id: &str,
        max: u64,
        window_ms: u64,
        include_headers: bool,
    ) -> Result<Self, ConfigError> {
        if !is_valid_id(id) {
            return Err(ConfigError::InvalidAdapterId(id.to_string()));
        }
        validate_window(window_ms)?;

        Ok(Self {
            id: id.to_ascii_uppercase(),
            max,
            window_ms,
            include_headers,
        })
    }

    /// Settings with the default 60 second window and headers enabled
    pub fn with_defaults(id: &str, max: u64) -> Result<Self, ConfigError> {
        Self::new(id, max, DEFAULT_WINDOW_MILLIS, true)
    }

    /// Settings for compile-time constants that are known to be valid
    pub(crate) fn builtin(id: &'static str, max: u64) -> Self {
        Self {
            id: id.to_string(),
            max,
            window_ms: DEFAULT_WINDOW_MILLIS,
            include_headers: true,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    pub fn include_headers(&self) -> bool {
        self.include_headers
    }
}

/// `^[a-zA-Z]+$`
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_alphabetic())
}

/// Check that a window lies in `(0, 31 days]`
pub fn validate_window(window_ms: u64) -> Result<(), ConfigError> {
    if window_ms == 0 || window_ms > MAX_WINDOW_MILLIS {
        return Err(ConfigError::InvalidWindow {
            window: window_ms,
            max: MAX_WINDOW_MILLIS,
        });
    }
    Ok(())
}

/// A pluggable rate limit policy
pub trait RateLimitAdapter: Send + Sync {
    fn settings(&self) -> &RateLimitSettings;

    /// Index this request is counted against, `None` to skip the request
    fn adapt(&self, request: &Request, storage: &SessionStorage) -> Option<RateLimitIndex>;

    fn id(&self) -> &str {
        self.settings().id()
    }

    fn max(&self) -> u64 {
        self.settings().max()
    }

    fn window_ms(&self) -> u64 {
        self.settings().window_ms()
    }

    fn include_headers(&self) -> bool {
        self.settings().include_headers()
    }

    /// Append the limit, remaining and reset headers for this adapter
    fn append_headers(&self, headers: &mut HeaderMap, access: &Access, now: i64) {
        let remaining = self.max().saturating_sub(access.count);
        let reset = access.expires_at.saturating_sub(now).max(0);

        for (name, value) in [
            (LIMIT_HEADER, self.max().to_string()),
            (REMAINING_HEADER, remaining.to_string()),
            (RESET_HEADER, reset.to_string()),
        ] {
            if let Ok(value) = HeaderValue::from_str(&format!("{}={value}", self.id())) {
                headers.append(HeaderName::from_static(name), value);
            }
        }
    }
}

//! Rate limit keys

use std::fmt;
use std::net::IpAddr;

/// What a request is counted against
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexSource {
    /// Caller address
    Ip(IpAddr),
    /// Id of the token that authenticated the request
    Token(u64),
    /// Free-form key for custom adapters
    Key(String),
}

impl fmt::Display for IndexSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip(ip) => write!(f, "ip:{ip}"),
            Self::Token(id) => write!(f, "token:{id:016x}"),
            Self::Key(key) => write!(f, "key:{key}"),
        }
    }
}

/// Key of one rate limit counter
///
/// A scoped index belongs to a single adapter, so two adapters looking at
/// the same source keep separate counters. A global index has no scope and
/// is shared by every adapter producing the same source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitIndex {
    scope: Option<String>,
    source: IndexSource,
}

impl RateLimitIndex {
    /// Index private to the adapter with id `adapter_id`
    pub fn scoped(adapter_id: &str, source: IndexSource) -> Self {
        Self {
            scope: Some(adapter_id.to_string()),
            source,
        }
    }

    /// Index shared across adapters
    pub fn global(source: IndexSource) -> Self {
        Self {
            scope: None,
            source,
        }
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn source(&self) -> &IndexSource {
        &self.source
    }

    pub fn is_global(&self) -> bool {
        self.scope.is_none()
    }
}

impl fmt::Display for RateLimitIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "{scope}/{}", self.source),
            None => write!(f, "*/{}", self.source),
        }
    }
}

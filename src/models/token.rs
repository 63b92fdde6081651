//! Token-related domain models
//!
//! This module defines the persisted token entity and its access rules.
//! A [`Token`] is an immutable value: changing its permissions produces a new
//! value that is re-registered with the
//! [`TokenManager`](crate::auth::TokenManager), replacing the old one.

use std::fmt;
use std::hash::{Hash, Hasher};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::exchange::HttpMethod;

/// Full-match regular expression with wildcard support
///
/// The sources `*` and `.*` are wildcards and match anything without
/// touching the regex engine.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    regex: Option<Regex>,
}

impl Pattern {
    /// Compile `source` as a full-match pattern
    pub fn new(source: impl Into<String>) -> Result<Self, ConfigError> {
        let source = source.into();
        if is_wildcard(&source) {
            return Ok(Self { source, regex: None });
        }

        let regex = Regex::new(&format!("^(?:{source})$")).map_err(|e| {
            ConfigError::InvalidPattern {
                pattern: source.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            source,
            regex: Some(regex),
        })
    }

    /// The `*` pattern
    pub fn wildcard() -> Self {
        Self {
            source: "*".to_string(),
            regex: None,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.regex.is_none()
    }

    pub fn matches(&self, value: &str) -> bool {
        match &self.regex {
            Some(regex) => regex.is_match(value),
            None => true,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

fn is_wildcard(source: &str) -> bool {
    source == "*" || source == ".*"
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Pattern {}

impl Hash for Pattern {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({:?})", self.source)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Serialize for Pattern {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Pattern::new(source).map_err(serde::de::Error::custom)
    }
}

/// One access rule of a token
///
/// Grants a request when the method, the domain and the path all match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenPermission {
    path: Pattern,
    domain: Pattern,
    methods: Vec<HttpMethod>,
}

impl TokenPermission {
    /// Create a permission from pattern sources
    pub fn new(
        path: &str,
        domain: &str,
        methods: impl IntoIterator<Item = HttpMethod>,
    ) -> Result<Self, ConfigError> {
        Ok(Self::from_patterns(
            Pattern::new(path)?,
            Pattern::new(domain)?,
            methods,
        ))
    }

    pub fn from_patterns(
        path: Pattern,
        domain: Pattern,
        methods: impl IntoIterator<Item = HttpMethod>,
    ) -> Self {
        let mut unique = Vec::new();
        for method in methods {
            if !unique.contains(&method) {
                unique.push(method);
            }
        }

        Self {
            path,
            domain,
            methods: unique,
        }
    }

    /// Any method, any domain, any path
    pub fn wildcard() -> Self {
        Self::from_patterns(Pattern::wildcard(), Pattern::wildcard(), [HttpMethod::All])
    }

    pub fn path(&self) -> &Pattern {
        &self.path
    }

    pub fn domain(&self) -> &Pattern {
        &self.domain
    }

    pub fn methods(&self) -> &[HttpMethod] {
        &self.methods
    }

    pub fn allows_method(&self, method: HttpMethod) -> bool {
        self.methods
            .iter()
            .any(|m| *m == HttpMethod::All || *m == method)
    }

    pub fn allows_domain(&self, domain: &str) -> bool {
        self.domain.matches(domain)
    }

    pub fn allows_path(&self, path: &str) -> bool {
        self.path.matches(path)
    }

    pub fn allows(&self, method: HttpMethod, domain: &str, path: &str) -> bool {
        self.allows_method(method) && self.allows_domain(domain) && self.allows_path(path)
    }
}

/// API token as held in memory and persisted
///
/// The secret is never stored; `hash` is its argon2id PHC string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    id: u64,
    hash: String,
    #[serde(default)]
    permissions: Vec<TokenPermission>,
}

impl Token {
    /// Create a token without permissions
    pub fn new(id: u64, hash: impl Into<String>) -> Self {
        Self {
            id,
            hash: hash.into(),
            permissions: Vec::new(),
        }
    }

    /// Replace the permission list
    pub fn with_permissions(mut self, permissions: Vec<TokenPermission>) -> Self {
        self.permissions = permissions;
        self
    }

    /// A copy of this token with one more permission
    pub fn with_permission(&self, permission: TokenPermission) -> Self {
        let mut next = self.clone();
        next.permissions.push(permission);
        next
    }

    /// A copy of this token without any rule equal to `permission`
    pub fn without_permission(&self, permission: &TokenPermission) -> Self {
        let mut next = self.clone();
        next.permissions.retain(|p| p != permission);
        next
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn permissions(&self) -> &[TokenPermission] {
        &self.permissions
    }

    /// First matching permission grants access
    pub fn allows(&self, method: HttpMethod, domain: &str, path: &str) -> bool {
        self.permissions
            .iter()
            .any(|p| p.allows(method, domain, path))
    }
}

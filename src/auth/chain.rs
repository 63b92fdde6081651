//! Authentication chains
//!
//! A chain runs its adapters in insertion order and stops at the first one
//! that cancels the result. URLs matching one of the chain's exclusion
//! patterns skip the adapters entirely.
//!
//! Adapter and exclusion lists are copy-on-write snapshots: a request
//! iterates the list it loaded even if the chain is modified meanwhile.

use std::any::TypeId;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use regex::Regex;
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::exchange::{Request, SessionStorage};

use super::adapter::AuthAdapter;
use super::result::AuthResult;

/// An ordered pipeline of [`AuthAdapter`]s
pub trait AuthChain: Send + Sync {
    /// Run the request through the chain
    fn authenticate(&self, request: &Request, storage: &mut SessionStorage) -> AuthResult;

    /// Add an adapter at the end. Returns `false` if this instance is
    /// already part of the chain.
    fn append(&self, adapter: Arc<dyn AuthAdapter>) -> bool;

    /// Remove one adapter instance
    fn remove(&self, adapter: &Arc<dyn AuthAdapter>) -> bool;

    /// Remove every adapter whose concrete type is `type_id`
    fn remove_all_of(&self, type_id: TypeId) -> usize;

    /// Snapshot of the adapters in execution order
    fn adapters(&self) -> Vec<Arc<dyn AuthAdapter>>;
}

impl dyn AuthChain {
    /// Remove every adapter of type `T`
    pub fn remove_all<T: AuthAdapter>(&self) -> usize {
        self.remove_all_of(TypeId::of::<T>())
    }
}

/// Compile one exclusion pattern the way the chain will match it
pub fn compile_exclusion(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|e| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

#[derive(Default)]
struct Exclusions {
    sources: Vec<String>,
    matcher: Option<Regex>,
}

impl Exclusions {
    fn compile(sources: Vec<String>) -> Result<Self, ConfigError> {
        if sources.is_empty() {
            return Ok(Self::default());
        }

        let joined = sources
            .iter()
            .map(|s| format!("(?:{s})"))
            .collect::<Vec<_>>()
            .join("|");
        let matcher = Regex::new(&format!("^(?:{joined})$")).map_err(|e| {
            ConfigError::InvalidPattern {
                pattern: joined.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            sources,
            matcher: Some(matcher),
        })
    }

    fn matches(&self, url: &str) -> bool {
        self.matcher.as_ref().is_some_and(|m| m.is_match(url))
    }
}

/// Pointer identity, ignoring trait object metadata
fn same_instance<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Default [`AuthChain`] implementation
pub struct SimpleAuthChain {
    adapters: ArcSwap<Vec<Arc<dyn AuthAdapter>>>,
    exclusions: ArcSwap<Exclusions>,
    exclusion_writer: Mutex<()>,
}

impl Default for SimpleAuthChain {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SimpleAuthChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let adapters = self.adapters.load();
        f.debug_struct("SimpleAuthChain")
            .field(
                "adapters",
                &adapters.iter().map(|a| a.name().to_string()).collect::<Vec<_>>(),
            )
            .field("exclusions", &self.exclusions.load().sources)
            .finish()
    }
}

impl SimpleAuthChain {
    pub fn new() -> Self {
        Self {
            adapters: ArcSwap::from_pointee(Vec::new()),
            exclusions: ArcSwap::from_pointee(Exclusions::default()),
            exclusion_writer: Mutex::new(()),
        }
    }

    /// Builder-style [`AuthChain::append`]
    pub fn with_adapter(self, adapter: Arc<dyn AuthAdapter>) -> Self {
        self.append(adapter);
        self
    }

    /// Add a URL pattern that bypasses authentication
    ///
    /// Patterns must match the whole path. Returns `Ok(false)` if the pattern
    /// is already present.
    pub fn add_exclusion(&self, pattern: &str) -> Result<bool, ConfigError> {
        compile_exclusion(pattern)?;

        let _guard = self.exclusion_writer.lock();
        let current = self.exclusions.load();
        if current.sources.iter().any(|s| s == pattern) {
            return Ok(false);
        }

        let mut sources = current.sources.clone();
        sources.push(pattern.to_string());
        self.exclusions.store(Arc::new(Exclusions::compile(sources)?));
        info!(pattern = pattern, "Added auth exclusion");
        Ok(true)
    }

    pub fn remove_exclusion(&self, pattern: &str) -> bool {
        let _guard = self.exclusion_writer.lock();
        let current = self.exclusions.load();
        if !current.sources.iter().any(|s| s == pattern) {
            return false;
        }

        let sources: Vec<String> = current
            .sources
            .iter()
            .filter(|s| *s != pattern)
            .cloned()
            .collect();
        // Every remaining source compiled before, so the union does too
        match Exclusions::compile(sources) {
            Ok(next) => {
                self.exclusions.store(Arc::new(next));
                info!(pattern = pattern, "Removed auth exclusion");
                true
            }
            Err(_) => false,
        }
    }

    pub fn exclusions(&self) -> Vec<String> {
        self.exclusions.load().sources.clone()
    }

    pub fn is_excluded(&self, url: &str) -> bool {
        self.exclusions.load().matches(url)
    }

    fn retain(&self, keep: impl Fn(&Arc<dyn AuthAdapter>) -> bool) -> usize {
        let mut removed = 0;
        self.adapters.rcu(|current| {
            let next: Vec<_> = current.iter().filter(|a| keep(*a)).cloned().collect();
            removed = current.len() - next.len();
            next
        });
        removed
    }
}

impl AuthChain for SimpleAuthChain {
    fn authenticate(&self, request: &Request, storage: &mut SessionStorage) -> AuthResult {
        let mut result = AuthResult::new();

        if self.is_excluded(request.url()) {
            debug!(path = %request.url(), "Path excluded from authentication");
            return result;
        }

        for adapter in self.adapters.load().iter() {
            adapter.authenticate(&mut result, request, storage);
            if result.is_cancelled() {
                debug!(
                    adapter = adapter.name(),
                    reason = result.cancel_reason(),
                    "Auth chain stopped"
                );
                break;
            }
        }

        result
    }

    fn append(&self, adapter: Arc<dyn AuthAdapter>) -> bool {
        let mut added = false;
        self.adapters.rcu(|current| {
            added = !current.iter().any(|a| same_instance(a, &adapter));
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            if added {
                next.push(Arc::clone(&adapter));
            }
            next
        });

        if added {
            info!(adapter = adapter.name(), "Appended auth adapter");
        }
        added
    }

    fn remove(&self, adapter: &Arc<dyn AuthAdapter>) -> bool {
        let removed = self.retain(|a| !same_instance(a, adapter)) > 0;
        if removed {
            info!(adapter = adapter.name(), "Removed auth adapter");
        }
        removed
    }

    fn remove_all_of(&self, type_id: TypeId) -> usize {
        let removed = self.retain(|a| a.adapter_type_id() != type_id);
        if removed > 0 {
            info!(count = removed, "Removed auth adapters by type");
        }
        removed
    }

    fn adapters(&self) -> Vec<Arc<dyn AuthAdapter>> {
        self.adapters.load().iter().cloned().collect()
    }
}

/// Registry of every installed [`AuthChain`]
///
/// A request must pass all chains. The first chain that cancels decides the
/// outcome.
pub struct AuthChainManager {
    chains: ArcSwap<Vec<Arc<dyn AuthChain>>>,
}

impl Default for AuthChainManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AuthChainManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthChainManager")
            .field("chains", &self.chains.load().len())
            .finish()
    }
}

impl AuthChainManager {
    pub fn new() -> Self {
        Self {
            chains: ArcSwap::from_pointee(Vec::new()),
        }
    }

    pub fn register(&self, chain: Arc<dyn AuthChain>) {
        self.chains.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(Arc::clone(&chain));
            next
        });
    }

    pub fn unregister(&self, chain: &Arc<dyn AuthChain>) -> bool {
        let mut removed = false;
        self.chains.rcu(|current| {
            let next: Vec<_> = current
                .iter()
                .filter(|c| !same_instance(*c, chain))
                .cloned()
                .collect();
            removed = next.len() != current.len();
            next
        });
        removed
    }

    pub fn chains(&self) -> Vec<Arc<dyn AuthChain>> {
        self.chains.load().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.chains.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.load().is_empty()
    }

    /// Run the request through every chain, stopping at the first rejection
    pub fn authenticate(&self, request: &Request, storage: &mut SessionStorage) -> AuthResult {
        for chain in self.chains.load().iter() {
            let result = chain.authenticate(request, storage);
            if result.is_cancelled() {
                return result;
            }
        }
        AuthResult::new()
    }
}

//! Token manager
//!
//! This module provides the registry of bearer tokens. It mints new tokens,
//! revokes them, and moves the collection to and from a [`TokenStore`].
//!
//! Lookups are lock-free reads on a sharded map; the auth adapter calls
//! [`TokenManager::get`] once per request.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::error::{PersistenceError, TokenError};
use crate::events::EventBus;
use crate::models::{Token, TokenPermission};

use super::snowflake::Snowflake;
use super::store::TokenStore;
use super::token::{encode_bearer, generate_secret, hash_secret};

/// Registry of bearer tokens keyed by id
pub struct TokenManager {
    tokens: DashMap<u64, Arc<Token>>,
    store: Arc<dyn TokenStore>,
    events: Arc<EventBus>,
    ids: Snowflake,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("tokens", &self.tokens.len())
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Create an empty manager. Call [`TokenManager::load`] to read the store.
    pub fn new(store: Arc<dyn TokenStore>, events: Arc<EventBus>) -> Self {
        Self {
            tokens: DashMap::new(),
            store,
            events,
            ids: Snowflake::default(),
        }
    }

    /// Read every token from the store into the registry
    ///
    /// A missing or malformed document counts as no tokens. Records that fail
    /// to decode are skipped one by one. Returns the number of tokens loaded.
    pub fn load(&self) -> Result<usize, TokenError> {
        let document = match self.store.load() {
            Ok(Some(document)) => document,
            Ok(None) => {
                info!("No stored tokens found");
                return Ok(0);
            }
            Err(PersistenceError::Serialization(e)) => {
                warn!(error = %e, "Token store is not valid JSON, starting without tokens");
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };

        let serde_json::Value::Array(records) = document else {
            warn!("Token store does not hold an array, starting without tokens");
            return Ok(0);
        };

        let mut loaded = 0;
        for (position, record) in records.into_iter().enumerate() {
            match serde_json::from_value::<Token>(record) {
                Ok(token) => {
                    self.tokens.insert(token.id(), Arc::new(token));
                    loaded += 1;
                }
                Err(e) => {
                    warn!(position = position, error = %e, "Skipping malformed token record");
                }
            }
        }

        info!(count = loaded, "Loaded tokens");
        Ok(loaded)
    }

    /// Write every registered token to the store, replacing its content
    pub fn save(&self) -> Result<(), TokenError> {
        let tokens = self.tokens();
        let document = serde_json::to_value(
            tokens.iter().map(|t| t.as_ref()).collect::<Vec<&Token>>(),
        )
        .map_err(PersistenceError::from)?;

        self.store.save(&document)?;
        info!(count = tokens.len(), "Saved tokens");
        Ok(())
    }

    /// Mint a new token
    ///
    /// Returns the bearer string and the stored token. The bearer string is
    /// the only place the plaintext secret ever appears.
    pub fn generate(
        &self,
        permissions: Vec<TokenPermission>,
    ) -> Result<(String, Arc<Token>), TokenError> {
        let secret = generate_secret();
        let hash = hash_secret(&secret)?;
        let id = self.ids.generate();
        let token = Token::new(id, hash).with_permissions(permissions);

        if self.events.token_create(&token).is_cancelled() {
            debug!(token_id = id, "Token creation cancelled by listener");
            return Err(TokenError::Cancelled);
        }

        let token = Arc::new(token);
        self.tokens.insert(id, Arc::clone(&token));
        info!(
            token_id = id,
            permissions = token.permissions().len(),
            "Generated token"
        );

        Ok((encode_bearer(id, &secret), token))
    }

    /// Remove a token from the registry
    ///
    /// Returns `false` when the token was not registered or a listener
    /// vetoed the revocation.
    pub fn revoke(&self, token: &Token) -> bool {
        if !self.tokens.contains_key(&token.id()) {
            return false;
        }

        if self.events.token_revoke(token).is_cancelled() {
            debug!(token_id = token.id(), "Token revocation cancelled by listener");
            return false;
        }

        let removed = self.tokens.remove(&token.id()).is_some();
        if removed {
            info!(token_id = token.id(), "Revoked token");
        }
        removed
    }

    /// Insert a token, replacing any token with the same id
    ///
    /// This is how permission changes take effect: build the new value with
    /// [`Token::with_permission`] and register it.
    pub fn register_token(&self, token: Token) -> Option<Arc<Token>> {
        let id = token.id();
        let previous = self.tokens.insert(id, Arc::new(token));
        debug!(token_id = id, replaced = previous.is_some(), "Registered token");
        previous
    }

    pub fn get(&self, id: u64) -> Option<Arc<Token>> {
        self.tokens.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Snapshot of all tokens ordered by id
    pub fn tokens(&self) -> Vec<Arc<Token>> {
        let mut tokens: Vec<Arc<Token>> = self
            .tokens
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        tokens.sort_by_key(|t| t.id());
        tokens
    }

    pub(crate) fn events(&self) -> &EventBus {
        &self.events
    }
}

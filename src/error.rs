//! Application error types for cnet-security
//!
//! This module defines the error types used throughout the crate.
//! Authentication failures are deliberately absent: a rejected request is a
//! cancelled [`AuthResult`](crate::auth::AuthResult), never an `Err`.

use thiserror::Error;

/// Configuration errors
///
/// These are fatal at startup. A context that fails to build with one of
/// these must not serve traffic.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Rate limit adapter id contains something other than ASCII letters
    #[error("Rate limit adapter ids may only contain letters (invalid id: '{0}')")]
    InvalidAdapterId(String),

    /// Rate limit window outside of `(0, 31 days]`
    #[error("Rate limit window must be between 1 and {max} milliseconds, got {window}")]
    InvalidWindow {
        /// The rejected window in milliseconds
        window: u64,
        /// The largest accepted window in milliseconds
        max: u64,
    },

    /// Two rate limit adapters share the same id
    #[error("Rate limit adapter id '{0}' is already registered")]
    DuplicateAdapter(String),

    /// A URL or permission pattern failed to compile
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern source
        pattern: String,
        /// Compiler message
        reason: String,
    },

    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Token persistence errors
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// IO error while reading or writing the token file
    #[error("Token store IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The token collection could not be encoded or decoded
    #[error("Token store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Token lifecycle errors
#[derive(Debug, Error)]
pub enum TokenError {
    /// Hashing the secret failed
    #[error("Hash failed: {0}")]
    Hash(String),

    /// A listener vetoed the operation
    #[error("Token operation cancelled by listener")]
    Cancelled,

    /// Persisting the tokens failed
    #[error("Token persistence failed: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Errors raised by the [`SecurityContext`](crate::context::SecurityContext)
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ContextError {
    /// A component was requested that was never installed
    #[error("There is no instance of {0} registered")]
    NotRegistered(&'static str),
}

/// Application-level error type
///
/// Aggregates all domain-specific error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Persistence error
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Token error
    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    /// Context error
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: ConfigError message formatting
    #[test]
    fn test_config_error_messages() {
        assert_eq!(
            ConfigError::InvalidAdapterId("ip4".to_string()).to_string(),
            "Rate limit adapter ids may only contain letters (invalid id: 'ip4')"
        );
        assert_eq!(
            ConfigError::InvalidWindow { window: 0, max: 10 }.to_string(),
            "Rate limit window must be between 1 and 10 milliseconds, got 0"
        );
        assert_eq!(
            ConfigError::DuplicateAdapter("IP".to_string()).to_string(),
            "Rate limit adapter id 'IP' is already registered"
        );
    }

    // Test 2: From conversions for AppError
    #[test]
    fn test_app_error_from_config_error() {
        let err: AppError = ConfigError::DuplicateAdapter("TOKEN".to_string()).into();

        match err {
            AppError::Config(ConfigError::DuplicateAdapter(id)) => assert_eq!(id, "TOKEN"),
            _ => panic!("Expected AppError::Config(ConfigError::DuplicateAdapter)"),
        }
    }

    // Test 3: PersistenceError from IO error
    #[test]
    fn test_persistence_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: PersistenceError = io_err.into();

        match err {
            PersistenceError::Io(_) => (),
            _ => panic!("Expected PersistenceError::Io"),
        }
    }

    // Test 4: TokenError wraps persistence failures
    #[test]
    fn test_token_error_from_persistence() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err: TokenError = PersistenceError::from(io_err).into();

        assert_eq!(
            err.to_string(),
            "Token persistence failed: Token store IO error: disk full"
        );
    }

    // Test 5: ContextError names the missing component
    #[test]
    fn test_context_error_message() {
        let err = ContextError::NotRegistered("TokenManager");
        assert_eq!(err.to_string(), "There is no instance of TokenManager registered");

        let app_err: AppError = err.into();
        assert_eq!(
            app_err.to_string(),
            "Context error: There is no instance of TokenManager registered"
        );
    }
}

//! Domain models for cnet-security
//!
//! This module contains the persisted value types used throughout the crate.

pub mod token;

// Re-export commonly used types
pub use token::{Pattern, Token, TokenPermission};

//! Authentication for cnet-security
//!
//! This module provides the authentication pipeline:
//! - Auth adapters and ordered auth chains with URL exclusions
//! - Bearer token minting, hashing and verification
//! - The token registry and its persistence

pub mod adapter;
pub mod chain;
pub mod manager;
pub mod result;
pub mod snowflake;
pub mod store;
pub mod token;
pub mod token_adapter;

pub use adapter::{fail_auth, AuthAdapter, INVALID_TOKEN_REASON, NO_ACCESS_REASON};
pub use chain::{compile_exclusion, AuthChain, AuthChainManager, SimpleAuthChain};
pub use manager::TokenManager;
pub use result::AuthResult;
pub use snowflake::Snowflake;
pub use store::{JsonFileStore, TokenStore};
pub use token::{encode_bearer, generate_secret, hash_secret, parse_bearer, verify_secret, TOKEN_PREFIX};
pub use token_adapter::{AuthenticatedToken, TokenAuthAdapter};

//! Bearer token secrets and wire format
//!
//! This module provides functions for generating, hashing, verifying and
//! parsing bearer tokens.
//!
//! The wire format is `cnet_` + the token id as 16 lower-case hex digits +
//! the plaintext secret, with no separator between id and secret. Secrets
//! are alphanumeric so the single `_` stays unambiguous.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;

use crate::error::TokenError;

/// Token prefix for cnet bearer tokens
pub const TOKEN_PREFIX: &str = "cnet_";

/// Number of hex digits that encode the token id
pub const TOKEN_ID_HEX_LEN: usize = 16;

/// Shortest generated secret
const SECRET_MIN_LEN: usize = 45;

/// Longest generated secret
const SECRET_MAX_LEN: usize = 70;

/// Generate a new plaintext secret
///
/// The secret is 45 to 70 alphanumeric characters drawn from the OS RNG.
/// It should be shown to the user only once, at creation time.
pub fn generate_secret() -> String {
    let mut rng = OsRng;
    let len = rng.gen_range(SECRET_MIN_LEN..=SECRET_MAX_LEN);
    (&mut rng)
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Hash a secret using Argon2id
///
/// The hash includes a random salt; the same secret hashes differently
/// every time.
///
/// # Example
///
/// ```
/// use cnet_security::auth::token::{generate_secret, hash_secret};
///
/// let secret = generate_secret();
/// let hash = hash_secret(&secret).unwrap();
/// assert!(hash.starts_with("$argon2id$"));
/// ```
pub fn hash_secret(secret: &str) -> Result<String, TokenError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| TokenError::Hash(e.to_string()))
}

/// Verify a secret against a stored hash
///
/// Returns `false` for a malformed hash as well as for a wrong secret.
///
/// # Example
///
/// ```
/// use cnet_security::auth::token::{hash_secret, verify_secret};
///
/// let hash = hash_secret("s3cret").unwrap();
/// assert!(verify_secret("s3cret", &hash));
/// assert!(!verify_secret("wrong", &hash));
/// ```
pub fn verify_secret(secret: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Build the bearer string for a token id and its plaintext secret
pub fn encode_bearer(id: u64, secret: &str) -> String {
    format!("{TOKEN_PREFIX}{id:016x}{secret}")
}

/// Split a bearer string into token id and secret candidate
///
/// Returns `None` for anything that is not `cnet_<16 hex><secret>` with a
/// non-empty secret. Callers must not reveal which check failed.
pub fn parse_bearer(key: &str) -> Option<(u64, &str)> {
    let mut parts = key.split('_');
    let (prefix, tail) = (parts.next()?, parts.next()?);
    if parts.next().is_some() || TOKEN_PREFIX.strip_suffix('_') != Some(prefix) {
        return None;
    }

    if tail.len() <= TOKEN_ID_HEX_LEN {
        return None;
    }

    let hex = tail.get(..TOKEN_ID_HEX_LEN)?;
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }

    let id = u64::from_str_radix(hex, 16).ok()?;
    Some((id, &tail[TOKEN_ID_HEX_LEN..]))
}

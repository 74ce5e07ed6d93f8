//! Opaque refresh-token material.
//!
//! Refresh tokens are random values, not signed tokens. Only the SHA-256
//! hash is persisted; the raw value crosses the API exactly once.

use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use sha2::{Digest, Sha256};

/// Refresh token lifetime: 30 days.
pub const REFRESH_TOKEN_TTL_DAYS: i64 = 30;

/// Generate a cryptographically random refresh token (64 alphanumeric chars).
pub fn generate_refresh_token() -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

/// SHA-256 hash a refresh token for storage.
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

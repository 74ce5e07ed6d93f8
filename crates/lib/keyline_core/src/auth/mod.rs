//! Authentication and authorization logic.
//!
//! Provides password hashing, access-token issuance, refresh-token
//! material, and the identity/session store seam shared with `keyline_api`.

pub mod jwt;
pub mod password;
pub mod refresh;

use thiserror::Error;

/// Authentication errors.
///
/// Expected domain failures (`InvalidCredentials`, `InvalidOrExpiredToken`,
/// `Conflict`) are values callers branch on, not panics; the HTTP boundary
/// translates them into failure envelopes.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid or expired refresh token")]
    InvalidOrExpiredToken,

    #[error("Signing configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

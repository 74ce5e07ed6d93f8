//! External provider linking: signed link-state tokens, OAuth clients,
//! token protection, and the refresh-on-read policy helpers.

pub mod gate;
pub mod oauth;
pub mod protect;
pub mod state;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// Skew applied before the stored expiry when deciding whether a cached
/// provider token must be refreshed.
pub const EXPIRY_SKEW_SECS: i64 = 60;

/// External-linking errors.
#[derive(Debug, Error)]
pub enum ExternalError {
    #[error("Invalid or expired state token")]
    InvalidState,

    #[error("State token was issued for a different provider")]
    ProviderMismatch,

    #[error("No {0} account is linked")]
    NotLinked(String),

    #[error("Stored token is missing required scope: {0}")]
    MissingScope(String),

    #[error("No refresh token is stored for {0}")]
    NoRefreshToken(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Link configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Refresh-on-read policy: refresh once `now + skew` reaches the stored
/// expiry, so callers never receive a token about to die mid-use.
pub fn needs_refresh(now: DateTime<Utc>, expires_at: DateTime<Utc>) -> bool {
    now + Duration::seconds(EXPIRY_SKEW_SECS) >= expires_at
}

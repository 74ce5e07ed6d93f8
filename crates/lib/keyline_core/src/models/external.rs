//! External provider link and cached token models.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A link between an identity and a (provider, subject) pair, with a
/// snapshot of the provider-side email and display name.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExternalIdentityRecord {
    pub id: Uuid,
    pub identity_id: Uuid,
    pub provider: String,
    pub provider_subject_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub linked_at: DateTime<Utc>,
}

/// Fields required to create or update a provider link.
#[derive(Debug, Clone)]
pub struct NewExternalLink {
    pub identity_id: Uuid,
    pub provider: String,
    pub provider_subject_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Cached provider token pair for one (identity, provider). Token columns
/// hold protected (encrypted) values; rows are mutated in place on refresh.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExternalTokenRecord {
    pub id: Uuid,
    pub identity_id: Uuid,
    pub provider: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub scopes: String,
    pub updated_at: DateTime<Utc>,
}

impl ExternalTokenRecord {
    /// Whether the space-delimited scope grant covers `scope`.
    pub fn scopes_contain(&self, scope: &str) -> bool {
        self.scopes.split_whitespace().any(|s| s == scope)
    }
}

/// Create-or-update payload for a cached token pair.
///
/// `refresh_token` and `scopes` are optional: when the provider omits them
/// (repeat consent), the previously stored values are preserved.
#[derive(Debug, Clone)]
pub struct ExternalTokenUpsert {
    pub identity_id: Uuid,
    pub provider: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub scopes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(scopes: &str) -> ExternalTokenRecord {
        ExternalTokenRecord {
            id: Uuid::new_v4(),
            identity_id: Uuid::new_v4(),
            provider: "google".into(),
            access_token: "protected".into(),
            refresh_token: None,
            expires_at: Utc::now(),
            scopes: scopes.into(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn scope_check_is_exact_match_per_entry() {
        let t = token("openid email https://www.googleapis.com/auth/calendar.readonly");
        assert!(t.scopes_contain("email"));
        assert!(t.scopes_contain("https://www.googleapis.com/auth/calendar.readonly"));
        assert!(!t.scopes_contain("calendar"));
        assert!(!token("").scopes_contain("email"));
    }
}

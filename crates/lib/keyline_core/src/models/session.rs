//! Session models — one row per issued refresh token.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A session backing a single refresh token. Only the SHA-256 hash of the
/// token is kept; revocation sets `revoked_at` and the row stays in place.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRecord {
    pub id: Uuid,
    pub identity_id: Uuid,
    pub refresh_token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Whether the session can still redeem its refresh token.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

/// Client metadata captured at login/refresh time.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_name: Option<String>,
}

/// Fields required to persist a new session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub identity_id: Uuid,
    pub refresh_token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub client: ClientInfo,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(expires_in: Duration, revoked: bool) -> SessionRecord {
        let now = Utc::now();
        SessionRecord {
            id: Uuid::new_v4(),
            identity_id: Uuid::new_v4(),
            refresh_token_hash: "hash".into(),
            expires_at: now + expires_in,
            revoked_at: revoked.then_some(now),
            ip_address: None,
            user_agent: None,
            device_name: None,
            created_at: now,
        }
    }

    #[test]
    fn active_session_requires_unexpired_and_unrevoked() {
        let now = Utc::now();
        assert!(session(Duration::hours(1), false).is_active(now));
        assert!(!session(Duration::hours(-1), false).is_active(now));
        assert!(!session(Duration::hours(1), true).is_active(now));
    }
}

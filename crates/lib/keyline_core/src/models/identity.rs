//! Identity account models.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// An identity account. Soft-deleted rows keep their data with `deleted` set;
/// nothing is ever hard-deleted.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Identity {
    pub id: Uuid,
    pub username: Option<String>,
    pub email: String,
    pub normalized_username: Option<String>,
    pub normalized_email: String,
    pub password_hash: Option<String>,
    pub display_name: Option<String>,
    pub locked: bool,
    pub deleted: bool,
    pub failed_access_count: i32,
    pub two_factor_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    /// Whether this identity may sign in at all.
    pub fn can_sign_in(&self) -> bool {
        !self.locked && !self.deleted
    }

    /// The name presented in token claims: username when present, else email.
    pub fn preferred_username(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.email)
    }
}

/// Fields required to create an identity.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub username: Option<String>,
    pub email: String,
    pub password_hash: Option<String>,
    pub display_name: Option<String>,
}

/// Normalized (uppercased) form used for case-insensitive lookup of
/// usernames and emails.
pub fn normalize(value: &str) -> String {
    value.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_uppercases_and_trims() {
        assert_eq!(normalize("  Alice@Example.com "), "ALICE@EXAMPLE.COM");
    }

    fn identity(username: Option<&str>) -> Identity {
        Identity {
            id: Uuid::new_v4(),
            username: username.map(str::to_string),
            email: "a@example.com".into(),
            normalized_username: username.map(normalize),
            normalized_email: normalize("a@example.com"),
            password_hash: None,
            display_name: None,
            locked: false,
            deleted: false,
            failed_access_count: 0,
            two_factor_enabled: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn preferred_username_falls_back_to_email() {
        assert_eq!(identity(Some("alice")).preferred_username(), "alice");
        assert_eq!(identity(None).preferred_username(), "a@example.com");
    }

    #[test]
    fn locked_or_deleted_cannot_sign_in() {
        let mut id = identity(Some("alice"));
        assert!(id.can_sign_in());
        id.locked = true;
        assert!(!id.can_sign_in());
        id.locked = false;
        id.deleted = true;
        assert!(!id.can_sign_in());
    }
}

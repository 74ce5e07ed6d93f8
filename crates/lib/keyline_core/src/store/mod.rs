//! Store seams for identities, sessions, and external tokens.
//!
//! The flows in `keyline_api` talk to these traits; `pg` holds the
//! PostgreSQL implementations and the `testing` module (feature
//! `test-utils`) holds in-memory doubles for the integration tests.

pub mod pg;

use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::AuthError;
use crate::external::ExternalError;
use crate::models::external::{
    ExternalIdentityRecord, ExternalTokenRecord, ExternalTokenUpsert, NewExternalLink,
};
use crate::models::identity::{Identity, NewIdentity};
use crate::models::session::{NewSession, SessionRecord};

/// Identities, role/permission aggregation, and sessions.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Look up an identity by normalized username OR normalized email.
    async fn find_by_login(&self, normalized: &str) -> Result<Option<Identity>, AuthError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, AuthError>;

    /// Insert a new identity. A taken username or email is a `Conflict`.
    async fn create(&self, new: NewIdentity) -> Result<Identity, AuthError>;

    async fn record_failed_access(&self, id: Uuid) -> Result<(), AuthError>;

    async fn reset_failed_access(&self, id: Uuid) -> Result<(), AuthError>;

    /// Distinct role names: direct assignments plus roles granted through
    /// group membership.
    async fn effective_role_names(&self, id: Uuid) -> Result<Vec<String>, AuthError>;

    /// Distinct permission names across all effective roles.
    async fn effective_permission_names(&self, id: Uuid) -> Result<Vec<String>, AuthError>;

    async fn create_session(&self, new: NewSession) -> Result<SessionRecord, AuthError>;

    /// A session whose refresh-token hash matches, not revoked, not expired.
    async fn find_active_session_by_hash(
        &self,
        hash: &str,
    ) -> Result<Option<SessionRecord>, AuthError>;

    /// Revoke one session. Idempotent: revoking an already-revoked or
    /// unknown session is a no-op.
    async fn revoke_session(&self, session_id: Uuid) -> Result<(), AuthError>;

    /// Revoke the session holding this refresh-token hash. Idempotent.
    async fn revoke_session_by_hash(&self, hash: &str) -> Result<(), AuthError>;

    /// Revoke one of the identity's own active sessions. Returns whether a
    /// row matched.
    async fn revoke_owned_session(
        &self,
        identity_id: Uuid,
        session_id: Uuid,
    ) -> Result<bool, AuthError>;

    /// Revoke every active session for an identity.
    async fn revoke_sessions_for_identity(&self, identity_id: Uuid) -> Result<(), AuthError>;

    async fn list_active_sessions(
        &self,
        identity_id: Uuid,
    ) -> Result<Vec<SessionRecord>, AuthError>;
}

/// External provider links and cached provider tokens.
#[async_trait]
pub trait ExternalStore: Send + Sync {
    async fn find_link(
        &self,
        identity_id: Uuid,
        provider: &str,
    ) -> Result<Option<ExternalIdentityRecord>, ExternalError>;

    async fn find_link_by_subject(
        &self,
        provider: &str,
        subject_id: &str,
    ) -> Result<Option<ExternalIdentityRecord>, ExternalError>;

    /// Create or update the (identity, provider) link. A subject already
    /// linked to a different identity is a `Conflict`.
    async fn upsert_link(
        &self,
        link: NewExternalLink,
    ) -> Result<ExternalIdentityRecord, ExternalError>;

    async fn find_token(
        &self,
        identity_id: Uuid,
        provider: &str,
    ) -> Result<Option<ExternalTokenRecord>, ExternalError>;

    /// Create or update the cached token pair in place. Omitted refresh
    /// token and scopes preserve the stored values.
    async fn upsert_token(&self, token: ExternalTokenUpsert) -> Result<(), ExternalError>;

    /// Persist the outcome of a refresh call: new access token and expiry,
    /// plus scopes / refresh token when the provider returned them.
    async fn apply_refresh(
        &self,
        identity_id: Uuid,
        provider: &str,
        access_token: &str,
        expires_at: chrono::DateTime<chrono::Utc>,
        scopes: Option<String>,
        refresh_token: Option<String>,
    ) -> Result<(), ExternalError>;
}

/// Whether a database error is a unique-constraint violation (PG 23505).
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

//! PostgreSQL store implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{ExternalStore, IdentityStore, is_unique_violation};
use crate::auth::AuthError;
use crate::external::ExternalError;
use crate::models::external::{
    ExternalIdentityRecord, ExternalTokenRecord, ExternalTokenUpsert, NewExternalLink,
};
use crate::models::identity::{Identity, NewIdentity, normalize};
use crate::models::session::{NewSession, SessionRecord};
use crate::uuid::uuidv7;

/// Identity + session store over PostgreSQL.
#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn find_by_login(&self, normalized: &str) -> Result<Option<Identity>, AuthError> {
        let row = sqlx::query_as::<_, Identity>(
            "SELECT * FROM identities \
             WHERE normalized_username = $1 OR normalized_email = $1",
        )
        .bind(normalized)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, AuthError> {
        let row = sqlx::query_as::<_, Identity>("SELECT * FROM identities WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn create(&self, new: NewIdentity) -> Result<Identity, AuthError> {
        let row = sqlx::query_as::<_, Identity>(
            "INSERT INTO identities \
                 (username, email, normalized_username, normalized_email, \
                  password_hash, display_name) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING *",
        )
        .bind(&new.username)
        .bind(&new.email)
        .bind(new.username.as_deref().map(normalize))
        .bind(normalize(&new.email))
        .bind(&new.password_hash)
        .bind(&new.display_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AuthError::Conflict("Username or email is already taken".into())
            } else {
                AuthError::Db(e)
            }
        })?;
        Ok(row)
    }

    async fn record_failed_access(&self, id: Uuid) -> Result<(), AuthError> {
        sqlx::query(
            "UPDATE identities \
             SET failed_access_count = failed_access_count + 1, updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reset_failed_access(&self, id: Uuid) -> Result<(), AuthError> {
        sqlx::query(
            "UPDATE identities SET failed_access_count = 0, updated_at = now() \
             WHERE id = $1 AND failed_access_count <> 0",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn effective_role_names(&self, id: Uuid) -> Result<Vec<String>, AuthError> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT r.name FROM roles r \
             WHERE r.id IN ( \
                 SELECT role_id FROM identity_roles WHERE identity_id = $1 \
                 UNION \
                 SELECT gr.role_id FROM group_roles gr \
                 JOIN group_members gm ON gm.group_id = gr.group_id \
                 WHERE gm.identity_id = $1 \
             ) \
             ORDER BY r.name",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn effective_permission_names(&self, id: Uuid) -> Result<Vec<String>, AuthError> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT p.name FROM permissions p \
             JOIN role_permissions rp ON rp.permission_id = p.id \
             WHERE rp.role_id IN ( \
                 SELECT role_id FROM identity_roles WHERE identity_id = $1 \
                 UNION \
                 SELECT gr.role_id FROM group_roles gr \
                 JOIN group_members gm ON gm.group_id = gr.group_id \
                 WHERE gm.identity_id = $1 \
             ) \
             ORDER BY p.name",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn create_session(&self, new: NewSession) -> Result<SessionRecord, AuthError> {
        let row = sqlx::query_as::<_, SessionRecord>(
            "INSERT INTO sessions \
                 (id, identity_id, refresh_token_hash, expires_at, \
                  ip_address, user_agent, device_name) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING *",
        )
        .bind(uuidv7())
        .bind(new.identity_id)
        .bind(&new.refresh_token_hash)
        .bind(new.expires_at)
        .bind(&new.client.ip_address)
        .bind(&new.client.user_agent)
        .bind(&new.client.device_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_active_session_by_hash(
        &self,
        hash: &str,
    ) -> Result<Option<SessionRecord>, AuthError> {
        let row = sqlx::query_as::<_, SessionRecord>(
            "SELECT * FROM sessions \
             WHERE refresh_token_hash = $1 \
               AND revoked_at IS NULL \
               AND expires_at > now()",
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn revoke_session(&self, session_id: Uuid) -> Result<(), AuthError> {
        sqlx::query("UPDATE sessions SET revoked_at = now() WHERE id = $1 AND revoked_at IS NULL")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn revoke_session_by_hash(&self, hash: &str) -> Result<(), AuthError> {
        sqlx::query(
            "UPDATE sessions SET revoked_at = now() \
             WHERE refresh_token_hash = $1 AND revoked_at IS NULL",
        )
        .bind(hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revoke_owned_session(
        &self,
        identity_id: Uuid,
        session_id: Uuid,
    ) -> Result<bool, AuthError> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked_at = now() \
             WHERE id = $1 AND identity_id = $2 AND revoked_at IS NULL",
        )
        .bind(session_id)
        .bind(identity_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_sessions_for_identity(&self, identity_id: Uuid) -> Result<(), AuthError> {
        sqlx::query(
            "UPDATE sessions SET revoked_at = now() \
             WHERE identity_id = $1 AND revoked_at IS NULL",
        )
        .bind(identity_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_active_sessions(
        &self,
        identity_id: Uuid,
    ) -> Result<Vec<SessionRecord>, AuthError> {
        let rows = sqlx::query_as::<_, SessionRecord>(
            "SELECT * FROM sessions \
             WHERE identity_id = $1 AND revoked_at IS NULL AND expires_at > now() \
             ORDER BY created_at DESC",
        )
        .bind(identity_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// External link + token store over PostgreSQL.
#[derive(Clone)]
pub struct PgExternalStore {
    pool: PgPool,
}

impl PgExternalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExternalStore for PgExternalStore {
    async fn find_link(
        &self,
        identity_id: Uuid,
        provider: &str,
    ) -> Result<Option<ExternalIdentityRecord>, ExternalError> {
        let row = sqlx::query_as::<_, ExternalIdentityRecord>(
            "SELECT * FROM external_identities WHERE identity_id = $1 AND provider = $2",
        )
        .bind(identity_id)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_link_by_subject(
        &self,
        provider: &str,
        subject_id: &str,
    ) -> Result<Option<ExternalIdentityRecord>, ExternalError> {
        let row = sqlx::query_as::<_, ExternalIdentityRecord>(
            "SELECT * FROM external_identities \
             WHERE provider = $1 AND provider_subject_id = $2",
        )
        .bind(provider)
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn upsert_link(
        &self,
        link: NewExternalLink,
    ) -> Result<ExternalIdentityRecord, ExternalError> {
        let row = sqlx::query_as::<_, ExternalIdentityRecord>(
            "INSERT INTO external_identities \
                 (id, identity_id, provider, provider_subject_id, email, display_name) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (identity_id, provider) DO UPDATE SET \
                 provider_subject_id = EXCLUDED.provider_subject_id, \
                 email = EXCLUDED.email, \
                 display_name = EXCLUDED.display_name \
             RETURNING *",
        )
        .bind(uuidv7())
        .bind(link.identity_id)
        .bind(&link.provider)
        .bind(&link.provider_subject_id)
        .bind(&link.email)
        .bind(&link.display_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            // The (provider, subject) index: this external account is
            // already linked to a different identity.
            if is_unique_violation(&e) {
                ExternalError::Conflict(
                    "This external account is already linked to another user".into(),
                )
            } else {
                ExternalError::Db(e)
            }
        })?;
        Ok(row)
    }

    async fn find_token(
        &self,
        identity_id: Uuid,
        provider: &str,
    ) -> Result<Option<ExternalTokenRecord>, ExternalError> {
        let row = sqlx::query_as::<_, ExternalTokenRecord>(
            "SELECT * FROM external_tokens WHERE identity_id = $1 AND provider = $2",
        )
        .bind(identity_id)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn upsert_token(&self, token: ExternalTokenUpsert) -> Result<(), ExternalError> {
        sqlx::query(
            "INSERT INTO external_tokens \
                 (id, identity_id, provider, access_token, refresh_token, \
                  expires_at, scopes) \
             VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, '')) \
             ON CONFLICT (identity_id, provider) DO UPDATE SET \
                 access_token = EXCLUDED.access_token, \
                 refresh_token = COALESCE(EXCLUDED.refresh_token, external_tokens.refresh_token), \
                 expires_at = EXCLUDED.expires_at, \
                 scopes = COALESCE($7, external_tokens.scopes), \
                 updated_at = now()",
        )
        .bind(uuidv7())
        .bind(token.identity_id)
        .bind(&token.provider)
        .bind(&token.access_token)
        .bind(&token.refresh_token)
        .bind(token.expires_at)
        .bind(&token.scopes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn apply_refresh(
        &self,
        identity_id: Uuid,
        provider: &str,
        access_token: &str,
        expires_at: DateTime<Utc>,
        scopes: Option<String>,
        refresh_token: Option<String>,
    ) -> Result<(), ExternalError> {
        sqlx::query(
            "UPDATE external_tokens SET \
                 access_token = $3, \
                 expires_at = $4, \
                 scopes = COALESCE($5, scopes), \
                 refresh_token = COALESCE($6, refresh_token), \
                 updated_at = now() \
             WHERE identity_id = $1 AND provider = $2",
        )
        .bind(identity_id)
        .bind(provider)
        .bind(access_token)
        .bind(expires_at)
        .bind(scopes)
        .bind(refresh_token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

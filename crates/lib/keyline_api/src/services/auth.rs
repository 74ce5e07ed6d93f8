//! Authentication flows: login, register, refresh rotation, logout,
//! and session management.

use chrono::{Duration, Utc};
use tracing::info;
use uuid::Uuid;

use keyline_core::auth::password::{hash_password, verify_password};
use keyline_core::auth::refresh::{generate_refresh_token, hash_refresh_token};
use keyline_core::models::identity::{Identity, NewIdentity, normalize};
use keyline_core::models::session::{ClientInfo, NewSession};

use crate::AppState;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    FieldError, RegisterRequest, SessionResponse, TokenPairResponse, UserSummary,
};

/// Issue an access + refresh pair for an identity and persist the backing
/// session row. Shared by login, register, and refresh.
async fn issue_token_pair(
    state: &AppState,
    identity: &Identity,
    client: ClientInfo,
) -> ApiResult<TokenPairResponse> {
    let roles = state.identities.effective_role_names(identity.id).await?;
    let issued = state.issuer.issue(identity, &roles)?;

    let refresh_token = generate_refresh_token();
    let refresh_expires_at = Utc::now() + Duration::days(state.config.refresh_ttl_days);

    state
        .identities
        .create_session(NewSession {
            identity_id: identity.id,
            refresh_token_hash: hash_refresh_token(&refresh_token),
            expires_at: refresh_expires_at,
            client,
        })
        .await?;

    Ok(TokenPairResponse {
        access_token: issued.token,
        access_token_expires_at: issued.expires_at,
        refresh_token,
        refresh_token_expires_at: refresh_expires_at,
        token_type: "Bearer".to_string(),
        user: UserSummary::from_identity(identity, roles),
    })
}

/// Authenticate with a username or email plus password.
///
/// Missing, locked, and soft-deleted identities all fail with the same
/// generic message; a password mismatch additionally bumps the identity's
/// failed-access counter.
pub async fn login(
    state: &AppState,
    identifier: &str,
    password: &str,
    client: ClientInfo,
) -> ApiResult<TokenPairResponse> {
    let identity = state
        .identities
        .find_by_login(&normalize(identifier))
        .await?;

    let identity = match identity {
        Some(identity) if identity.can_sign_in() => identity,
        _ => return Err(ApiError::Failed("Invalid credentials".into())),
    };

    let Some(password_hash) = identity.password_hash.as_deref() else {
        // External-only account with no local password.
        return Err(ApiError::Failed("Invalid credentials".into()));
    };

    if !verify_password(password, password_hash)? {
        state.identities.record_failed_access(identity.id).await?;
        return Err(ApiError::Failed("Invalid credentials".into()));
    }

    state.identities.reset_failed_access(identity.id).await?;
    info!(identity = %identity.id, "login succeeded");

    issue_token_pair(state, &identity, client).await
}

/// Create an account, then behave exactly like a successful login.
pub async fn register(
    state: &AppState,
    req: RegisterRequest,
    client: ClientInfo,
) -> ApiResult<TokenPairResponse> {
    let mut errors = Vec::new();

    let username = req.username.trim();
    if username.len() < 3 || username.len() > 32 {
        errors.push(FieldError::new(
            "username",
            "Username must be between 3 and 32 characters",
        ));
    } else if username.chars().any(char::is_whitespace) {
        errors.push(FieldError::new("username", "Username must not contain spaces"));
    }

    let email = req.email.trim();
    if !email.contains('@') || email.len() < 3 {
        errors.push(FieldError::new("email", "A valid email address is required"));
    }

    if req.password.len() < 8 {
        errors.push(FieldError::new(
            "password",
            "Password must be at least 8 characters",
        ));
    }

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let identity = state
        .identities
        .create(NewIdentity {
            username: Some(username.to_string()),
            email: email.to_string(),
            password_hash: Some(hash_password(&req.password)?),
            display_name: req.display_name,
        })
        .await?;

    info!(identity = %identity.id, "identity registered");

    issue_token_pair(state, &identity, client).await
}

/// Redeem a refresh token for a new token pair, rotating the session.
///
/// The old session is revoked and a fresh one created so a replayed
/// refresh token dies on first reuse.
pub async fn refresh(
    state: &AppState,
    refresh_token: &str,
    client: ClientInfo,
) -> ApiResult<TokenPairResponse> {
    let hash = hash_refresh_token(refresh_token);

    let session = state
        .identities
        .find_active_session_by_hash(&hash)
        .await?
        .ok_or_else(|| ApiError::Failed("Invalid or expired refresh token".into()))?;

    let identity = state
        .identities
        .find_by_id(session.identity_id)
        .await?
        .filter(Identity::can_sign_in)
        .ok_or_else(|| ApiError::Failed("Invalid or expired refresh token".into()))?;

    state.identities.revoke_session(session.id).await?;

    issue_token_pair(state, &identity, client).await
}

/// Revoke the session behind a refresh token. Idempotent: revoking an
/// unknown or already-revoked token is a no-op success.
pub async fn logout(state: &AppState, refresh_token: Option<&str>) -> ApiResult<()> {
    if let Some(token) = refresh_token {
        state
            .identities
            .revoke_session_by_hash(&hash_refresh_token(token))
            .await?;
    }
    Ok(())
}

/// Revoke every active session for the calling identity.
pub async fn logout_all(state: &AppState, identity_id: Uuid) -> ApiResult<()> {
    state
        .identities
        .revoke_sessions_for_identity(identity_id)
        .await?;
    info!(identity = %identity_id, "all sessions revoked");
    Ok(())
}

/// Active sessions for the calling identity, newest first.
pub async fn list_sessions(
    state: &AppState,
    identity_id: Uuid,
) -> ApiResult<Vec<SessionResponse>> {
    let sessions = state.identities.list_active_sessions(identity_id).await?;
    Ok(sessions.into_iter().map(SessionResponse::from).collect())
}

/// Revoke one of the caller's own sessions by id.
pub async fn revoke_session(
    state: &AppState,
    identity_id: Uuid,
    session_id: Uuid,
) -> ApiResult<()> {
    let revoked = state
        .identities
        .revoke_owned_session(identity_id, session_id)
        .await?;
    if !revoked {
        return Err(ApiError::NotFound("Session not found".into()));
    }
    Ok(())
}

//! Session management handlers. All require authentication.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{Envelope, SessionResponse};
use crate::services::auth;

/// `GET /sessions` — the caller's active sessions, newest first.
pub async fn list_sessions_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ApiResult<Json<Envelope<Vec<SessionResponse>>>> {
    let sessions = auth::list_sessions(&state, user.identity_id()?).await?;
    Ok(Json(Envelope::ok(sessions)))
}

/// `DELETE /sessions/{id}` — revoke one of the caller's sessions.
pub async fn revoke_session_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<Envelope<()>>> {
    auth::revoke_session(&state, user.identity_id()?, session_id).await?;
    Ok(Json(Envelope::message_only("Session revoked")))
}

/// `POST /auth/logout-all` — revoke every active session for the caller.
pub async fn logout_all_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ApiResult<Json<Envelope<()>>> {
    auth::logout_all(&state, user.identity_id()?).await?;
    Ok(Json(Envelope::message_only("All sessions revoked")))
}

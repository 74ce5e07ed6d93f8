//! User profile handlers.

use axum::extract::State;
use axum::{Extension, Json};

use crate::AppState;
use crate::error::ApiResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{Envelope, UserResponse};
use crate::services::users;

/// `GET /users/me` — the caller's profile with effective roles and
/// aggregated permissions.
pub async fn me_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ApiResult<Json<Envelope<UserResponse>>> {
    let profile = users::me(&state, user.identity_id()?).await?;
    Ok(Json(Envelope::ok(profile)))
}

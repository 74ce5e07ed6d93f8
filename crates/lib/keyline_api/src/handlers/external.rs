//! External account linking handlers. All require authentication.

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};

use crate::AppState;
use crate::error::ApiResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    CachedTokenQuery, CachedTokenResponse, CompleteLinkRequest, Envelope, LinkResponse,
    StartLinkResponse,
};
use crate::services::external;

/// `POST /external/{provider}/link` — begin the OAuth linking dance.
pub async fn start_link_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(provider): Path<String>,
) -> ApiResult<Json<Envelope<StartLinkResponse>>> {
    let resp = external::start_link(&state, user.identity_id()?, &provider).await?;
    Ok(Json(Envelope::ok(resp)))
}

/// `POST /external/{provider}/link/complete` — redeem the authorization
/// code delivered to the redirect URI.
pub async fn complete_link_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(provider): Path<String>,
    Json(body): Json<CompleteLinkRequest>,
) -> ApiResult<Json<Envelope<LinkResponse>>> {
    let resp = external::complete_link(&state, user.identity_id()?, &provider, body).await?;
    Ok(Json(Envelope::ok(resp)))
}

/// `GET /external/{provider}/token` — the cached provider access token,
/// refreshed on read when near expiry.
pub async fn cached_token_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(provider): Path<String>,
    Query(query): Query<CachedTokenQuery>,
) -> ApiResult<Json<Envelope<CachedTokenResponse>>> {
    let scope = query
        .scope
        .unwrap_or_else(|| external::DEFAULT_CALENDAR_SCOPE.to_string());
    let resp =
        external::cached_access_token(&state, user.identity_id()?, &provider, &scope).await?;
    Ok(Json(Envelope::ok(resp)))
}

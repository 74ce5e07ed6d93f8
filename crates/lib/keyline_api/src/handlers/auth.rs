//! Authentication request handlers.

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;

use crate::AppState;
use crate::error::ApiResult;
use crate::handlers::client_info;
use crate::models::{
    Envelope, LoginRequest, LogoutRequest, RefreshRequest, RegisterRequest, TokenPairResponse,
};
use crate::services::auth;

/// `POST /auth/login` — authenticate with username/email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> ApiResult<Json<Envelope<TokenPairResponse>>> {
    let client = client_info(&headers, body.device_name.clone());
    let pair = auth::login(&state, &body.identifier, &body.password, client).await?;
    Ok(Json(Envelope::ok(pair)))
}

/// `POST /auth/register` — create a new account and sign it in.
pub async fn register_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RegisterRequest>,
) -> ApiResult<Json<Envelope<TokenPairResponse>>> {
    let client = client_info(&headers, None);
    let pair = auth::register(&state, body, client).await?;
    Ok(Json(Envelope::ok(pair)))
}

/// `POST /auth/refresh` — exchange a refresh token for a new token pair.
pub async fn refresh_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RefreshRequest>,
) -> ApiResult<Json<Envelope<TokenPairResponse>>> {
    let client = client_info(&headers, body.device_name.clone());
    let pair = auth::refresh(&state, &body.refresh_token, client).await?;
    Ok(Json(Envelope::ok(pair)))
}

/// `POST /auth/logout` — revoke a refresh token. Idempotent.
pub async fn logout_handler(
    State(state): State<AppState>,
    Json(body): Json<LogoutRequest>,
) -> ApiResult<Json<Envelope<()>>> {
    auth::logout(&state, body.refresh_token.as_deref()).await?;
    Ok(Json(Envelope::message_only("Logged out")))
}

//! # keyline_api
//!
//! HTTP API library for Keyline.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};

use keyline_core::auth::AuthError;
use keyline_core::auth::jwt::TokenIssuer;
use keyline_core::external::gate::RefreshGate;
use keyline_core::external::oauth::{GoogleOAuthClient, GoogleOAuthConfig, OAuthProviderClient};
use keyline_core::external::protect::TokenProtector;
use keyline_core::external::state::LinkStateService;
use keyline_core::store::pg::{PgExternalStore, PgIdentityStore};
use keyline_core::store::{ExternalStore, IdentityStore};

use crate::config::ApiConfig;
use crate::handlers::{auth, external, sessions, users};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Identity + session store.
    pub identities: Arc<dyn IdentityStore>,
    /// External link + token store.
    pub external: Arc<dyn ExternalStore>,
    /// OAuth client for the supported external provider.
    pub oauth: Arc<dyn OAuthProviderClient>,
    /// Access-token issuer.
    pub issuer: Arc<TokenIssuer>,
    /// Link-state signer/validator.
    pub link_states: Arc<LinkStateService>,
    /// Protection for external tokens at rest.
    pub protector: Arc<TokenProtector>,
    /// Single-flight gate around refresh-on-read.
    pub refresh_gate: Arc<RefreshGate>,
    /// API configuration.
    pub config: ApiConfig,
}

impl AppState {
    /// Wire the production stores and the Google OAuth client.
    ///
    /// Fails fast on blank signing configuration — a startup error, not a
    /// per-request one.
    pub fn from_config(config: ApiConfig, pool: PgPool) -> Result<Self, AuthError> {
        let issuer = TokenIssuer::new(config.token.clone())?;
        let link_states =
            LinkStateService::new(&config.link_state_secret, config.link_state_ttl_minutes)
                .map_err(|e| AuthError::Configuration(e.to_string()))?;

        let google = GoogleOAuthClient::new(GoogleOAuthConfig::new(
            config.google_client_id.clone(),
            config.google_client_secret.clone(),
            config.google_redirect_uri.clone(),
        ));

        Ok(Self {
            identities: Arc::new(PgIdentityStore::new(pool.clone())),
            external: Arc::new(PgExternalStore::new(pool)),
            oauth: Arc::new(google),
            issuer: Arc::new(issuer),
            link_states: Arc::new(link_states),
            protector: Arc::new(TokenProtector::new(&config.token_encryption_key)),
            refresh_gate: Arc::new(RefreshGate::new()),
            config,
        })
    }
}

/// Run embedded database migrations.
///
/// Delegates to `keyline_core::migrate::migrate()` which owns the
/// migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    keyline_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/refresh", post(auth::refresh_handler))
        .route("/auth/logout", post(auth::logout_handler));

    // Protected routes (require a valid access token)
    let protected = Router::new()
        .route("/auth/logout-all", post(sessions::logout_all_handler))
        .route("/users/me", get(users::me_handler))
        .route("/sessions", get(sessions::list_sessions_handler))
        .route("/sessions/{id}", delete(sessions::revoke_session_handler))
        .route("/external/{provider}/link", post(external::start_link_handler))
        .route(
            "/external/{provider}/link/complete",
            post(external::complete_link_handler),
        )
        .route("/external/{provider}/token", get(external::cached_token_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(cors)
        .with_state(state)
}

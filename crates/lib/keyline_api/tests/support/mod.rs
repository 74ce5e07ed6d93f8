//! Shared helpers for integration tests: build the router over in-memory
//! stores and a scripted OAuth client, drive it with `tower::ServiceExt`.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use keyline_api::AppState;
use keyline_api::config::ApiConfig;
use keyline_core::auth::jwt::{TokenIssuer, TokenIssuerConfig};
use keyline_core::external::gate::RefreshGate;
use keyline_core::external::protect::TokenProtector;
use keyline_core::external::state::LinkStateService;
use keyline_core::testing::{MemoryExternalStore, MemoryIdentityStore, ScriptedOAuthClient};

pub struct TestApp {
    pub state: AppState,
    pub identities: Arc<MemoryIdentityStore>,
    pub external: Arc<MemoryExternalStore>,
    pub oauth: Arc<ScriptedOAuthClient>,
    pub protector: Arc<TokenProtector>,
}

pub fn test_app() -> TestApp {
    let identities = Arc::new(MemoryIdentityStore::new());
    let external = Arc::new(MemoryExternalStore::new());
    let oauth = Arc::new(ScriptedOAuthClient::new());
    let protector = Arc::new(TokenProtector::new("integration-test-encryption-key"));

    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".into(),
        database_url: String::new(),
        token: TokenIssuerConfig {
            issuer: "keyline-tests".into(),
            audience: "keyline-clients".into(),
            signing_key: "integration-test-signing-key".into(),
            access_ttl_minutes: 60,
        },
        refresh_ttl_days: 30,
        link_state_secret: "integration-test-state-secret".into(),
        link_state_ttl_minutes: 10,
        token_encryption_key: "integration-test-encryption-key".into(),
        google_client_id: String::new(),
        google_client_secret: String::new(),
        google_redirect_uri: String::new(),
    };

    let issuer = TokenIssuer::new(config.token.clone()).expect("token issuer");
    let link_states =
        LinkStateService::new(&config.link_state_secret, config.link_state_ttl_minutes)
            .expect("link-state service");

    let state = AppState {
        identities: identities.clone(),
        external: external.clone(),
        oauth: oauth.clone(),
        issuer: Arc::new(issuer),
        link_states: Arc::new(link_states),
        protector: protector.clone(),
        refresh_gate: Arc::new(RefreshGate::new()),
        config,
    };

    TestApp {
        state,
        identities,
        external,
        oauth,
        protector,
    }
}

impl TestApp {
    pub fn router(&self) -> Router {
        keyline_api::router(self.state.clone())
    }

    /// Fire one request, returning status and parsed JSON body.
    pub async fn request(
        &self,
        method: &str,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(value) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(value.to_string()))
                .expect("build request"),
            None => builder.body(Body::empty()).expect("build request"),
        };

        let response = self.router().oneshot(request).await.expect("send request");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("parse JSON body")
        };
        (status, json)
    }

    /// Register an account, asserting success; returns the envelope `data`
    /// (token pair + user).
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Value {
        let (status, body) = self
            .request(
                "POST",
                "/auth/register",
                None,
                Some(json!({
                    "username": username,
                    "email": email,
                    "password": password,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "register failed: {body}");
        assert_eq!(body["success"], true);
        body["data"].clone()
    }
}

/// Identity id from a token-pair response.
pub fn user_id(data: &Value) -> Uuid {
    Uuid::parse_str(data["user"]["id"].as_str().expect("user id"))
        .expect("user id is a uuid")
}

/// Access token from a token-pair response.
pub fn access_token(data: &Value) -> String {
    data["accessToken"].as_str().expect("access token").to_string()
}

/// Refresh token from a token-pair response.
pub fn refresh_token(data: &Value) -> String {
    data["refreshToken"]
        .as_str()
        .expect("refresh token")
        .to_string()
}

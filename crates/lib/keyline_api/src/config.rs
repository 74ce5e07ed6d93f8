//! API server configuration.

use keyline_core::auth::jwt::TokenIssuerConfig;
use keyline_core::auth::refresh::REFRESH_TOKEN_TTL_DAYS;

/// Configuration for the API server.
///
/// Signing configuration has no development fallback: a blank issuer,
/// audience, or key fails fast when the token issuer is constructed.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:8600").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Access-token signing parameters.
    pub token: TokenIssuerConfig,
    /// Refresh-token lifetime in days.
    pub refresh_ttl_days: i64,
    /// Secret signing the OAuth link-state tokens.
    pub link_state_secret: String,
    /// Link-state lifetime in minutes; non-positive falls back to 10.
    pub link_state_ttl_minutes: i64,
    /// Passphrase protecting external provider tokens at rest.
    pub token_encryption_key: String,
    /// Google OAuth credentials.
    pub google_client_id: String,
    pub google_client_secret: String,
    pub google_redirect_uri: String,
}

impl ApiConfig {
    /// Reads configuration from environment variables.
    ///
    /// | Variable                    | Default                                  |
    /// |-----------------------------|------------------------------------------|
    /// | `BIND_ADDR`                 | `127.0.0.1:8600`                         |
    /// | `DATABASE_URL`              | `postgres://localhost:5432/keyline`      |
    /// | `JWT_ISSUER` / `JWT_AUDIENCE` / `JWT_SIGNING_KEY` | none — required     |
    /// | `ACCESS_TOKEN_TTL_MINUTES`  | 60                                       |
    /// | `REFRESH_TOKEN_TTL_DAYS`    | 30                                       |
    /// | `LINK_STATE_SECRET`         | falls back to `JWT_SIGNING_KEY`          |
    /// | `LINK_STATE_TTL_MINUTES`    | 10                                       |
    /// | `TOKEN_ENCRYPTION_KEY`      | dev key, change in production            |
    pub fn from_env() -> Self {
        let signing_key = env_or("JWT_SIGNING_KEY", "");
        Self {
            bind_addr: env_or("BIND_ADDR", "127.0.0.1:8600"),
            database_url: env_or("DATABASE_URL", "postgres://localhost:5432/keyline"),
            token: TokenIssuerConfig {
                issuer: env_or("JWT_ISSUER", ""),
                audience: env_or("JWT_AUDIENCE", ""),
                signing_key: signing_key.clone(),
                access_ttl_minutes: env_i64("ACCESS_TOKEN_TTL_MINUTES"),
            },
            refresh_ttl_days: {
                let days = env_i64("REFRESH_TOKEN_TTL_DAYS");
                if days > 0 { days } else { REFRESH_TOKEN_TTL_DAYS }
            },
            link_state_secret: {
                let secret = env_or("LINK_STATE_SECRET", "");
                if secret.is_empty() { signing_key } else { secret }
            },
            link_state_ttl_minutes: env_i64("LINK_STATE_TTL_MINUTES"),
            token_encryption_key: env_or(
                "TOKEN_ENCRYPTION_KEY",
                "keyline-default-dev-key-change-in-production",
            ),
            google_client_id: env_or("GOOGLE_CLIENT_ID", ""),
            google_client_secret: env_or("GOOGLE_CLIENT_SECRET", ""),
            google_redirect_uri: env_or(
                "GOOGLE_REDIRECT_URI",
                "http://localhost:8600/external/google/callback",
            ),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an integer env var; absent or malformed yields 0, letting the
/// consuming component apply its own default.
fn env_i64(key: &str) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

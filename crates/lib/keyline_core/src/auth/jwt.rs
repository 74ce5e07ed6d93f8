//! Access-token issuance and verification.
//!
//! [`TokenIssuer`] is a constructed component holding its signing parameters
//! (issuer, audience, key, lifetime) as immutable state. Missing or blank
//! signing configuration is a construction error, not a per-request failure.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use super::AuthError;
use crate::models::identity::Identity;

/// Default access-token lifetime in minutes.
const DEFAULT_ACCESS_TTL_MINUTES: i64 = 60;

/// Role claim granted when an identity has no roles of its own.
const DEFAULT_ROLE: &str = "User";

/// Claims embedded in access tokens.
///
/// Field order here is the serialization order (subject, username, email,
/// roles, then registered claims), so signed output is reproducible for a
/// given signing key and instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject — identity id in string form.
    pub sub: String,
    /// Username when present, else email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    /// Email, when the identity has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Distinct role names, sorted.
    pub roles: Vec<String>,
    pub iss: String,
    pub aud: String,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
}

/// Signing configuration for [`TokenIssuer`].
#[derive(Debug, Clone)]
pub struct TokenIssuerConfig {
    pub issuer: String,
    pub audience: String,
    pub signing_key: String,
    /// Access-token lifetime in minutes. Non-positive values fall back to
    /// the 60-minute default.
    pub access_ttl_minutes: i64,
}

/// A freshly minted access token with its expiry instant.
#[derive(Debug, Clone)]
pub struct IssuedAccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Mints and verifies HS256 access tokens.
pub struct TokenIssuer {
    issuer: String,
    audience: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
}

impl TokenIssuer {
    /// Build an issuer from configuration.
    ///
    /// Fails when issuer, audience, or signing key is absent or blank —
    /// a fatal startup condition, not a recoverable per-request error.
    pub fn new(config: TokenIssuerConfig) -> Result<Self, AuthError> {
        let issuer = config.issuer.trim().to_string();
        let audience = config.audience.trim().to_string();
        let key = config.signing_key.trim();

        if issuer.is_empty() {
            return Err(AuthError::Configuration("token issuer is not set".into()));
        }
        if audience.is_empty() {
            return Err(AuthError::Configuration("token audience is not set".into()));
        }
        if key.is_empty() {
            return Err(AuthError::Configuration("token signing key is not set".into()));
        }

        let ttl_minutes = if config.access_ttl_minutes > 0 {
            config.access_ttl_minutes
        } else {
            DEFAULT_ACCESS_TTL_MINUTES
        };

        Ok(Self {
            issuer,
            audience,
            encoding_key: EncodingKey::from_secret(key.as_bytes()),
            decoding_key: DecodingKey::from_secret(key.as_bytes()),
            access_ttl: Duration::minutes(ttl_minutes),
        })
    }

    /// Access-token lifetime.
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Mint an access token for `identity` carrying `role_names`.
    pub fn issue(
        &self,
        identity: &Identity,
        role_names: &[String],
    ) -> Result<IssuedAccessToken, AuthError> {
        self.issue_at(identity, role_names, Utc::now())
    }

    /// Mint an access token as of `now`. Split out so signed output is
    /// reproducible in tests.
    pub fn issue_at(
        &self,
        identity: &Identity,
        role_names: &[String],
        now: DateTime<Utc>,
    ) -> Result<IssuedAccessToken, AuthError> {
        let expires_at = now + self.access_ttl;
        let claims = AccessClaims {
            sub: identity.id.to_string(),
            preferred_username: Some(identity.preferred_username().to_string()),
            email: (!identity.email.is_empty()).then(|| identity.email.clone()),
            roles: distinct_sorted_roles(role_names),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))?;

        Ok(IssuedAccessToken { token, expires_at })
    }

    /// Verify an access token: signature, expiry, issuer, audience.
    pub fn verify(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.validate_exp = true;

        decode::<AccessClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidOrExpiredToken)
    }
}

/// De-duplicate role names case-insensitively (first casing wins), sort,
/// and fall back to the default role when the identity has none.
fn distinct_sorted_roles(role_names: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut roles: Vec<String> = role_names
        .iter()
        .filter(|r| !r.trim().is_empty())
        .filter(|r| seen.insert(r.to_lowercase()))
        .cloned()
        .collect();

    if roles.is_empty() {
        roles.push(DEFAULT_ROLE.to_string());
    }
    roles.sort();
    roles
}

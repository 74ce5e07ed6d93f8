//! Signed link-state tokens for the OAuth redirect dance.
//!
//! The state is not persisted anywhere: it is an HS256-signed token binding
//! {identity, provider, issued-at} with a short TTL, verified stateless on
//! the callback. This is the CSRF defense for external linking, so it is a
//! real MAC, never a reversible encoding.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ExternalError;

/// Default link-state lifetime: 10 minutes.
pub const DEFAULT_STATE_TTL_MINUTES: i64 = 10;

/// Purpose claim value; rejects access tokens fed into the callback.
const LINK_PURPOSE: &str = "external-link";

#[derive(Debug, Serialize, Deserialize)]
struct StateClaims {
    sub: String,
    provider: String,
    purpose: String,
    iat: i64,
    exp: i64,
}

/// The validated contents of a link-state token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkState {
    pub identity_id: Uuid,
    pub provider: String,
}

/// Creates and validates signed link-state tokens.
pub struct LinkStateService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl LinkStateService {
    /// Build the service. A blank secret is a configuration error; a
    /// non-positive TTL falls back to the 10-minute default.
    pub fn new(secret: &str, ttl_minutes: i64) -> Result<Self, ExternalError> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(ExternalError::Configuration(
                "link-state signing secret is not set".into(),
            ));
        }
        let ttl_minutes = if ttl_minutes > 0 {
            ttl_minutes
        } else {
            DEFAULT_STATE_TTL_MINUTES
        };
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::minutes(ttl_minutes),
        })
    }

    /// Produce an opaque signed state for (identity, provider).
    pub fn create_state(
        &self,
        identity_id: Uuid,
        provider: &str,
    ) -> Result<String, ExternalError> {
        self.create_state_at(identity_id, provider, Utc::now())
    }

    /// As [`Self::create_state`], issued as of `now` (split out for expiry
    /// tests).
    pub fn create_state_at(
        &self,
        identity_id: Uuid,
        provider: &str,
        now: DateTime<Utc>,
    ) -> Result<String, ExternalError> {
        let claims = StateClaims {
            sub: identity_id.to_string(),
            provider: provider.trim().to_lowercase(),
            purpose: LINK_PURPOSE.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| ExternalError::Internal(format!("state encode: {e}")))
    }

    /// Decode and verify a state token. Signature mismatch, malformed
    /// payload, wrong purpose, and expiry all collapse into `InvalidState`.
    pub fn validate_state(&self, state: &str) -> Result<LinkState, ExternalError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        // Leeway would let a just-expired state slip through its TTL.
        validation.leeway = 0;

        let claims = decode::<StateClaims>(state, &self.decoding_key, &validation)
            .map_err(|_| ExternalError::InvalidState)?
            .claims;

        if claims.purpose != LINK_PURPOSE {
            return Err(ExternalError::InvalidState);
        }
        let identity_id =
            Uuid::parse_str(&claims.sub).map_err(|_| ExternalError::InvalidState)?;

        Ok(LinkState {
            identity_id,
            provider: claims.provider,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> LinkStateService {
        LinkStateService::new("unit-test-state-secret", DEFAULT_STATE_TTL_MINUTES).unwrap()
    }

    #[test]
    fn blank_secret_is_rejected() {
        assert!(matches!(
            LinkStateService::new("  ", 10),
            Err(ExternalError::Configuration(_))
        ));
    }

    #[test]
    fn round_trip_returns_embedded_identity_and_provider() {
        let svc = service();
        let id = Uuid::new_v4();
        let state = svc.create_state(id, "Google").unwrap();
        let decoded = svc.validate_state(&state).unwrap();
        assert_eq!(
            decoded,
            LinkState {
                identity_id: id,
                provider: "google".into(),
            }
        );
    }

    #[test]
    fn any_single_character_mutation_fails_validation() {
        let svc = service();
        let state = svc.create_state(Uuid::new_v4(), "google").unwrap();

        let bytes = state.as_bytes();
        for pos in [3, state.len() / 2, state.len() - 2] {
            let mut mutated = bytes.to_vec();
            mutated[pos] = if mutated[pos] == b'A' { b'B' } else { b'A' };
            let mutated = String::from_utf8(mutated).unwrap();
            if mutated == state {
                continue;
            }
            assert!(
                matches!(svc.validate_state(&mutated), Err(ExternalError::InvalidState)),
                "mutation at {pos} was accepted"
            );
        }
    }

    #[test]
    fn expired_state_is_rejected() {
        let svc = service();
        let old = Utc::now() - Duration::minutes(DEFAULT_STATE_TTL_MINUTES + 1);
        let state = svc
            .create_state_at(Uuid::new_v4(), "google", old)
            .unwrap();
        assert!(matches!(
            svc.validate_state(&state),
            Err(ExternalError::InvalidState)
        ));
    }

    #[test]
    fn state_signed_with_other_secret_is_rejected() {
        let svc = service();
        let other = LinkStateService::new("a-different-secret", 10).unwrap();
        let state = other.create_state(Uuid::new_v4(), "google").unwrap();
        assert!(svc.validate_state(&state).is_err());
    }

    #[test]
    fn access_token_shaped_garbage_is_rejected() {
        let svc = service();
        assert!(svc.validate_state("not-a-state").is_err());
        assert!(svc.validate_state("").is_err());
    }
}

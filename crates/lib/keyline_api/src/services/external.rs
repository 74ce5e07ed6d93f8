//! External account linking and the cached-token read path.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use keyline_core::external::oauth::TokenGrant;
use keyline_core::external::{ExternalError, needs_refresh};
use keyline_core::models::external::{ExternalTokenUpsert, NewExternalLink};

use crate::AppState;
use crate::error::{ApiError, ApiResult};
use crate::models::{CachedTokenResponse, CompleteLinkRequest, LinkResponse, StartLinkResponse};

/// Scope requested when a cached-token read names none.
pub const DEFAULT_CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar.readonly";

/// Normalize a path-supplied provider name and reject ones we have no
/// client for.
fn resolve_provider(state: &AppState, provider: &str) -> ApiResult<String> {
    let normalized = provider.trim().to_lowercase();
    if normalized != state.oauth.provider() {
        return Err(ApiError::Failed(format!("Unsupported provider: {provider}")));
    }
    Ok(normalized)
}

/// Begin the linking dance: mint a signed state and hand back the
/// provider's authorization URL embedding it.
pub async fn start_link(
    state: &AppState,
    identity_id: Uuid,
    provider: &str,
) -> ApiResult<StartLinkResponse> {
    let provider = resolve_provider(state, provider)?;

    let link_state = state.link_states.create_state(identity_id, &provider)?;
    let authorization_url = state.oauth.authorization_url(&link_state)?;

    Ok(StartLinkResponse {
        authorization_url,
        state: link_state,
        provider,
    })
}

/// Finish the linking dance: validate the state, exchange the code,
/// snapshot the provider profile, and store the protected token pair.
pub async fn complete_link(
    state: &AppState,
    identity_id: Uuid,
    provider: &str,
    req: CompleteLinkRequest,
) -> ApiResult<LinkResponse> {
    let provider = resolve_provider(state, provider)?;

    let link_state = state.link_states.validate_state(&req.state)?;
    if link_state.provider != provider {
        return Err(ExternalError::ProviderMismatch.into());
    }
    if link_state.identity_id != identity_id {
        // A state minted for someone else is as good as forged.
        return Err(ExternalError::InvalidState.into());
    }

    let grant = state.oauth.exchange_code(&req.code).await?;
    if grant.access_token.is_empty() {
        return Err(ExternalError::Provider("provider returned an empty access token".into()).into());
    }

    let profile = state.oauth.fetch_profile(&grant.access_token).await?;

    let link = state
        .external
        .upsert_link(NewExternalLink {
            identity_id,
            provider: provider.clone(),
            provider_subject_id: profile.subject_id,
            email: profile.email,
            display_name: profile.display_name,
        })
        .await?;

    let expires_at = grant_expiry(&grant, Utc::now());
    let protected_access = state.protector.protect(&grant.access_token)?;
    let protected_refresh = grant
        .refresh_token
        .as_deref()
        .map(|t| state.protector.protect(t))
        .transpose()?;

    state
        .external
        .upsert_token(ExternalTokenUpsert {
            identity_id,
            provider: provider.clone(),
            access_token: protected_access,
            refresh_token: protected_refresh,
            expires_at,
            scopes: grant.scope.clone(),
        })
        .await?;

    info!(identity = %identity_id, %provider, "external account linked");

    let stored = state
        .external
        .find_token(identity_id, &provider)
        .await?
        .ok_or_else(|| ApiError::Unexpected("token row missing after upsert".into()))?;

    Ok(LinkResponse {
        provider,
        email: link.email,
        display_name: link.display_name,
        scopes: stored.scopes,
        expires_at: stored.expires_at,
    })
}

/// Read the cached provider access token, refreshing it first when it is
/// within the expiry skew.
///
/// The refresh sequence runs under a per-(identity, provider) lock:
/// concurrent readers racing the expiry would otherwise each call the
/// provider, and refresh-token rotation would strand all but one of them.
pub async fn cached_access_token(
    state: &AppState,
    identity_id: Uuid,
    provider: &str,
    required_scope: &str,
) -> ApiResult<CachedTokenResponse> {
    let provider = resolve_provider(state, provider)?;

    let token = state
        .external
        .find_token(identity_id, &provider)
        .await?
        .ok_or_else(|| ExternalError::NotLinked(provider.clone()))?;

    if !token.scopes_contain(required_scope) {
        return Err(ExternalError::MissingScope(required_scope.to_string()).into());
    }

    if !needs_refresh(Utc::now(), token.expires_at) {
        let access_token = state.protector.unprotect(&token.access_token)?;
        return Ok(CachedTokenResponse {
            provider,
            access_token,
            expires_at: token.expires_at,
        });
    }

    let lock = state.refresh_gate.lock_for(identity_id, &provider);
    let _guard = lock.lock().await;

    // Re-read: a racing caller may have refreshed while we waited.
    let token = state
        .external
        .find_token(identity_id, &provider)
        .await?
        .ok_or_else(|| ExternalError::NotLinked(provider.clone()))?;

    if !needs_refresh(Utc::now(), token.expires_at) {
        debug!(identity = %identity_id, %provider, "token already refreshed by concurrent reader");
        let access_token = state.protector.unprotect(&token.access_token)?;
        return Ok(CachedTokenResponse {
            provider,
            access_token,
            expires_at: token.expires_at,
        });
    }

    let protected_refresh = token
        .refresh_token
        .as_deref()
        .ok_or_else(|| ExternalError::NoRefreshToken(provider.clone()))?;
    let refresh_token = state.protector.unprotect(protected_refresh)?;

    let grant = state.oauth.refresh_token(&refresh_token).await?;
    if grant.access_token.is_empty() {
        return Err(ExternalError::Provider("provider returned an empty access token".into()).into());
    }

    let expires_at = grant_expiry(&grant, Utc::now());
    let protected_access = state.protector.protect(&grant.access_token)?;
    let protected_new_refresh = grant
        .refresh_token
        .as_deref()
        .map(|t| state.protector.protect(t))
        .transpose()?;

    // Persist before handing the fresh token to the caller.
    state
        .external
        .apply_refresh(
            identity_id,
            &provider,
            &protected_access,
            expires_at,
            grant.scope.clone(),
            protected_new_refresh,
        )
        .await?;

    info!(identity = %identity_id, %provider, "external token refreshed on read");

    Ok(CachedTokenResponse {
        provider,
        access_token: grant.access_token,
        expires_at,
    })
}

/// Expiry instant for a grant, from the provider's relative lifetime.
fn grant_expiry(grant: &TokenGrant, now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::seconds(grant.expires_in.max(0))
}

//! In-memory doubles for the store and OAuth seams.
//!
//! Used by the `keyline_api` integration tests to drive the real router
//! without PostgreSQL or a live provider. Enabled via the `test-utils`
//! feature.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::AuthError;
use crate::external::ExternalError;
use crate::external::oauth::{OAuthProviderClient, PROVIDER_GOOGLE, ProviderProfile, TokenGrant};
use crate::models::external::{
    ExternalIdentityRecord, ExternalTokenRecord, ExternalTokenUpsert, NewExternalLink,
};
use crate::models::identity::{Identity, NewIdentity};
use crate::models::session::{NewSession, SessionRecord};
use crate::store::{ExternalStore, IdentityStore};
use crate::uuid::uuidv7;

/// Build a [`TokenGrant`] without going through JSON.
pub fn grant(
    access_token: &str,
    refresh_token: Option<&str>,
    expires_in: i64,
    scope: Option<&str>,
) -> TokenGrant {
    TokenGrant {
        access_token: access_token.to_string(),
        token_type: "Bearer".to_string(),
        expires_in,
        refresh_token: refresh_token.map(str::to_string),
        scope: scope.map(str::to_string),
    }
}

// ---------------------------------------------------------------------------
// Identity / session store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct AuthState {
    identities: Vec<Identity>,
    direct_roles: HashMap<Uuid, Vec<String>>,
    group_roles: HashMap<Uuid, Vec<String>>,
    /// Keyed by lowercased role name.
    role_permissions: HashMap<String, Vec<String>>,
    sessions: Vec<SessionRecord>,
}

/// In-memory [`IdentityStore`].
#[derive(Default)]
pub struct MemoryIdentityStore {
    inner: Mutex<AuthState>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: read an identity back.
    pub fn identity_snapshot(&self, id: Uuid) -> Option<Identity> {
        self.inner
            .lock()
            .unwrap()
            .identities
            .iter()
            .find(|i| i.id == id)
            .cloned()
    }

    /// Test hook: lock or unlock an identity.
    pub fn set_locked(&self, id: Uuid, locked: bool) {
        let mut state = self.inner.lock().unwrap();
        if let Some(identity) = state.identities.iter_mut().find(|i| i.id == id) {
            identity.locked = locked;
        }
    }

    /// Test hook: soft-delete an identity.
    pub fn set_deleted(&self, id: Uuid, deleted: bool) {
        let mut state = self.inner.lock().unwrap();
        if let Some(identity) = state.identities.iter_mut().find(|i| i.id == id) {
            identity.deleted = deleted;
        }
    }

    /// Test hook: assign a role directly to an identity.
    pub fn grant_role(&self, id: Uuid, role: &str) {
        let mut state = self.inner.lock().unwrap();
        state.direct_roles.entry(id).or_default().push(role.to_string());
    }

    /// Test hook: assign a role via group membership.
    pub fn grant_group_role(&self, id: Uuid, role: &str) {
        let mut state = self.inner.lock().unwrap();
        state.group_roles.entry(id).or_default().push(role.to_string());
    }

    /// Test hook: attach a permission to a role.
    pub fn grant_role_permission(&self, role: &str, permission: &str) {
        let mut state = self.inner.lock().unwrap();
        state
            .role_permissions
            .entry(role.to_lowercase())
            .or_default()
            .push(permission.to_string());
    }

    /// Test hook: all sessions for an identity, revoked ones included.
    pub fn sessions_snapshot(&self, identity_id: Uuid) -> Vec<SessionRecord> {
        self.inner
            .lock()
            .unwrap()
            .sessions
            .iter()
            .filter(|s| s.identity_id == identity_id)
            .cloned()
            .collect()
    }
}

/// Case-insensitive de-duplication keeping the first casing, then sort.
fn distinct_sorted(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out: Vec<String> = names
        .into_iter()
        .filter(|n| seen.insert(n.to_lowercase()))
        .collect();
    out.sort();
    out
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_by_login(&self, normalized: &str) -> Result<Option<Identity>, AuthError> {
        let state = self.inner.lock().unwrap();
        Ok(state
            .identities
            .iter()
            .find(|i| {
                i.normalized_username.as_deref() == Some(normalized)
                    || i.normalized_email == normalized
            })
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, AuthError> {
        Ok(self.identity_snapshot(id))
    }

    async fn create(&self, new: NewIdentity) -> Result<Identity, AuthError> {
        use crate::models::identity::normalize;

        let mut state = self.inner.lock().unwrap();
        let normalized_username = new.username.as_deref().map(normalize);
        let normalized_email = normalize(&new.email);

        let taken = state.identities.iter().any(|i| {
            i.normalized_email == normalized_email
                || (normalized_username.is_some()
                    && i.normalized_username == normalized_username)
        });
        if taken {
            return Err(AuthError::Conflict("Username or email is already taken".into()));
        }

        let now = Utc::now();
        let identity = Identity {
            id: Uuid::new_v4(),
            username: new.username,
            email: new.email,
            normalized_username,
            normalized_email,
            password_hash: new.password_hash,
            display_name: new.display_name,
            locked: false,
            deleted: false,
            failed_access_count: 0,
            two_factor_enabled: false,
            created_at: now,
            updated_at: now,
        };
        state.identities.push(identity.clone());
        Ok(identity)
    }

    async fn record_failed_access(&self, id: Uuid) -> Result<(), AuthError> {
        let mut state = self.inner.lock().unwrap();
        if let Some(identity) = state.identities.iter_mut().find(|i| i.id == id) {
            identity.failed_access_count += 1;
        }
        Ok(())
    }

    async fn reset_failed_access(&self, id: Uuid) -> Result<(), AuthError> {
        let mut state = self.inner.lock().unwrap();
        if let Some(identity) = state.identities.iter_mut().find(|i| i.id == id) {
            identity.failed_access_count = 0;
        }
        Ok(())
    }

    async fn effective_role_names(&self, id: Uuid) -> Result<Vec<String>, AuthError> {
        let state = self.inner.lock().unwrap();
        let names = state
            .direct_roles
            .get(&id)
            .into_iter()
            .chain(state.group_roles.get(&id))
            .flatten()
            .cloned();
        Ok(distinct_sorted(names))
    }

    async fn effective_permission_names(&self, id: Uuid) -> Result<Vec<String>, AuthError> {
        let roles = self.effective_role_names(id).await?;
        let state = self.inner.lock().unwrap();
        let names = roles
            .iter()
            .filter_map(|r| state.role_permissions.get(&r.to_lowercase()))
            .flatten()
            .cloned();
        Ok(distinct_sorted(names))
    }

    async fn create_session(&self, new: NewSession) -> Result<SessionRecord, AuthError> {
        let mut state = self.inner.lock().unwrap();
        let session = SessionRecord {
            id: uuidv7(),
            identity_id: new.identity_id,
            refresh_token_hash: new.refresh_token_hash,
            expires_at: new.expires_at,
            revoked_at: None,
            ip_address: new.client.ip_address,
            user_agent: new.client.user_agent,
            device_name: new.client.device_name,
            created_at: Utc::now(),
        };
        state.sessions.push(session.clone());
        Ok(session)
    }

    async fn find_active_session_by_hash(
        &self,
        hash: &str,
    ) -> Result<Option<SessionRecord>, AuthError> {
        let now = Utc::now();
        let state = self.inner.lock().unwrap();
        Ok(state
            .sessions
            .iter()
            .find(|s| s.refresh_token_hash == hash && s.is_active(now))
            .cloned())
    }

    async fn revoke_session(&self, session_id: Uuid) -> Result<(), AuthError> {
        let mut state = self.inner.lock().unwrap();
        if let Some(session) = state
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id && s.revoked_at.is_none())
        {
            session.revoked_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn revoke_session_by_hash(&self, hash: &str) -> Result<(), AuthError> {
        let mut state = self.inner.lock().unwrap();
        if let Some(session) = state
            .sessions
            .iter_mut()
            .find(|s| s.refresh_token_hash == hash && s.revoked_at.is_none())
        {
            session.revoked_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn revoke_owned_session(
        &self,
        identity_id: Uuid,
        session_id: Uuid,
    ) -> Result<bool, AuthError> {
        let mut state = self.inner.lock().unwrap();
        if let Some(session) = state.sessions.iter_mut().find(|s| {
            s.id == session_id && s.identity_id == identity_id && s.revoked_at.is_none()
        }) {
            session.revoked_at = Some(Utc::now());
            return Ok(true);
        }
        Ok(false)
    }

    async fn revoke_sessions_for_identity(&self, identity_id: Uuid) -> Result<(), AuthError> {
        let mut state = self.inner.lock().unwrap();
        for session in state
            .sessions
            .iter_mut()
            .filter(|s| s.identity_id == identity_id && s.revoked_at.is_none())
        {
            session.revoked_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn list_active_sessions(
        &self,
        identity_id: Uuid,
    ) -> Result<Vec<SessionRecord>, AuthError> {
        let now = Utc::now();
        let state = self.inner.lock().unwrap();
        let mut sessions: Vec<SessionRecord> = state
            .sessions
            .iter()
            .filter(|s| s.identity_id == identity_id && s.is_active(now))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }
}

// ---------------------------------------------------------------------------
// External link / token store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ExternalState {
    links: Vec<ExternalIdentityRecord>,
    tokens: Vec<ExternalTokenRecord>,
}

/// In-memory [`ExternalStore`].
#[derive(Default)]
pub struct MemoryExternalStore {
    inner: Mutex<ExternalState>,
}

impl MemoryExternalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: read the stored (still protected) token row.
    pub fn token_snapshot(&self, identity_id: Uuid, provider: &str) -> Option<ExternalTokenRecord> {
        self.inner
            .lock()
            .unwrap()
            .tokens
            .iter()
            .find(|t| t.identity_id == identity_id && t.provider == provider)
            .cloned()
    }

    /// Test hook: force a stored expiry (to push a token past the skew).
    pub fn set_token_expiry(&self, identity_id: Uuid, provider: &str, expires_at: DateTime<Utc>) {
        let mut state = self.inner.lock().unwrap();
        if let Some(token) = state
            .tokens
            .iter_mut()
            .find(|t| t.identity_id == identity_id && t.provider == provider)
        {
            token.expires_at = expires_at;
        }
    }

    /// Test hook: drop the stored refresh token.
    pub fn clear_refresh_token(&self, identity_id: Uuid, provider: &str) {
        let mut state = self.inner.lock().unwrap();
        if let Some(token) = state
            .tokens
            .iter_mut()
            .find(|t| t.identity_id == identity_id && t.provider == provider)
        {
            token.refresh_token = None;
        }
    }

    /// Test hook: read the stored link row.
    pub fn link_snapshot(
        &self,
        identity_id: Uuid,
        provider: &str,
    ) -> Option<ExternalIdentityRecord> {
        self.inner
            .lock()
            .unwrap()
            .links
            .iter()
            .find(|l| l.identity_id == identity_id && l.provider == provider)
            .cloned()
    }
}

#[async_trait]
impl ExternalStore for MemoryExternalStore {
    async fn find_link(
        &self,
        identity_id: Uuid,
        provider: &str,
    ) -> Result<Option<ExternalIdentityRecord>, ExternalError> {
        Ok(self.link_snapshot(identity_id, provider))
    }

    async fn find_link_by_subject(
        &self,
        provider: &str,
        subject_id: &str,
    ) -> Result<Option<ExternalIdentityRecord>, ExternalError> {
        let state = self.inner.lock().unwrap();
        Ok(state
            .links
            .iter()
            .find(|l| l.provider == provider && l.provider_subject_id == subject_id)
            .cloned())
    }

    async fn upsert_link(
        &self,
        link: NewExternalLink,
    ) -> Result<ExternalIdentityRecord, ExternalError> {
        let mut state = self.inner.lock().unwrap();

        // Mirror the (provider, subject) unique index.
        if state.links.iter().any(|l| {
            l.provider == link.provider
                && l.provider_subject_id == link.provider_subject_id
                && l.identity_id != link.identity_id
        }) {
            return Err(ExternalError::Conflict(
                "This external account is already linked to another user".into(),
            ));
        }

        if let Some(existing) = state
            .links
            .iter_mut()
            .find(|l| l.identity_id == link.identity_id && l.provider == link.provider)
        {
            existing.provider_subject_id = link.provider_subject_id;
            existing.email = link.email;
            existing.display_name = link.display_name;
            return Ok(existing.clone());
        }

        let record = ExternalIdentityRecord {
            id: uuidv7(),
            identity_id: link.identity_id,
            provider: link.provider,
            provider_subject_id: link.provider_subject_id,
            email: link.email,
            display_name: link.display_name,
            linked_at: Utc::now(),
        };
        state.links.push(record.clone());
        Ok(record)
    }

    async fn find_token(
        &self,
        identity_id: Uuid,
        provider: &str,
    ) -> Result<Option<ExternalTokenRecord>, ExternalError> {
        Ok(self.token_snapshot(identity_id, provider))
    }

    async fn upsert_token(&self, token: ExternalTokenUpsert) -> Result<(), ExternalError> {
        let mut state = self.inner.lock().unwrap();

        if let Some(existing) = state
            .tokens
            .iter_mut()
            .find(|t| t.identity_id == token.identity_id && t.provider == token.provider)
        {
            existing.access_token = token.access_token;
            if let Some(refresh) = token.refresh_token {
                existing.refresh_token = Some(refresh);
            }
            existing.expires_at = token.expires_at;
            if let Some(scopes) = token.scopes {
                existing.scopes = scopes;
            }
            existing.updated_at = Utc::now();
            return Ok(());
        }

        state.tokens.push(ExternalTokenRecord {
            id: uuidv7(),
            identity_id: token.identity_id,
            provider: token.provider,
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: token.expires_at,
            scopes: token.scopes.unwrap_or_default(),
            updated_at: Utc::now(),
        });
        Ok(())
    }

    async fn apply_refresh(
        &self,
        identity_id: Uuid,
        provider: &str,
        access_token: &str,
        expires_at: DateTime<Utc>,
        scopes: Option<String>,
        refresh_token: Option<String>,
    ) -> Result<(), ExternalError> {
        let mut state = self.inner.lock().unwrap();
        if let Some(token) = state
            .tokens
            .iter_mut()
            .find(|t| t.identity_id == identity_id && t.provider == provider)
        {
            token.access_token = access_token.to_string();
            token.expires_at = expires_at;
            if let Some(scopes) = scopes {
                token.scopes = scopes;
            }
            if let Some(refresh) = refresh_token {
                token.refresh_token = Some(refresh);
            }
            token.updated_at = Utc::now();
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scripted OAuth client
// ---------------------------------------------------------------------------

/// OAuth client double: queued grants, canned profile, call counters.
pub struct ScriptedOAuthClient {
    exchange_grants: Mutex<VecDeque<TokenGrant>>,
    refresh_grants: Mutex<VecDeque<TokenGrant>>,
    profile: Mutex<ProviderProfile>,
    exchange_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
}

impl ScriptedOAuthClient {
    pub fn new() -> Self {
        Self {
            exchange_grants: Mutex::new(VecDeque::new()),
            refresh_grants: Mutex::new(VecDeque::new()),
            profile: Mutex::new(ProviderProfile {
                subject_id: "subject-1".into(),
                email: Some("linked@example.com".into()),
                display_name: Some("Linked User".into()),
            }),
            exchange_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
        }
    }

    pub fn push_exchange_grant(&self, grant: TokenGrant) {
        self.exchange_grants.lock().unwrap().push_back(grant);
    }

    pub fn push_refresh_grant(&self, grant: TokenGrant) {
        self.refresh_grants.lock().unwrap().push_back(grant);
    }

    pub fn set_profile(&self, profile: ProviderProfile) {
        *self.profile.lock().unwrap() = profile;
    }

    pub fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedOAuthClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OAuthProviderClient for ScriptedOAuthClient {
    fn provider(&self) -> &str {
        PROVIDER_GOOGLE
    }

    fn authorization_url(&self, state: &str) -> Result<String, ExternalError> {
        Ok(format!(
            "https://accounts.google.test/authorize?state={state}"
        ))
    }

    async fn exchange_code(&self, _code: &str) -> Result<TokenGrant, ExternalError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        self.exchange_grants
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ExternalError::Provider("no scripted exchange grant".into()))
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenGrant, ExternalError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_grants
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ExternalError::Provider("no scripted refresh grant".into()))
    }

    async fn fetch_profile(&self, _access_token: &str) -> Result<ProviderProfile, ExternalError> {
        Ok(self.profile.lock().unwrap().clone())
    }
}

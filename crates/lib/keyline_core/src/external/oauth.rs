//! External OAuth provider clients.
//!
//! [`OAuthProviderClient`] is the seam the linking flows talk to; the
//! concrete [`GoogleOAuthClient`] speaks Google's OAuth2 + OpenID userinfo
//! endpoints. Failures surface immediately — retry policy belongs to the
//! caller of this crate, not here.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use super::ExternalError;

/// Provider name for Google.
pub const PROVIDER_GOOGLE: &str = "google";

/// Token response shape shared by code exchange and refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    /// Lifetime in seconds from the provider's clock.
    pub expires_in: i64,
    /// Omitted by Google on repeat consent.
    pub refresh_token: Option<String>,
    /// Space-delimited granted scopes, when the provider reports them.
    pub scope: Option<String>,
}

/// Subject snapshot from the provider's userinfo endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderProfile {
    #[serde(rename = "sub")]
    pub subject_id: String,
    pub email: Option<String>,
    #[serde(rename = "name")]
    pub display_name: Option<String>,
}

/// Client for one external OAuth provider.
#[async_trait]
pub trait OAuthProviderClient: Send + Sync {
    /// Normalized provider name (e.g. `google`).
    fn provider(&self) -> &str;

    /// Authorization URL embedding the given anti-CSRF state.
    fn authorization_url(&self, state: &str) -> Result<String, ExternalError>;

    /// Exchange an authorization code for tokens.
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, ExternalError>;

    /// Redeem a refresh token for a fresh access token.
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, ExternalError>;

    /// Fetch the profile backing an access token.
    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, ExternalError>;
}

/// Google endpoint and credential configuration.
#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
}

impl GoogleOAuthConfig {
    /// Google defaults; scopes cover sign-in plus read-only calendar access.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            scopes: vec![
                "openid".to_string(),
                "email".to_string(),
                "profile".to_string(),
                "https://www.googleapis.com/auth/calendar.readonly".to_string(),
            ],
            authorization_endpoint: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_endpoint: "https://oauth2.googleapis.com/token".to_string(),
            userinfo_endpoint: "https://openidconnect.googleapis.com/v1/userinfo".to_string(),
        }
    }
}

/// Google implementation of [`OAuthProviderClient`].
pub struct GoogleOAuthClient {
    config: GoogleOAuthConfig,
    http: reqwest::Client,
}

impl GoogleOAuthClient {
    pub fn new(config: GoogleOAuthConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    async fn token_request(
        &self,
        params: &[(&str, &str)],
        context: &str,
    ) -> Result<TokenGrant, ExternalError> {
        let resp = self
            .http
            .post(&self.config.token_endpoint)
            .form(params)
            .send()
            .await
            .map_err(|e| ExternalError::Provider(format!("{context} failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ExternalError::Provider(format!(
                "{context} HTTP {status}: {body}"
            )));
        }

        resp.json::<TokenGrant>()
            .await
            .map_err(|e| ExternalError::Provider(format!("{context} parse error: {e}")))
    }
}

#[async_trait]
impl OAuthProviderClient for GoogleOAuthClient {
    fn provider(&self) -> &str {
        PROVIDER_GOOGLE
    }

    fn authorization_url(&self, state: &str) -> Result<String, ExternalError> {
        let mut url = Url::parse(&self.config.authorization_endpoint)
            .map_err(|e| ExternalError::Configuration(format!("authorization endpoint: {e}")))?;

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", state)
            // Offline access is what makes Google hand out a refresh token.
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");

        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, ExternalError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];
        self.token_request(&params, "code exchange").await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, ExternalError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];
        self.token_request(&params, "token refresh").await
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, ExternalError> {
        let resp = self
            .http
            .get(&self.config.userinfo_endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ExternalError::Provider(format!("userinfo failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ExternalError::Provider(format!(
                "userinfo HTTP {status}: {body}"
            )));
        }

        resp.json::<ProviderProfile>()
            .await
            .map_err(|e| ExternalError::Provider(format!("userinfo parse error: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GoogleOAuthClient {
        GoogleOAuthClient::new(GoogleOAuthConfig::new(
            "client-id-1",
            "client-secret-1",
            "https://app.example.com/callback",
        ))
    }

    #[test]
    fn authorization_url_embeds_state_and_offline_access() {
        let url = client().authorization_url("state-abc").unwrap();
        let parsed = Url::parse(&url).unwrap();
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(pairs.contains(&("state".into(), "state-abc".into())));
        assert!(pairs.contains(&("access_type".into(), "offline".into())));
        assert!(pairs.contains(&("client_id".into(), "client-id-1".into())));
        let scope = pairs.iter().find(|(k, _)| k == "scope").unwrap();
        assert!(scope.1.contains("calendar.readonly"));
    }

    #[test]
    fn token_grant_parses_with_and_without_refresh_token() {
        let with: TokenGrant = serde_json::from_str(
            r#"{"access_token":"AT1","token_type":"Bearer","expires_in":3600,
                "refresh_token":"RT1","scope":"openid email"}"#,
        )
        .unwrap();
        assert_eq!(with.refresh_token.as_deref(), Some("RT1"));

        let without: TokenGrant = serde_json::from_str(
            r#"{"access_token":"AT2","token_type":"Bearer","expires_in":3599}"#,
        )
        .unwrap();
        assert!(without.refresh_token.is_none());
        assert!(without.scope.is_none());
    }
}

//! Per-configuration OIDC relying-party client.
//!
//! Built from a configuration row plus issuer discovery. Holds the decrypted
//! client secret for its lifetime; instances live inside the client cache and
//! are dropped on configuration updates.

use crate::error::{SsoError, SsoResult};
use crate::services::discovery::{validate_url_not_internal, DiscoveredEndpoints, DiscoveryService};
use crate::services::encryption::CredentialCipher;
use loopline_db::models::SsoConfiguration;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

/// Timeout for IdP round trips.
const UPSTREAM_TIMEOUT_SECS: u64 = 10;

/// Tokens returned by the code exchange.
#[derive(Debug, Clone)]
pub struct TokenSet {
    pub access_token: String,
    pub id_token: Option<String>,
    pub expires_in: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[allow(dead_code)]
    token_type: Option<String>,
}

/// OIDC client for one SSO configuration.
pub struct OidcProviderClient {
    config_id: Uuid,
    client_id: String,
    client_secret: String,
    /// Callback URL registered with the IdP.
    redirect_uri: String,
    scopes: String,
    endpoints: DiscoveredEndpoints,
    http: reqwest::Client,
}

impl std::fmt::Debug for OidcProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcProviderClient")
            .field("config_id", &self.config_id)
            .field("client_id", &self.client_id)
            .field("issuer", &self.endpoints.issuer)
            .finish_non_exhaustive()
    }
}

impl OidcProviderClient {
    /// Build a client for a configuration: run issuer discovery and decrypt
    /// the client secret. The plaintext secret lives only inside the
    /// returned client.
    #[instrument(skip(config, cipher, discovery), fields(config_id = %config.id))]
    pub async fn build(
        config: &SsoConfiguration,
        cipher: &CredentialCipher,
        discovery: &DiscoveryService,
        callback_base_url: &str,
    ) -> SsoResult<Self> {
        let issuer_url = config
            .oidc_issuer_url
            .as_deref()
            .ok_or_else(|| SsoError::InvalidConfiguration("oidc_issuer_url is required".into()))?;
        let client_id = config
            .oidc_client_id
            .clone()
            .ok_or_else(|| SsoError::InvalidConfiguration("oidc_client_id is required".into()))?;
        let secret_encrypted = config.oidc_client_secret_encrypted.as_deref().ok_or_else(|| {
            SsoError::InvalidConfiguration("oidc_client_secret is required".into())
        })?;

        let client_secret = cipher.decrypt(config.org_id, secret_encrypted)?;
        let endpoints = discovery.discover(issuer_url).await?;

        let redirect_uri = match &config.oidc_redirect_uri {
            Some(uri) if !uri.is_empty() => uri.clone(),
            _ => format!(
                "{}/sso/{}/oidc/callback",
                callback_base_url.trim_end_matches('/'),
                config.id
            ),
        };

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(UPSTREAM_TIMEOUT_SECS))
            .build()
            .map_err(|e| SsoError::Internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            config_id: config.id,
            client_id,
            client_secret,
            redirect_uri,
            scopes: config
                .oidc_scopes
                .clone()
                .unwrap_or_else(|| "openid profile email".to_string()),
            endpoints,
            http,
        })
    }

    /// The configuration this client was built from.
    #[must_use]
    pub fn config_id(&self) -> Uuid {
        self.config_id
    }

    /// The callback URL the IdP will redirect to.
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Build the authorization URL for the PKCE code flow.
    pub fn build_authorization_url(
        &self,
        state: &str,
        code_challenge: &str,
        login_hint: Option<&str>,
    ) -> SsoResult<url::Url> {
        let mut auth_url = url::Url::parse(&self.endpoints.authorization_endpoint)
            .map_err(|e| SsoError::InvalidConfiguration(e.to_string()))?;

        {
            let mut query = auth_url.query_pairs_mut();
            query.append_pair("response_type", "code");
            query.append_pair("client_id", &self.client_id);
            query.append_pair("redirect_uri", &self.redirect_uri);
            query.append_pair("state", state);
            query.append_pair("code_challenge", code_challenge);
            query.append_pair("code_challenge_method", "S256");
            query.append_pair("scope", &self.scopes);

            if let Some(email) = login_hint {
                query.append_pair("login_hint", email);
            }
        }

        Ok(auth_url)
    }

    /// Exchange an authorization code for tokens.
    #[instrument(skip(self, code, pkce_verifier))]
    pub async fn exchange_code(&self, code: &str, pkce_verifier: &str) -> SsoResult<TokenSet> {
        // Token endpoint comes from discovered metadata; re-check before the
        // outbound call.
        validate_url_not_internal(&self.endpoints.token_endpoint)
            .map_err(|e| SsoError::InvalidConfiguration(format!("SSRF protection: {e}")))?;

        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("redirect_uri", &self.redirect_uri),
            ("code_verifier", pkce_verifier),
        ];

        let response = self
            .http
            .post(&self.endpoints.token_endpoint)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!(
                config_id = %self.config_id,
                status = %status,
                error = %truncate_idp_error(&error_text),
                "Token exchange failed"
            );
            // Never pass the raw IdP response to the caller
            return Err(SsoError::UpstreamError(format!(
                "Token endpoint returned HTTP {status}"
            )));
        }

        let token_response: TokenEndpointResponse = response
            .json()
            .await
            .map_err(|e| SsoError::UpstreamError(format!("Invalid token response: {e}")))?;

        Ok(TokenSet {
            access_token: token_response.access_token,
            id_token: token_response.id_token,
            expires_in: token_response.expires_in,
        })
    }

    /// Fetch claims from the userinfo endpoint.
    #[instrument(skip(self, access_token))]
    pub async fn fetch_user_info(
        &self,
        access_token: &str,
    ) -> SsoResult<HashMap<String, serde_json::Value>> {
        let userinfo_endpoint = self.endpoints.userinfo_endpoint.as_deref().ok_or_else(|| {
            SsoError::InvalidConfiguration(
                "Identity provider does not expose a userinfo endpoint".into(),
            )
        })?;

        let response = self
            .http
            .get(userinfo_endpoint)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(
                config_id = %self.config_id,
                status = %status,
                "Userinfo request failed"
            );
            return Err(SsoError::UpstreamError(format!(
                "Userinfo endpoint returned HTTP {status}"
            )));
        }

        let claims: HashMap<String, serde_json::Value> = response
            .json()
            .await
            .map_err(|e| SsoError::UpstreamError(format!("Invalid userinfo response: {e}")))?;

        Ok(claims)
    }

    /// Build the RP-initiated logout URL, if the provider advertises one.
    pub fn build_end_session_url(
        &self,
        id_token_hint: Option<&str>,
        post_logout_redirect_uri: Option<&str>,
    ) -> Option<url::Url> {
        let endpoint = self.endpoints.end_session_endpoint.as_deref()?;
        let mut logout_url = url::Url::parse(endpoint).ok()?;

        {
            let mut query = logout_url.query_pairs_mut();
            query.append_pair("client_id", &self.client_id);
            if let Some(hint) = id_token_hint {
                query.append_pair("id_token_hint", hint);
            }
            if let Some(redirect) = post_logout_redirect_uri {
                query.append_pair("post_logout_redirect_uri", redirect);
            }
        }

        Some(logout_url)
    }
}

/// Truncate IdP error bodies for logging, on a char boundary.
fn truncate_idp_error(error_text: &str) -> String {
    if error_text.len() > 500 {
        let safe_end = error_text
            .char_indices()
            .take_while(|(i, _)| *i < 500)
            .last()
            .map_or(0, |(i, c)| i + c.len_utf8());
        format!("{}... (truncated)", &error_text[..safe_end])
    } else {
        error_text.to_string()
    }
}

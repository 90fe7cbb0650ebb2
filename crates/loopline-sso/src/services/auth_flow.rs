//! Login and logout orchestration.
//!
//! Ties the per-protocol clients, the authorization state store, attribute
//! mapping, provisioning and session issuance into the three flows the
//! handlers expose: initiate login, complete a callback, initiate logout.

use crate::error::{SsoError, SsoResult};
use crate::saml::SamlProviderClient;
use crate::services::attributes::{
    enforce_domain_allowlist, map_oidc_claims, map_saml_attributes, oidc_claims_json,
    saml_attributes_json,
};
use crate::services::client_cache::{OidcClientCache, SamlClientCache};
use crate::services::discovery::DiscoveryService;
use crate::services::encryption::CredentialCipher;
use crate::services::oidc_client::OidcProviderClient;
use crate::services::provisioning::Provisioner;
use crate::services::session::SessionManager;
use crate::state::{AuthState, AuthStateStore};
use loopline_db::models::{SsoConfiguration, SsoProviderKind, SsoSession, User};
use openidconnect::{CsrfToken, PkceCodeChallenge};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Where to send the user to authenticate.
#[derive(Debug, Clone)]
pub struct LoginRedirect {
    pub redirect_url: String,
    pub provider_kind: SsoProviderKind,
}

/// Result of a completed federated login.
#[derive(Debug, Clone)]
pub struct CompletedLogin {
    pub session: SsoSession,
    pub user: User,
    pub newly_provisioned: bool,
}

/// Result of a logout. The session is always revoked locally; the IdP
/// logout URL is best-effort.
#[derive(Debug, Clone)]
pub struct LogoutOutcome {
    pub session: SsoSession,
    pub idp_logout_url: Option<String>,
}

/// Query parameters an OIDC IdP sends to the callback.
#[derive(Debug, Clone, Default)]
pub struct OidcCallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Orchestrates federated login and logout.
#[derive(Clone)]
pub struct AuthFlow {
    pool: PgPool,
    cipher: Arc<CredentialCipher>,
    discovery: DiscoveryService,
    state_store: Arc<dyn AuthStateStore>,
    saml_cache: SamlClientCache,
    oidc_cache: OidcClientCache,
    provisioner: Provisioner,
    sessions: SessionManager,
    /// Public base URL of this deployment, used for callback endpoints.
    base_url: String,
}

impl AuthFlow {
    #[must_use]
    pub fn new(
        pool: PgPool,
        cipher: Arc<CredentialCipher>,
        state_store: Arc<dyn AuthStateStore>,
        saml_cache: SamlClientCache,
        oidc_cache: OidcClientCache,
        base_url: String,
    ) -> Self {
        Self {
            provisioner: Provisioner::new(pool.clone()),
            sessions: SessionManager::new(pool.clone()),
            pool,
            cipher,
            discovery: DiscoveryService::new(),
            state_store,
            saml_cache,
            oidc_cache,
            base_url,
        }
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Load a configuration that is allowed to serve logins.
    async fn load_enabled_config(&self, config_id: Uuid) -> SsoResult<SsoConfiguration> {
        let config = SsoConfiguration::find_by_id(&self.pool, config_id)
            .await?
            .ok_or(SsoError::ConfigurationNotFound(config_id))?;
        if !config.enabled {
            return Err(SsoError::ConfigurationDisabled(config_id));
        }
        Ok(config)
    }

    async fn saml_client(&self, config: &SsoConfiguration) -> SsoResult<Arc<SamlProviderClient>> {
        if let Some(client) = self.saml_cache.get(config.id).await {
            return Ok(client);
        }
        let client = SamlProviderClient::build(config, &self.cipher, &self.base_url)?;
        Ok(self.saml_cache.insert(config.id, client).await)
    }

    async fn oidc_client(&self, config: &SsoConfiguration) -> SsoResult<Arc<OidcProviderClient>> {
        if let Some(client) = self.oidc_cache.get(config.id).await {
            return Ok(client);
        }
        let client =
            OidcProviderClient::build(config, &self.cipher, &self.discovery, &self.base_url)
                .await?;
        Ok(self.oidc_cache.insert(config.id, client).await)
    }

    /// Start a login against the configuration's IdP. SAML redirects are
    /// stateless on our side; OIDC stores a single-use state record with the
    /// PKCE verifier.
    #[instrument(skip(self), fields(%config_id))]
    pub async fn initiate_login(
        &self,
        config_id: Uuid,
        return_to: Option<&str>,
        login_hint: Option<&str>,
    ) -> SsoResult<LoginRedirect> {
        let config = self.load_enabled_config(config_id).await?;
        let kind = config.kind().map_err(SsoError::InvalidConfiguration)?;

        let redirect_url = match kind {
            SsoProviderKind::Saml => {
                let client = self.saml_client(&config).await?;
                client.build_login_url(return_to)?
            }
            SsoProviderKind::Oidc => {
                let client = self.oidc_client(&config).await?;

                let state = CsrfToken::new_random();
                let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();

                self.state_store
                    .store(AuthState::new(
                        state.secret().clone(),
                        config.id,
                        return_to.unwrap_or("/").to_string(),
                    ))
                    .await?;
                self.state_store
                    .attach_verifier(state.secret(), verifier.secret())
                    .await?;

                client
                    .build_authorization_url(state.secret(), challenge.as_str(), login_hint)?
                    .to_string()
            }
        };

        Ok(LoginRedirect {
            redirect_url,
            provider_kind: kind,
        })
    }

    /// Complete a SAML login from a posted `SAMLResponse`.
    #[instrument(skip(self, saml_response), fields(%config_id))]
    pub async fn handle_saml_callback(
        &self,
        config_id: Uuid,
        saml_response: &str,
    ) -> SsoResult<CompletedLogin> {
        let config = self.load_enabled_config(config_id).await?;
        if config.kind().map_err(SsoError::InvalidConfiguration)? != SsoProviderKind::Saml {
            return Err(SsoError::InvalidCallback(
                "Configuration is not a SAML provider".to_string(),
            ));
        }

        let client = self.saml_client(&config).await?;
        let profile = client.validate_response(saml_response)?;

        let attrs = map_saml_attributes(
            &config.attribute_mapping,
            &profile.attributes,
            &profile.name_id,
        )?;
        enforce_domain_allowlist(&attrs.email, &config.allowed_email_domains)?;

        let provisioned = self.provisioner.resolve_user(&config, &attrs).await?;

        // NameID goes into the snapshot; single logout needs it later.
        let snapshot = serde_json::json!({
            "name_id": profile.name_id,
            "attributes": saml_attributes_json(&profile.attributes),
        });
        let session = self
            .sessions
            .create(
                &config,
                provisioned.user.id,
                profile.session_index.clone(),
                snapshot,
            )
            .await?;

        Ok(CompletedLogin {
            session,
            user: provisioned.user,
            newly_provisioned: provisioned.newly_created,
        })
    }

    /// Complete an OIDC login from the redirect callback.
    #[instrument(skip(self, params), fields(%config_id))]
    pub async fn handle_oidc_callback(
        &self,
        config_id: Uuid,
        params: OidcCallbackParams,
    ) -> SsoResult<CompletedLogin> {
        if let Some(error) = params.error {
            tracing::warn!(
                %config_id,
                error = ?error,
                description = ?params.error_description,
                "IdP returned an error on the OIDC callback"
            );
            return Err(SsoError::IdpError {
                error,
                description: params.error_description,
            });
        }

        let code = params
            .code
            .ok_or_else(|| SsoError::InvalidCallback("Missing code parameter".to_string()))?;
        let state = params
            .state
            .ok_or_else(|| SsoError::InvalidCallback("Missing state parameter".to_string()))?;

        // Single use; concurrent replays lose here.
        let auth_state = self.state_store.consume(&state).await?;
        if auth_state.sso_configuration_id != config_id {
            return Err(SsoError::InvalidOrExpiredState);
        }
        let verifier = auth_state
            .pkce_verifier
            .ok_or(SsoError::InvalidOrExpiredState)?;

        let config = self.load_enabled_config(config_id).await?;
        if config.kind().map_err(SsoError::InvalidConfiguration)? != SsoProviderKind::Oidc {
            return Err(SsoError::InvalidCallback(
                "Configuration is not an OIDC provider".to_string(),
            ));
        }
        let client = self.oidc_client(&config).await?;

        let tokens = client.exchange_code(&code, &verifier).await?;
        let claims = client.fetch_user_info(&tokens.access_token).await?;

        let attrs = map_oidc_claims(&config.attribute_mapping, &claims)?;
        enforce_domain_allowlist(&attrs.email, &config.allowed_email_domains)?;

        let provisioned = self.provisioner.resolve_user(&config, &attrs).await?;

        let session = self
            .sessions
            .create(
                &config,
                provisioned.user.id,
                tokens.id_token.clone(),
                oidc_claims_json(&claims),
            )
            .await?;

        Ok(CompletedLogin {
            session,
            user: provisioned.user,
            newly_provisioned: provisioned.newly_created,
        })
    }

    /// Log out a session. Local revocation happens first and always; the
    /// provider-side logout URL is best-effort and its absence never fails
    /// the request.
    #[instrument(skip(self), fields(%session_id))]
    pub async fn initiate_logout(&self, session_id: Uuid) -> SsoResult<LogoutOutcome> {
        let session = self.sessions.revoke(session_id).await?;

        let idp_logout_url = match self.build_idp_logout_url(&session).await {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(%session_id, error = ?e, "Could not build IdP logout URL");
                None
            }
        };

        Ok(LogoutOutcome {
            session,
            idp_logout_url,
        })
    }

    async fn build_idp_logout_url(&self, session: &SsoSession) -> SsoResult<Option<String>> {
        let Some(config) =
            SsoConfiguration::find_by_id(&self.pool, session.sso_configuration_id).await?
        else {
            return Ok(None);
        };
        if !config.enabled {
            return Ok(None);
        }

        match config.kind().map_err(SsoError::InvalidConfiguration)? {
            SsoProviderKind::Saml => {
                let Some(name_id) = session
                    .attributes
                    .get("name_id")
                    .and_then(serde_json::Value::as_str)
                else {
                    return Ok(None);
                };
                let client = self.saml_client(&config).await?;
                client.build_logout_url(name_id, session.idp_session_ref.as_deref())
            }
            SsoProviderKind::Oidc => {
                let client = self.oidc_client(&config).await?;
                Ok(client
                    .build_end_session_url(session.idp_session_ref.as_deref(), None)
                    .map(|u| u.to_string()))
            }
        }
    }

    /// Maintenance sweep: expire overdue sessions and drop stale
    /// authorization states.
    pub async fn run_maintenance(&self) -> SsoResult<()> {
        self.sessions.cleanup_expired().await?;
        self.state_store.cleanup_expired().await?;
        Ok(())
    }
}

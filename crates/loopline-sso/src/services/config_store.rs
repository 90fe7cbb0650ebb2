//! Admin-facing SSO configuration management.
//!
//! Validates provider field groups, envelope-encrypts inbound secrets before
//! they reach the database, and invalidates cached provider clients on every
//! mutation. Plaintext secrets exist only transiently inside this module and
//! the provider-client builders.

use crate::error::{SsoError, SsoResult};
use crate::saml::signature::parse_certificate;
use crate::services::client_cache::{OidcClientCache, SamlClientCache};
use crate::services::discovery::validate_url_not_internal;
use crate::services::encryption::CredentialCipher;
use loopline_db::models::{
    CreateSsoConfiguration, SsoConfiguration, SsoProviderKind, UpdateSsoConfiguration,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Admin input for creating a configuration. Secrets arrive in plaintext and
/// are encrypted before storage.
#[derive(Debug, Clone)]
pub struct NewSsoConfiguration {
    pub provider_kind: SsoProviderKind,
    pub saml_idp_sso_url: Option<String>,
    pub saml_idp_slo_url: Option<String>,
    pub saml_idp_metadata_url: Option<String>,
    pub saml_idp_certificate: Option<String>,
    pub saml_sp_certificate: Option<String>,
    pub saml_sp_private_key: Option<String>,
    pub oidc_issuer_url: Option<String>,
    pub oidc_client_id: Option<String>,
    pub oidc_client_secret: Option<String>,
    pub oidc_redirect_uri: Option<String>,
    pub oidc_scopes: Option<String>,
    pub attribute_mapping: serde_json::Value,
    pub auto_provision: bool,
    pub default_role: String,
    pub allowed_email_domains: Vec<String>,
}

/// Admin input for updating a configuration. Absent fields are unchanged;
/// `provider_kind`, when present, must match the stored value.
#[derive(Debug, Clone, Default)]
pub struct SsoConfigurationPatch {
    pub provider_kind: Option<SsoProviderKind>,
    pub saml_idp_sso_url: Option<String>,
    pub saml_idp_slo_url: Option<String>,
    pub saml_idp_metadata_url: Option<String>,
    pub saml_idp_certificate: Option<String>,
    pub saml_sp_certificate: Option<String>,
    pub saml_sp_private_key: Option<String>,
    pub oidc_issuer_url: Option<String>,
    pub oidc_client_id: Option<String>,
    pub oidc_client_secret: Option<String>,
    pub oidc_redirect_uri: Option<String>,
    pub oidc_scopes: Option<String>,
    pub attribute_mapping: Option<serde_json::Value>,
    pub auto_provision: Option<bool>,
    pub default_role: Option<String>,
    pub allowed_email_domains: Option<Vec<String>>,
}

/// Configuration CRUD with envelope encryption and cache invalidation.
#[derive(Clone)]
pub struct ConfigStore {
    pool: PgPool,
    cipher: Arc<CredentialCipher>,
    saml_cache: SamlClientCache,
    oidc_cache: OidcClientCache,
}

impl ConfigStore {
    #[must_use]
    pub fn new(
        pool: PgPool,
        cipher: Arc<CredentialCipher>,
        saml_cache: SamlClientCache,
        oidc_cache: OidcClientCache,
    ) -> Self {
        Self {
            pool,
            cipher,
            saml_cache,
            oidc_cache,
        }
    }

    /// Create a configuration for an organization.
    #[instrument(skip(self, input), fields(%org_id, provider_kind = %input.provider_kind))]
    pub async fn create(
        &self,
        org_id: Uuid,
        input: NewSsoConfiguration,
    ) -> SsoResult<SsoConfiguration> {
        validate_provider_fields(input.provider_kind, &input)?;

        if input.default_role.is_empty() {
            return Err(SsoError::InvalidConfiguration(
                "default_role must not be empty".into(),
            ));
        }

        let saml_sp_private_key_encrypted = input
            .saml_sp_private_key
            .as_deref()
            .map(|key| self.cipher.encrypt(org_id, key))
            .transpose()?;
        let oidc_client_secret_encrypted = input
            .oidc_client_secret
            .as_deref()
            .map(|secret| self.cipher.encrypt(org_id, secret))
            .transpose()?;

        let config = SsoConfiguration::create(
            &self.pool,
            CreateSsoConfiguration {
                org_id,
                provider_kind: input.provider_kind,
                saml_idp_sso_url: input.saml_idp_sso_url,
                saml_idp_slo_url: input.saml_idp_slo_url,
                saml_idp_metadata_url: input.saml_idp_metadata_url,
                saml_idp_certificate: input.saml_idp_certificate,
                saml_sp_certificate: input.saml_sp_certificate,
                saml_sp_private_key_encrypted,
                oidc_issuer_url: input.oidc_issuer_url,
                oidc_client_id: input.oidc_client_id,
                oidc_client_secret_encrypted,
                oidc_redirect_uri: input.oidc_redirect_uri,
                oidc_scopes: input.oidc_scopes,
                attribute_mapping: input.attribute_mapping,
                auto_provision: input.auto_provision,
                default_role: input.default_role,
                allowed_email_domains: input.allowed_email_domains,
            },
        )
        .await?;

        tracing::info!(config_id = %config.id, "Created SSO configuration");
        Ok(config)
    }

    /// Update a configuration. The provider kind is immutable.
    #[instrument(skip(self, patch), fields(%org_id, %config_id))]
    pub async fn update(
        &self,
        org_id: Uuid,
        config_id: Uuid,
        patch: SsoConfigurationPatch,
    ) -> SsoResult<SsoConfiguration> {
        let existing = self.get(org_id, config_id).await?;
        let kind = existing
            .kind()
            .map_err(SsoError::InvalidConfiguration)?;

        if let Some(requested) = patch.provider_kind {
            if requested != kind {
                return Err(SsoError::ImmutableField("provider_kind"));
            }
        }

        if let Some(cert) = patch.saml_idp_certificate.as_deref() {
            parse_certificate(cert)?;
        }
        if let Some(key) = patch.saml_sp_private_key.as_deref() {
            validate_sp_private_key(key)?;
        }
        if let Some(url) = patch.saml_idp_sso_url.as_deref() {
            validate_idp_url(url)?;
        }
        if let Some(url) = patch.oidc_issuer_url.as_deref() {
            validate_idp_url(url)?;
        }
        if let Some(role) = patch.default_role.as_deref() {
            if role.is_empty() {
                return Err(SsoError::InvalidConfiguration(
                    "default_role must not be empty".into(),
                ));
            }
        }

        let saml_sp_private_key_encrypted = patch
            .saml_sp_private_key
            .as_deref()
            .map(|key| self.cipher.encrypt(org_id, key))
            .transpose()?;
        let oidc_client_secret_encrypted = patch
            .oidc_client_secret
            .as_deref()
            .map(|secret| self.cipher.encrypt(org_id, secret))
            .transpose()?;

        let updated = SsoConfiguration::update(
            &self.pool,
            config_id,
            UpdateSsoConfiguration {
                saml_idp_sso_url: patch.saml_idp_sso_url,
                saml_idp_slo_url: patch.saml_idp_slo_url,
                saml_idp_metadata_url: patch.saml_idp_metadata_url,
                saml_idp_certificate: patch.saml_idp_certificate,
                saml_sp_certificate: patch.saml_sp_certificate,
                saml_sp_private_key_encrypted,
                oidc_issuer_url: patch.oidc_issuer_url,
                oidc_client_id: patch.oidc_client_id,
                oidc_client_secret_encrypted,
                oidc_redirect_uri: patch.oidc_redirect_uri,
                oidc_scopes: patch.oidc_scopes,
                attribute_mapping: patch.attribute_mapping,
                auto_provision: patch.auto_provision,
                default_role: patch.default_role,
                allowed_email_domains: patch.allowed_email_domains,
            },
        )
        .await?;

        // Built clients hold the old credentials and endpoints.
        self.saml_cache.invalidate(config_id).await;
        self.oidc_cache.invalidate(config_id).await;

        tracing::info!(%config_id, "Updated SSO configuration");
        Ok(updated)
    }

    /// Fetch a configuration scoped to an organization.
    pub async fn get(&self, org_id: Uuid, config_id: Uuid) -> SsoResult<SsoConfiguration> {
        SsoConfiguration::find_by_id_in_org(&self.pool, config_id, org_id)
            .await?
            .ok_or(SsoError::ConfigurationNotFound(config_id))
    }

    /// List an organization's configurations.
    pub async fn list_for_organization(&self, org_id: Uuid) -> SsoResult<Vec<SsoConfiguration>> {
        Ok(SsoConfiguration::list_by_org(&self.pool, org_id).await?)
    }

    /// Enable or disable a configuration. Disabling takes effect for new
    /// logins immediately; existing sessions are untouched.
    #[instrument(skip(self), fields(%org_id, %config_id, enabled))]
    pub async fn set_enabled(
        &self,
        org_id: Uuid,
        config_id: Uuid,
        enabled: bool,
    ) -> SsoResult<SsoConfiguration> {
        // Scope check before the unscoped UPDATE.
        self.get(org_id, config_id).await?;

        let updated = SsoConfiguration::set_enabled(&self.pool, config_id, enabled).await?;

        self.saml_cache.invalidate(config_id).await;
        self.oidc_cache.invalidate(config_id).await;

        tracing::info!(%config_id, enabled, "Toggled SSO configuration");
        Ok(updated)
    }
}

fn validate_idp_url(url: &str) -> SsoResult<()> {
    validate_url_not_internal(url)
        .map_err(|e| SsoError::InvalidConfiguration(format!("Invalid IdP URL: {e}")))
}

/// Reject a malformed SP signing key at write time instead of at the first
/// login that tries to build a client from it.
fn validate_sp_private_key(pem: &str) -> SsoResult<()> {
    openssl::pkey::PKey::private_key_from_pem(pem.as_bytes())
        .map(|_| ())
        .map_err(|e| SsoError::InvalidConfiguration(format!("Invalid SP private key: {e}")))
}

/// Check that the field group for the chosen protocol is complete and sane.
fn validate_provider_fields(
    kind: SsoProviderKind,
    input: &NewSsoConfiguration,
) -> SsoResult<()> {
    match kind {
        SsoProviderKind::Saml => {
            let sso_url = input.saml_idp_sso_url.as_deref().ok_or_else(|| {
                SsoError::InvalidConfiguration("saml_idp_sso_url is required".into())
            })?;
            validate_idp_url(sso_url)?;
            if let Some(slo_url) = input.saml_idp_slo_url.as_deref() {
                validate_idp_url(slo_url)?;
            }
            let cert = input.saml_idp_certificate.as_deref().ok_or_else(|| {
                SsoError::InvalidConfiguration("saml_idp_certificate is required".into())
            })?;
            parse_certificate(cert)?;
            if let Some(key) = input.saml_sp_private_key.as_deref() {
                validate_sp_private_key(key)?;
            }
        }
        SsoProviderKind::Oidc => {
            let issuer = input.oidc_issuer_url.as_deref().ok_or_else(|| {
                SsoError::InvalidConfiguration("oidc_issuer_url is required".into())
            })?;
            validate_idp_url(issuer)?;
            if input.oidc_client_id.as_deref().unwrap_or("").is_empty() {
                return Err(SsoError::InvalidConfiguration(
                    "oidc_client_id is required".into(),
                ));
            }
            if input.oidc_client_secret.as_deref().unwrap_or("").is_empty() {
                return Err(SsoError::InvalidConfiguration(
                    "oidc_client_secret is required".into(),
                ));
            }
        }
    }
    Ok(())
}

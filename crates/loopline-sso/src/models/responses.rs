//! Response models for the SSO API.
//!
//! Configuration responses never carry secret material; the response exposes
//! only whether a secret is stored.

use crate::services::auth_flow::{CompletedLogin, LoginRedirect, LogoutOutcome};
use chrono::{DateTime, Utc};
use loopline_db::models::{SsoConfiguration, SsoSession};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// An SSO configuration as returned to admins.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SsoConfigurationResponse {
    pub id: Uuid,
    pub org_id: Uuid,
    pub provider_kind: String,
    pub enabled: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub saml_idp_sso_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saml_idp_slo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saml_idp_metadata_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saml_idp_certificate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saml_sp_certificate: Option<String>,
    /// Whether an SP signing key is stored. The key itself is never
    /// returned.
    pub has_sp_private_key: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub oidc_issuer_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oidc_client_id: Option<String>,
    /// Whether a client secret is stored. The secret itself is never
    /// returned.
    pub has_client_secret: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oidc_redirect_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oidc_scopes: Option<String>,

    #[schema(value_type = Object)]
    pub attribute_mapping: serde_json::Value,
    pub auto_provision: bool,
    pub default_role: String,
    pub allowed_email_domains: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SsoConfiguration> for SsoConfigurationResponse {
    fn from(config: SsoConfiguration) -> Self {
        Self {
            id: config.id,
            org_id: config.org_id,
            provider_kind: config.provider_kind,
            enabled: config.enabled,
            saml_idp_sso_url: config.saml_idp_sso_url,
            saml_idp_slo_url: config.saml_idp_slo_url,
            saml_idp_metadata_url: config.saml_idp_metadata_url,
            saml_idp_certificate: config.saml_idp_certificate,
            saml_sp_certificate: config.saml_sp_certificate,
            has_sp_private_key: config.saml_sp_private_key_encrypted.is_some(),
            oidc_issuer_url: config.oidc_issuer_url,
            oidc_client_id: config.oidc_client_id,
            has_client_secret: config.oidc_client_secret_encrypted.is_some(),
            oidc_redirect_uri: config.oidc_redirect_uri,
            oidc_scopes: config.oidc_scopes,
            attribute_mapping: config.attribute_mapping,
            auto_provision: config.auto_provision,
            default_role: config.default_role,
            allowed_email_domains: config.allowed_email_domains,
            created_at: config.created_at,
            updated_at: config.updated_at,
        }
    }
}

/// Where the browser should go to authenticate.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoginRedirectResponse {
    pub redirect_url: String,
    pub provider_kind: String,
}

impl From<LoginRedirect> for LoginRedirectResponse {
    fn from(redirect: LoginRedirect) -> Self {
        Self {
            redirect_url: redirect.redirect_url,
            provider_kind: redirect.provider_kind.to_string(),
        }
    }
}

/// A completed federated login.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoginCompletedResponse {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub newly_provisioned: bool,
}

impl From<CompletedLogin> for LoginCompletedResponse {
    fn from(login: CompletedLogin) -> Self {
        Self {
            session_id: login.session.id,
            user_id: login.user.id,
            email: login.user.email,
            display_name: login.user.display_name,
            expires_at: login.session.expires_at,
            newly_provisioned: login.newly_provisioned,
        }
    }
}

/// Result of a logout request.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LogoutResponse {
    pub session_id: Uuid,
    pub status: String,
    /// Provider-side logout URL to visit, when the IdP supports single
    /// logout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idp_logout_url: Option<String>,
}

impl From<LogoutOutcome> for LogoutResponse {
    fn from(outcome: LogoutOutcome) -> Self {
        Self {
            session_id: outcome.session.id,
            status: outcome.session.status,
            idp_logout_url: outcome.idp_logout_url,
        }
    }
}

/// An SSO session as returned to callers.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SsoSessionResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub sso_configuration_id: Uuid,
    pub status: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<SsoSession> for SsoSessionResponse {
    fn from(session: SsoSession) -> Self {
        Self {
            id: session.id,
            user_id: session.user_id,
            org_id: session.org_id,
            sso_configuration_id: session.sso_configuration_id,
            status: session.status,
            expires_at: session.expires_at,
            created_at: session.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_response_hides_secrets() {
        let mut config = SsoConfiguration::default_oidc_for_test();
        config.oidc_client_secret_encrypted = Some(b"ciphertext".to_vec());

        let response = SsoConfigurationResponse::from(config);
        assert!(response.has_client_secret);

        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("ciphertext"));
        assert!(!json.contains("secret_encrypted"));
    }

    #[test]
    fn test_configuration_response_sp_key_flag() {
        let mut config = SsoConfiguration::default_saml_for_test();
        config.saml_sp_private_key_encrypted = None;
        let response = SsoConfigurationResponse::from(config);
        assert!(!response.has_sp_private_key);
    }
}

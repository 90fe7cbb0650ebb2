//! Request models for the SSO API.

use crate::services::auth_flow::OidcCallbackParams;
use crate::services::config_store::{NewSsoConfiguration, SsoConfigurationPatch};
use loopline_db::models::SsoProviderKind;
use serde::Deserialize;
use utoipa::ToSchema;

fn default_role() -> String {
    "member".to_string()
}

fn default_true() -> bool {
    true
}

/// Admin request to create an SSO configuration. Exactly one protocol field
/// group should be filled, matching `provider_kind`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateSsoConfigurationRequest {
    /// `saml` or `oidc`. Immutable after creation.
    #[schema(value_type = String)]
    pub provider_kind: SsoProviderKind,

    pub saml_idp_sso_url: Option<String>,
    pub saml_idp_slo_url: Option<String>,
    pub saml_idp_metadata_url: Option<String>,
    pub saml_idp_certificate: Option<String>,
    pub saml_sp_certificate: Option<String>,
    /// PEM private key; encrypted at rest, never returned.
    pub saml_sp_private_key: Option<String>,

    pub oidc_issuer_url: Option<String>,
    pub oidc_client_id: Option<String>,
    /// Client secret; encrypted at rest, never returned.
    pub oidc_client_secret: Option<String>,
    pub oidc_redirect_uri: Option<String>,
    pub oidc_scopes: Option<String>,

    #[serde(default)]
    #[schema(value_type = Object)]
    pub attribute_mapping: serde_json::Value,
    #[serde(default = "default_true")]
    pub auto_provision: bool,
    #[serde(default = "default_role")]
    pub default_role: String,
    #[serde(default)]
    pub allowed_email_domains: Vec<String>,
}

impl From<CreateSsoConfigurationRequest> for NewSsoConfiguration {
    fn from(req: CreateSsoConfigurationRequest) -> Self {
        let attribute_mapping = if req.attribute_mapping.is_null() {
            serde_json::json!({})
        } else {
            req.attribute_mapping
        };
        Self {
            provider_kind: req.provider_kind,
            saml_idp_sso_url: req.saml_idp_sso_url,
            saml_idp_slo_url: req.saml_idp_slo_url,
            saml_idp_metadata_url: req.saml_idp_metadata_url,
            saml_idp_certificate: req.saml_idp_certificate,
            saml_sp_certificate: req.saml_sp_certificate,
            saml_sp_private_key: req.saml_sp_private_key,
            oidc_issuer_url: req.oidc_issuer_url,
            oidc_client_id: req.oidc_client_id,
            oidc_client_secret: req.oidc_client_secret,
            oidc_redirect_uri: req.oidc_redirect_uri,
            oidc_scopes: req.oidc_scopes,
            attribute_mapping,
            auto_provision: req.auto_provision,
            default_role: req.default_role,
            allowed_email_domains: req.allowed_email_domains,
        }
    }
}

/// Admin request to update an SSO configuration. Absent fields are left
/// unchanged; `provider_kind`, when present, must match the stored value.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateSsoConfigurationRequest {
    /// Accepted only when it matches the stored value.
    #[schema(value_type = Option<String>)]
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

    #[schema(value_type = Option<Object>)]
    pub attribute_mapping: Option<serde_json::Value>,
    pub auto_provision: Option<bool>,
    pub default_role: Option<String>,
    pub allowed_email_domains: Option<Vec<String>>,
}

impl From<UpdateSsoConfigurationRequest> for SsoConfigurationPatch {
    fn from(req: UpdateSsoConfigurationRequest) -> Self {
        Self {
            provider_kind: req.provider_kind,
            saml_idp_sso_url: req.saml_idp_sso_url,
            saml_idp_slo_url: req.saml_idp_slo_url,
            saml_idp_metadata_url: req.saml_idp_metadata_url,
            saml_idp_certificate: req.saml_idp_certificate,
            saml_sp_certificate: req.saml_sp_certificate,
            saml_sp_private_key: req.saml_sp_private_key,
            oidc_issuer_url: req.oidc_issuer_url,
            oidc_client_id: req.oidc_client_id,
            oidc_client_secret: req.oidc_client_secret,
            oidc_redirect_uri: req.oidc_redirect_uri,
            oidc_scopes: req.oidc_scopes,
            attribute_mapping: req.attribute_mapping,
            auto_provision: req.auto_provision,
            default_role: req.default_role,
            allowed_email_domains: req.allowed_email_domains,
        }
    }
}

/// Toggle request body.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ToggleSsoConfigurationRequest {
    pub enabled: bool,
}

/// Query parameters for login initiation.
#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
pub struct LoginQuery {
    /// Where to send the user after login completes.
    pub return_to: Option<String>,
    /// Email hint forwarded to the IdP (OIDC `login_hint`).
    pub login_hint: Option<String>,
}

/// Form body the IdP posts to the SAML assertion consumer endpoint.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SamlCallbackForm {
    #[serde(rename = "SAMLResponse")]
    pub saml_response: String,
    #[serde(rename = "RelayState")]
    pub relay_state: Option<String>,
}

/// Query parameters the IdP sends to the OIDC callback.
#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
pub struct OidcCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl From<OidcCallbackQuery> for OidcCallbackParams {
    fn from(query: OidcCallbackQuery) -> Self {
        Self {
            code: query.code,
            state: query.state,
            error: query.error,
            error_description: query.error_description,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_defaults() {
        let req: CreateSsoConfigurationRequest = serde_json::from_value(serde_json::json!({
            "provider_kind": "oidc",
            "oidc_issuer_url": "https://idp.example.com",
            "oidc_client_id": "client",
            "oidc_client_secret": "secret"
        }))
        .unwrap();

        assert_eq!(req.provider_kind, SsoProviderKind::Oidc);
        assert!(req.auto_provision);
        assert_eq!(req.default_role, "member");
        assert!(req.allowed_email_domains.is_empty());

        let input: NewSsoConfiguration = req.into();
        assert_eq!(input.attribute_mapping, serde_json::json!({}));
    }

    #[test]
    fn test_saml_callback_form_field_names() {
        let form: SamlCallbackForm = serde_json::from_value(serde_json::json!({
            "SAMLResponse": "PHNhbWxwOlJlc3BvbnNlLz4=",
            "RelayState": "/home"
        }))
        .unwrap();
        assert_eq!(form.saml_response, "PHNhbWxwOlJlc3BvbnNlLz4=");
        assert_eq!(form.relay_state.as_deref(), Some("/home"));
    }
}

//! SSO configuration model.
//!
//! One row per organization-level identity provider setup. Secret columns
//! (`saml_sp_private_key_encrypted`, `oidc_client_secret_encrypted`) hold
//! AES-256-GCM ciphertext produced by the credential cipher; plaintext never
//! reaches this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Which federation protocol a configuration speaks.
///
/// Immutable after creation; switching protocols means creating a new
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SsoProviderKind {
    Saml,
    Oidc,
}

impl std::fmt::Display for SsoProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SsoProviderKind::Saml => write!(f, "saml"),
            SsoProviderKind::Oidc => write!(f, "oidc"),
        }
    }
}

impl std::str::FromStr for SsoProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "saml" => Ok(SsoProviderKind::Saml),
            "oidc" => Ok(SsoProviderKind::Oidc),
            _ => Err(format!("Unknown provider kind: {s}")),
        }
    }
}

/// SSO configuration entity.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SsoConfiguration {
    pub id: Uuid,
    pub org_id: Uuid,
    pub provider_kind: String,
    pub enabled: bool,

    // SAML field group (populated when provider_kind = 'saml')
    pub saml_idp_sso_url: Option<String>,
    pub saml_idp_slo_url: Option<String>,
    pub saml_idp_metadata_url: Option<String>,
    pub saml_idp_certificate: Option<String>,
    pub saml_sp_certificate: Option<String>,
    pub saml_sp_private_key_encrypted: Option<Vec<u8>>,

    // OIDC field group (populated when provider_kind = 'oidc')
    pub oidc_issuer_url: Option<String>,
    pub oidc_client_id: Option<String>,
    pub oidc_client_secret_encrypted: Option<Vec<u8>>,
    pub oidc_redirect_uri: Option<String>,
    /// Space-separated scope list, e.g. `"openid profile email"`.
    pub oidc_scopes: Option<String>,

    /// Internal field name -> external attribute/claim name.
    pub attribute_mapping: serde_json::Value,
    pub auto_provision: bool,
    pub default_role: String,
    /// Empty list means any email domain is accepted.
    pub allowed_email_domains: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new SSO configuration.
#[derive(Debug, Clone)]
pub struct CreateSsoConfiguration {
    pub org_id: Uuid,
    pub provider_kind: SsoProviderKind,
    pub saml_idp_sso_url: Option<String>,
    pub saml_idp_slo_url: Option<String>,
    pub saml_idp_metadata_url: Option<String>,
    pub saml_idp_certificate: Option<String>,
    pub saml_sp_certificate: Option<String>,
    pub saml_sp_private_key_encrypted: Option<Vec<u8>>,
    pub oidc_issuer_url: Option<String>,
    pub oidc_client_id: Option<String>,
    pub oidc_client_secret_encrypted: Option<Vec<u8>>,
    pub oidc_redirect_uri: Option<String>,
    pub oidc_scopes: Option<String>,
    pub attribute_mapping: serde_json::Value,
    pub auto_provision: bool,
    pub default_role: String,
    pub allowed_email_domains: Vec<String>,
}

/// Input for updating an SSO configuration. `provider_kind` is deliberately
/// absent.
#[derive(Debug, Clone, Default)]
pub struct UpdateSsoConfiguration {
    pub saml_idp_sso_url: Option<String>,
    pub saml_idp_slo_url: Option<String>,
    pub saml_idp_metadata_url: Option<String>,
    pub saml_idp_certificate: Option<String>,
    pub saml_sp_certificate: Option<String>,
    pub saml_sp_private_key_encrypted: Option<Vec<u8>>,
    pub oidc_issuer_url: Option<String>,
    pub oidc_client_id: Option<String>,
    pub oidc_client_secret_encrypted: Option<Vec<u8>>,
    pub oidc_redirect_uri: Option<String>,
    pub oidc_scopes: Option<String>,
    pub attribute_mapping: Option<serde_json::Value>,
    pub auto_provision: Option<bool>,
    pub default_role: Option<String>,
    pub allowed_email_domains: Option<Vec<String>>,
}

impl SsoConfiguration {
    /// Create a new SSO configuration.
    pub async fn create(
        pool: &sqlx::PgPool,
        input: CreateSsoConfiguration,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO sso_configurations (
                org_id, provider_kind,
                saml_idp_sso_url, saml_idp_slo_url, saml_idp_metadata_url,
                saml_idp_certificate, saml_sp_certificate, saml_sp_private_key_encrypted,
                oidc_issuer_url, oidc_client_id, oidc_client_secret_encrypted,
                oidc_redirect_uri, oidc_scopes,
                attribute_mapping, auto_provision, default_role, allowed_email_domains
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING *
            ",
        )
        .bind(input.org_id)
        .bind(input.provider_kind.to_string())
        .bind(&input.saml_idp_sso_url)
        .bind(&input.saml_idp_slo_url)
        .bind(&input.saml_idp_metadata_url)
        .bind(&input.saml_idp_certificate)
        .bind(&input.saml_sp_certificate)
        .bind(&input.saml_sp_private_key_encrypted)
        .bind(&input.oidc_issuer_url)
        .bind(&input.oidc_client_id)
        .bind(&input.oidc_client_secret_encrypted)
        .bind(&input.oidc_redirect_uri)
        .bind(&input.oidc_scopes)
        .bind(&input.attribute_mapping)
        .bind(input.auto_provision)
        .bind(&input.default_role)
        .bind(&input.allowed_email_domains)
        .fetch_one(pool)
        .await
    }

    /// Find a configuration by ID.
    pub async fn find_by_id(pool: &sqlx::PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM sso_configurations WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a configuration by ID within an organization.
    pub async fn find_by_id_in_org(
        pool: &sqlx::PgPool,
        id: Uuid,
        org_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM sso_configurations WHERE id = $1 AND org_id = $2")
            .bind(id)
            .bind(org_id)
            .fetch_optional(pool)
            .await
    }

    /// List all configurations for an organization.
    pub async fn list_by_org(
        pool: &sqlx::PgPool,
        org_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM sso_configurations
            WHERE org_id = $1
            ORDER BY created_at DESC
            ",
        )
        .bind(org_id)
        .fetch_all(pool)
        .await
    }

    /// Update a configuration. Absent fields keep their current values.
    pub async fn update(
        pool: &sqlx::PgPool,
        id: Uuid,
        input: UpdateSsoConfiguration,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            UPDATE sso_configurations
            SET
                saml_idp_sso_url = COALESCE($2, saml_idp_sso_url),
                saml_idp_slo_url = COALESCE($3, saml_idp_slo_url),
                saml_idp_metadata_url = COALESCE($4, saml_idp_metadata_url),
                saml_idp_certificate = COALESCE($5, saml_idp_certificate),
                saml_sp_certificate = COALESCE($6, saml_sp_certificate),
                saml_sp_private_key_encrypted = COALESCE($7, saml_sp_private_key_encrypted),
                oidc_issuer_url = COALESCE($8, oidc_issuer_url),
                oidc_client_id = COALESCE($9, oidc_client_id),
                oidc_client_secret_encrypted = COALESCE($10, oidc_client_secret_encrypted),
                oidc_redirect_uri = COALESCE($11, oidc_redirect_uri),
                oidc_scopes = COALESCE($12, oidc_scopes),
                attribute_mapping = COALESCE($13, attribute_mapping),
                auto_provision = COALESCE($14, auto_provision),
                default_role = COALESCE($15, default_role),
                allowed_email_domains = COALESCE($16, allowed_email_domains),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(id)
        .bind(&input.saml_idp_sso_url)
        .bind(&input.saml_idp_slo_url)
        .bind(&input.saml_idp_metadata_url)
        .bind(&input.saml_idp_certificate)
        .bind(&input.saml_sp_certificate)
        .bind(&input.saml_sp_private_key_encrypted)
        .bind(&input.oidc_issuer_url)
        .bind(&input.oidc_client_id)
        .bind(&input.oidc_client_secret_encrypted)
        .bind(&input.oidc_redirect_uri)
        .bind(&input.oidc_scopes)
        .bind(&input.attribute_mapping)
        .bind(input.auto_provision)
        .bind(&input.default_role)
        .bind(&input.allowed_email_domains)
        .fetch_one(pool)
        .await
    }

    /// Toggle enabled status. Configurations are never hard-deleted.
    pub async fn set_enabled(
        pool: &sqlx::PgPool,
        id: Uuid,
        enabled: bool,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            UPDATE sso_configurations
            SET enabled = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(id)
        .bind(enabled)
        .fetch_one(pool)
        .await
    }

    /// Get provider kind enum.
    pub fn kind(&self) -> Result<SsoProviderKind, String> {
        self.provider_kind.parse()
    }

    /// Create a default OIDC instance for testing.
    /// Available in all builds for downstream crate tests.
    #[must_use]
    pub fn default_oidc_for_test() -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            provider_kind: "oidc".to_string(),
            enabled: true,
            saml_idp_sso_url: None,
            saml_idp_slo_url: None,
            saml_idp_metadata_url: None,
            saml_idp_certificate: None,
            saml_sp_certificate: None,
            saml_sp_private_key_encrypted: None,
            oidc_issuer_url: Some("https://idp.example.com".to_string()),
            oidc_client_id: Some("test-client".to_string()),
            oidc_client_secret_encrypted: Some(vec![]),
            oidc_redirect_uri: Some("https://app.example.com/sso/callback".to_string()),
            oidc_scopes: Some("openid profile email".to_string()),
            attribute_mapping: serde_json::json!({}),
            auto_provision: true,
            default_role: "member".to_string(),
            allowed_email_domains: vec![],
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    /// Create a default SAML instance for testing.
    #[must_use]
    pub fn default_saml_for_test() -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            provider_kind: "saml".to_string(),
            enabled: true,
            saml_idp_sso_url: Some("https://idp.example.com/sso".to_string()),
            saml_idp_slo_url: None,
            saml_idp_metadata_url: None,
            saml_idp_certificate: Some(String::new()),
            saml_sp_certificate: Some(String::new()),
            saml_sp_private_key_encrypted: Some(vec![]),
            oidc_issuer_url: None,
            oidc_client_id: None,
            oidc_client_secret_encrypted: None,
            oidc_redirect_uri: None,
            oidc_scopes: None,
            attribute_mapping: serde_json::json!({}),
            auto_provision: true,
            default_role: "member".to_string(),
            allowed_email_domains: vec![],
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_roundtrip() {
        assert_eq!(SsoProviderKind::Saml.to_string(), "saml");
        assert_eq!(SsoProviderKind::Oidc.to_string(), "oidc");
        assert_eq!("saml".parse::<SsoProviderKind>(), Ok(SsoProviderKind::Saml));
        assert_eq!("oidc".parse::<SsoProviderKind>(), Ok(SsoProviderKind::Oidc));
        assert!("ldap".parse::<SsoProviderKind>().is_err());
    }

    #[test]
    fn test_kind_accessor() {
        let config = SsoConfiguration::default_saml_for_test();
        assert_eq!(config.kind(), Ok(SsoProviderKind::Saml));
    }
}

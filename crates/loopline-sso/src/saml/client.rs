//! Per-configuration SAML service-provider client.
//!
//! Builds HTTP-Redirect binding requests (AuthnRequest, LogoutRequest) and
//! validates IdP responses: signature, status, conditions. Holds the
//! decrypted SP signing key for its lifetime; instances live inside the
//! client cache and are dropped on configuration updates.

use crate::error::{SsoError, SsoResult};
use crate::saml::response::{parse_response, STATUS_SUCCESS};
use crate::saml::signature::{self, verify_enveloped_signature, RSA_SHA256};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{Duration, Utc};
use flate2::write::DeflateEncoder;
use flate2::Compression;
use loopline_db::models::SsoConfiguration;
use openssl::pkey::{PKey, Private};
use std::collections::HashMap;
use std::io::Write;
use tracing::instrument;
use uuid::Uuid;

/// Tolerance applied to assertion `NotBefore`/`NotOnOrAfter` checks.
const CLOCK_SKEW_SECS: i64 = 60;

/// Identity extracted from a validated SAML response.
#[derive(Debug, Clone)]
pub struct SamlProfile {
    pub name_id: String,
    pub session_index: Option<String>,
    /// Attribute name -> values, as asserted by the IdP.
    pub attributes: HashMap<String, Vec<String>>,
}

/// SAML client for one SSO configuration.
pub struct SamlProviderClient {
    config_id: Uuid,
    /// SP entity ID, also enforced as the assertion audience.
    entity_id: String,
    acs_url: String,
    idp_sso_url: String,
    idp_slo_url: Option<String>,
    idp_certificate: String,
    /// Decrypted SP signing key; requests go out unsigned when absent.
    sp_signing_key: Option<PKey<Private>>,
}

impl std::fmt::Debug for SamlProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamlProviderClient")
            .field("config_id", &self.config_id)
            .field("entity_id", &self.entity_id)
            .field("idp_sso_url", &self.idp_sso_url)
            .finish_non_exhaustive()
    }
}

impl SamlProviderClient {
    /// Build a client for a configuration. Decrypts the SP private key when
    /// one is stored; the plaintext key lives only inside the returned
    /// client.
    #[instrument(skip(config, cipher), fields(config_id = %config.id))]
    pub fn build(
        config: &SsoConfiguration,
        cipher: &crate::services::encryption::CredentialCipher,
        callback_base_url: &str,
    ) -> SsoResult<Self> {
        let idp_sso_url = config
            .saml_idp_sso_url
            .clone()
            .ok_or_else(|| SsoError::InvalidConfiguration("saml_idp_sso_url is required".into()))?;
        let idp_certificate = config.saml_idp_certificate.clone().ok_or_else(|| {
            SsoError::InvalidConfiguration("saml_idp_certificate is required".into())
        })?;
        // Reject an unparseable certificate at build time, not mid-login.
        signature::parse_certificate(&idp_certificate)?;

        let sp_signing_key = match &config.saml_sp_private_key_encrypted {
            Some(encrypted) => {
                let pem = cipher.decrypt(config.org_id, encrypted)?;
                let key = PKey::private_key_from_pem(pem.as_bytes()).map_err(|e| {
                    SsoError::InvalidConfiguration(format!("Invalid SP private key: {e}"))
                })?;
                Some(key)
            }
            None => None,
        };

        let base = callback_base_url.trim_end_matches('/');
        Ok(Self {
            config_id: config.id,
            entity_id: format!("{base}/sso/{}/metadata", config.org_id),
            acs_url: format!("{base}/sso/{}/saml/callback", config.id),
            idp_sso_url,
            idp_slo_url: config.saml_idp_slo_url.clone(),
            idp_certificate,
            sp_signing_key,
        })
    }

    #[must_use]
    pub fn config_id(&self) -> Uuid {
        self.config_id
    }

    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    #[must_use]
    pub fn acs_url(&self) -> &str {
        &self.acs_url
    }

    /// Build the IdP login URL for the HTTP-Redirect binding: AuthnRequest
    /// XML, DEFLATE, base64, URL-encode. Signed when an SP key is
    /// configured.
    pub fn build_login_url(&self, relay_state: Option<&str>) -> SsoResult<String> {
        let request_id = format!("_id{}", Uuid::new_v4());
        let issue_instant = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");

        let authn_request = format!(
            r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="{request_id}" Version="2.0" IssueInstant="{issue_instant}" Destination="{destination}" AssertionConsumerServiceURL="{acs}" ProtocolBinding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST"><saml:Issuer>{issuer}</saml:Issuer></samlp:AuthnRequest>"#,
            destination = xml_escape(&self.idp_sso_url),
            acs = xml_escape(&self.acs_url),
            issuer = xml_escape(&self.entity_id),
        );

        self.build_redirect_url(&self.idp_sso_url, "SAMLRequest", &authn_request, relay_state)
    }

    /// Build the IdP single-logout URL, if the configuration has one.
    pub fn build_logout_url(
        &self,
        name_id: &str,
        session_index: Option<&str>,
    ) -> SsoResult<Option<String>> {
        let Some(slo_url) = &self.idp_slo_url else {
            return Ok(None);
        };

        let request_id = format!("_id{}", Uuid::new_v4());
        let issue_instant = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
        let session_index_xml = session_index
            .map(|si| format!("<samlp:SessionIndex>{}</samlp:SessionIndex>", xml_escape(si)))
            .unwrap_or_default();

        let logout_request = format!(
            r#"<samlp:LogoutRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="{request_id}" Version="2.0" IssueInstant="{issue_instant}" Destination="{destination}"><saml:Issuer>{issuer}</saml:Issuer><saml:NameID>{name_id}</saml:NameID>{session_index_xml}</samlp:LogoutRequest>"#,
            destination = xml_escape(slo_url),
            issuer = xml_escape(&self.entity_id),
            name_id = xml_escape(name_id),
        );

        self.build_redirect_url(slo_url, "SAMLRequest", &logout_request, None)
            .map(Some)
    }

    fn build_redirect_url(
        &self,
        endpoint: &str,
        parameter: &str,
        request_xml: &str,
        relay_state: Option<&str>,
    ) -> SsoResult<String> {
        let encoded = deflate_and_encode(request_xml)?;

        let mut query = format!("{parameter}={}", urlencoding::encode(&encoded));
        if let Some(rs) = relay_state {
            query.push_str(&format!("&RelayState={}", urlencoding::encode(rs)));
        }

        if let Some(key) = &self.sp_signing_key {
            query.push_str(&format!("&SigAlg={}", urlencoding::encode(RSA_SHA256)));
            let signature = signature::sign_redirect_payload(&query, key)?;
            query.push_str(&format!("&Signature={}", urlencoding::encode(&signature)));
        }

        let separator = if endpoint.contains('?') { '&' } else { '?' };
        Ok(format!("{endpoint}{separator}{query}"))
    }

    /// Validate a base64 `SAMLResponse` from the ACS callback and extract
    /// the asserted identity. Verifies the enveloped signature first, then
    /// status, then conditions.
    #[instrument(skip(self, raw_response), fields(config_id = %self.config_id))]
    pub fn validate_response(&self, raw_response: &str) -> SsoResult<SamlProfile> {
        let decoded = BASE64
            .decode(raw_response.trim())
            .map_err(|_| SsoError::InvalidAssertion("Response is not valid base64".to_string()))?;
        let xml = String::from_utf8(decoded)
            .map_err(|_| SsoError::InvalidAssertion("Response is not valid UTF-8".to_string()))?;

        verify_enveloped_signature(&xml, &self.idp_certificate)?;

        let parsed = parse_response(&xml)?;

        match parsed.status_code.as_deref() {
            Some(STATUS_SUCCESS) => {}
            Some(other) => {
                tracing::warn!(config_id = %self.config_id, status = ?other, "IdP returned non-success status");
                return Err(SsoError::InvalidAssertion(
                    "IdP returned non-success status".to_string(),
                ));
            }
            None => {
                return Err(SsoError::InvalidAssertion(
                    "Response has no status code".to_string(),
                ));
            }
        }

        let now = Utc::now();
        let skew = Duration::seconds(CLOCK_SKEW_SECS);
        if let Some(not_before) = parsed.not_before {
            if now + skew < not_before {
                return Err(SsoError::InvalidAssertion(
                    "Assertion is not yet valid".to_string(),
                ));
            }
        }
        if let Some(not_on_or_after) = parsed.not_on_or_after {
            if now - skew >= not_on_or_after {
                return Err(SsoError::InvalidAssertion(
                    "Assertion has expired".to_string(),
                ));
            }
        }

        if let Some(audience) = &parsed.audience {
            if audience != &self.entity_id {
                tracing::warn!(config_id = %self.config_id, audience = ?audience, "Assertion audience mismatch");
                return Err(SsoError::InvalidAssertion(
                    "Assertion audience mismatch".to_string(),
                ));
            }
        }

        let name_id = parsed
            .name_id
            .filter(|n| !n.is_empty())
            .ok_or_else(|| SsoError::InvalidAssertion("Assertion has no NameID".to_string()))?;

        Ok(SamlProfile {
            name_id,
            session_index: parsed.session_index,
            attributes: parsed.attributes,
        })
    }
}

/// DEFLATE (raw, no zlib header) then base64, per the HTTP-Redirect binding.
fn deflate_and_encode(xml: &str) -> SsoResult<String> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(xml.as_bytes())
        .map_err(|e| SsoError::Internal(format!("Failed to compress request: {e}")))?;
    let compressed = encoder
        .finish()
        .map_err(|e| SsoError::Internal(format!("Failed to compress request: {e}")))?;
    Ok(BASE64.encode(compressed))
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

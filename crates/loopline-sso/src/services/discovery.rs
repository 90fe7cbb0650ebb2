//! OIDC issuer discovery.

use crate::error::{SsoError, SsoResult};
use openidconnect::core::{
    CoreAuthDisplay, CoreClaimName, CoreClaimType, CoreClientAuthMethod, CoreGrantType,
    CoreJsonWebKey, CoreJweContentEncryptionAlgorithm, CoreJweKeyManagementAlgorithm,
    CoreResponseMode, CoreResponseType, CoreSubjectIdentifierType,
};
use openidconnect::{AdditionalProviderMetadata, IssuerUrl, ProviderMetadata};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tracing::instrument;

/// `end_session_endpoint` is an RP-initiated-logout extension, not part of
/// the core metadata set.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EndSessionProviderMetadata {
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
}

impl AdditionalProviderMetadata for EndSessionProviderMetadata {}

type SsoProviderMetadata = ProviderMetadata<
    EndSessionProviderMetadata,
    CoreAuthDisplay,
    CoreClientAuthMethod,
    CoreClaimName,
    CoreClaimType,
    CoreGrantType,
    CoreJweContentEncryptionAlgorithm,
    CoreJweKeyManagementAlgorithm,
    CoreJsonWebKey,
    CoreResponseMode,
    CoreResponseType,
    CoreSubjectIdentifierType,
>;

/// Discovered OIDC endpoints from provider metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredEndpoints {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: Option<String>,
    pub end_session_endpoint: Option<String>,
    pub jwks_uri: String,
    pub issuer: String,
}

/// OIDC discovery service.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryService;

impl DiscoveryService {
    /// Create a new discovery service.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Discover OIDC provider metadata from an issuer URL.
    #[instrument(skip(self), fields(issuer = %issuer_url))]
    pub async fn discover(&self, issuer_url: &str) -> SsoResult<DiscoveredEndpoints> {
        // Normalize issuer URL (remove trailing slash)
        let issuer_url = issuer_url.trim_end_matches('/');

        // SSRF protection: validate URL before making outbound requests
        validate_url_not_internal(issuer_url)
            .map_err(|e| SsoError::InvalidConfiguration(format!("SSRF protection: {e}")))?;

        let issuer = IssuerUrl::new(issuer_url.to_string())
            .map_err(|e| SsoError::InvalidConfiguration(format!("Invalid issuer URL: {e}")))?;

        // No redirects (SSRF protection), 10s timeout
        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| SsoError::Internal(format!("Failed to create HTTP client: {e}")))?;

        let metadata = SsoProviderMetadata::discover_async(issuer, &http_client)
            .await
            .map_err(|e| SsoError::DiscoveryFailed {
                issuer: issuer_url.to_string(),
                message: e.to_string(),
            })?;

        let endpoints = DiscoveredEndpoints {
            authorization_endpoint: metadata.authorization_endpoint().url().to_string(),
            token_endpoint: metadata
                .token_endpoint()
                .ok_or_else(|| SsoError::DiscoveryFailed {
                    issuer: issuer_url.to_string(),
                    message: "Token endpoint not found".to_string(),
                })?
                .url()
                .to_string(),
            userinfo_endpoint: metadata.userinfo_endpoint().map(|e| e.url().to_string()),
            end_session_endpoint: metadata
                .additional_metadata()
                .end_session_endpoint
                .clone(),
            jwks_uri: metadata.jwks_uri().url().to_string(),
            issuer: metadata.issuer().url().to_string(),
        };

        tracing::info!(
            authorization_endpoint = %endpoints.authorization_endpoint,
            token_endpoint = %endpoints.token_endpoint,
            "Discovered OIDC endpoints"
        );

        Ok(endpoints)
    }

    /// Get the well-known configuration URL for an issuer.
    #[must_use]
    pub fn get_well_known_url(issuer_url: &str) -> String {
        let issuer_url = issuer_url.trim_end_matches('/');
        format!("{issuer_url}/.well-known/openid-configuration")
    }
}

/// SSRF protection: validate that a URL does not target internal/private
/// services. Plain HTTP is permitted only for loopback hosts (local
/// development and hermetic tests); every other host requires HTTPS and must
/// not resolve to a private or metadata address.
pub(crate) fn validate_url_not_internal(url_str: &str) -> Result<(), String> {
    let url = url::Url::parse(url_str).map_err(|e| format!("Invalid URL: {e}"))?;

    let host = url
        .host_str()
        .ok_or_else(|| "URL has no host".to_string())?;

    let is_loopback_host = match host.parse::<IpAddr>() {
        Ok(ip) => ip.is_loopback(),
        Err(_) => host.eq_ignore_ascii_case("localhost"),
    };

    let scheme = url.scheme();
    if scheme != "https" && !(scheme == "http" && is_loopback_host) {
        return Err(format!("Only HTTPS is allowed for IdP URLs, got: {scheme}"));
    }

    if is_loopback_host {
        return Ok(());
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        match ip {
            IpAddr::V4(v4) => {
                if v4.is_private()
                    || v4.is_link_local()
                    || v4.is_broadcast()
                    || v4.is_unspecified()
                    || v4.is_documentation()
                    || v4 == std::net::Ipv4Addr::new(169, 254, 169, 254)
                {
                    return Err(format!("Internal/private IP not allowed: {host}"));
                }
            }
            IpAddr::V6(v6) => {
                if v6.is_unspecified() {
                    return Err(format!("Internal/private IP not allowed: {host}"));
                }
                let segs = v6.segments();
                if (segs[0] & 0xfe00) == 0xfc00 || (segs[0] & 0xffc0) == 0xfe80 {
                    return Err(format!("Internal/private IP not allowed: {host}"));
                }
            }
        }
    } else {
        let lower = host.to_lowercase();
        let blocked = [
            "metadata.google.internal",
            "metadata.goog",
            "169.254.169.254",
        ];
        for b in blocked {
            if lower == b || lower.ends_with(&format!(".{b}")) {
                return Err(format!("Blocked hostname: {host}"));
            }
        }
    }

    Ok(())
}

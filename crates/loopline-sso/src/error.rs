//! Error types for SSO federation.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Result type for SSO operations.
pub type SsoResult<T> = Result<T, SsoError>;

/// SSO federation error types.
#[derive(Debug, Error)]
pub enum SsoError {
    // Configuration errors
    #[error("SSO configuration not found: {0}")]
    ConfigurationNotFound(Uuid),

    #[error("SSO configuration is disabled: {0}")]
    ConfigurationDisabled(Uuid),

    #[error("Invalid SSO configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Field cannot be changed after creation: {0}")]
    ImmutableField(&'static str),

    #[error("Discovery failed for issuer {issuer}: {message}")]
    DiscoveryFailed { issuer: String, message: String },

    // Credential cipher errors
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    // Authentication flow errors
    #[error("SAML assertion validation failed: {0}")]
    InvalidAssertion(String),

    #[error("Authorization state is invalid or has expired")]
    InvalidOrExpiredState,

    #[error("Required attribute missing: {0}")]
    MissingRequiredAttribute(String),

    #[error("Email domain is not allowed for this organization")]
    DomainNotAllowed(String),

    #[error("IdP returned error: {error}")]
    IdpError {
        error: String,
        description: Option<String>,
    },

    #[error("Invalid callback: {0}")]
    InvalidCallback(String),

    // Provisioning errors
    #[error("User not found and auto-provisioning is disabled")]
    UserNotFoundAutoProvisionDisabled,

    #[error("User provisioning failed: {0}")]
    ProvisioningFailed(String),

    // Session errors
    #[error("SSO session not found: {0}")]
    SessionNotFound(Uuid),

    // Upstream errors
    #[error("Identity provider did not respond in time")]
    UpstreamTimeout,

    #[error("Identity provider request failed: {0}")]
    UpstreamError(String),

    // Infrastructure errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for SsoError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            // 400 Bad Request
            SsoError::InvalidConfiguration(msg) => (
                StatusCode::BAD_REQUEST,
                "invalid_configuration",
                msg.clone(),
            ),
            SsoError::ImmutableField(field) => (
                StatusCode::BAD_REQUEST,
                "immutable_field",
                format!("Field cannot be changed after creation: {field}"),
            ),
            SsoError::InvalidCallback(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_callback", msg.clone())
            }
            SsoError::IdpError { error, description } => {
                // SECURITY: Never reflect IdP-controlled error/description in
                // the response body. Use Debug format (?), not Display (%), to
                // prevent log injection via ANSI codes/newlines.
                tracing::warn!(
                    idp_error = ?error,
                    idp_description = ?description,
                    "IdP returned error (not reflected to client)"
                );
                (
                    StatusCode::BAD_REQUEST,
                    "idp_error",
                    "The identity provider returned an error".to_string(),
                )
            }

            // 401 Unauthorized
            SsoError::InvalidAssertion(msg) => {
                // SECURITY: Assertion contents are attacker-influenced.
                tracing::warn!(reason = ?msg, "SAML assertion rejected");
                (
                    StatusCode::UNAUTHORIZED,
                    "invalid_assertion",
                    "SAML assertion validation failed".to_string(),
                )
            }
            SsoError::InvalidOrExpiredState => (
                StatusCode::UNAUTHORIZED,
                "invalid_state",
                "Authorization state is invalid or has expired".to_string(),
            ),

            // 403 Forbidden
            SsoError::ConfigurationDisabled(id) => {
                tracing::debug!(config_id = %id, "SSO configuration is disabled");
                (
                    StatusCode::FORBIDDEN,
                    "configuration_disabled",
                    "SSO configuration is disabled".to_string(),
                )
            }
            SsoError::DomainNotAllowed(domain) => {
                // SECURITY: Do not reflect the submitted domain to the client.
                tracing::warn!(domain = ?domain, "Email domain not in allow-list");
                (
                    StatusCode::FORBIDDEN,
                    "domain_not_allowed",
                    "Email domain is not allowed for this organization".to_string(),
                )
            }
            SsoError::UserNotFoundAutoProvisionDisabled => (
                StatusCode::FORBIDDEN,
                "auto_provision_disabled",
                "User not found and auto-provisioning is disabled".to_string(),
            ),

            // 404 Not Found
            SsoError::ConfigurationNotFound(id) => (
                StatusCode::NOT_FOUND,
                "configuration_not_found",
                format!("SSO configuration {id} not found"),
            ),
            SsoError::SessionNotFound(id) => (
                StatusCode::NOT_FOUND,
                "session_not_found",
                format!("SSO session {id} not found"),
            ),

            // 422 Unprocessable Entity
            SsoError::DiscoveryFailed { issuer, message } => {
                tracing::warn!(issuer = ?issuer, message = ?message, "OIDC discovery failed");
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "discovery_failed",
                    "Failed to discover OIDC endpoints for the configured issuer".to_string(),
                )
            }
            SsoError::MissingRequiredAttribute(attr) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "missing_required_attribute",
                format!("Required attribute missing: {attr}"),
            ),
            SsoError::ProvisioningFailed(msg) => {
                tracing::error!(reason = ?msg, "User provisioning failed");
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "provisioning_failed",
                    "User provisioning failed".to_string(),
                )
            }

            // 502 / 504 upstream
            SsoError::UpstreamTimeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "upstream_timeout",
                "Identity provider did not respond in time".to_string(),
            ),
            SsoError::UpstreamError(msg) => {
                tracing::error!(reason = ?msg, "Upstream IdP request failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "upstream_error",
                    "Failed to communicate with the identity provider".to_string(),
                )
            }

            // 500 Internal Server Error
            SsoError::EncryptionFailed(msg) => {
                tracing::error!(reason = ?msg, "Encryption error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "encryption_error",
                    "Security operation failed".to_string(),
                )
            }
            SsoError::DecryptionFailed(msg) => {
                tracing::error!(reason = ?msg, "Decryption error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "decryption_error",
                    "Security operation failed".to_string(),
                )
            }
            SsoError::Database(e) => {
                tracing::error!(error = ?e, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "Database error occurred".to_string(),
                )
            }
            SsoError::Internal(msg) => {
                tracing::error!(reason = ?msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = ErrorResponse {
            error: error_code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<reqwest::Error> for SsoError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SsoError::UpstreamTimeout
        } else {
            SsoError::UpstreamError(err.to_string())
        }
    }
}

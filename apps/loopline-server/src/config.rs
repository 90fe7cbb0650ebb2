//! Server configuration loaded from environment variables.
//!
//! Loading is fail-fast: required variables must be present and valid or
//! startup aborts with a clear message.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::env;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("{0} must be a base64-encoded 32-byte key")]
    InvalidMasterKey(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Runtime configuration.
#[derive(Clone)]
pub struct Config {
    /// Postgres connection string.
    pub database_url: String,
    /// Public base URL of this deployment, used to build IdP callback URLs.
    pub base_url: String,
    /// Master key for envelope encryption of stored IdP credentials.
    pub master_key: [u8; 32],
    pub host: String,
    pub port: u16,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` naming the first missing or invalid variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = require("DATABASE_URL")?;
        let base_url = require("LOOPLINE_BASE_URL")?
            .trim_end_matches('/')
            .to_string();
        let master_key = parse_master_key("LOOPLINE_MASTER_KEY", &require("LOOPLINE_MASTER_KEY")?)?;

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = match env::var("PORT") {
            Ok(value) => value.parse::<u16>().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                value: value.clone(),
            })?,
            Err(_) => 8080,
        };
        let log_filter = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            database_url,
            base_url,
            master_key,
            host,
            port,
            log_filter,
        })
    }

    /// Socket address string to bind to.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parse_master_key(name: &'static str, value: &str) -> Result<[u8; 32], ConfigError> {
    let bytes = BASE64
        .decode(value.trim())
        .map_err(|_| ConfigError::InvalidMasterKey(name))?;
    bytes
        .try_into()
        .map_err(|_| ConfigError::InvalidMasterKey(name))
}

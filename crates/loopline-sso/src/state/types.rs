//! Ephemeral authorization state types.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use uuid::Uuid;

/// How long an authorization state is valid. Fixed; not configurable per
/// organization.
pub const STATE_TTL_MINUTES: i64 = 10;

/// Errors from the authorization state store.
#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("Authorization state not found")]
    NotFound,

    #[error("Authorization state already consumed at {consumed_at}")]
    AlreadyConsumed { consumed_at: DateTime<Utc> },

    #[error("Authorization state expired at {expired_at}")]
    Expired { expired_at: DateTime<Utc> },

    #[error("Duplicate state token")]
    DuplicateState,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<StateStoreError> for crate::error::SsoError {
    fn from(err: StateStoreError) -> Self {
        match err {
            // A consumed or expired token must be indistinguishable from an
            // unknown one.
            StateStoreError::NotFound
            | StateStoreError::AlreadyConsumed { .. }
            | StateStoreError::Expired { .. } => crate::error::SsoError::InvalidOrExpiredState,
            StateStoreError::DuplicateState => {
                crate::error::SsoError::Internal("duplicate authorization state".to_string())
            }
            StateStoreError::Storage(msg) => crate::error::SsoError::Internal(msg),
        }
    }
}

/// A pending authorization round trip to an external IdP.
#[derive(Debug, Clone)]
pub struct AuthState {
    /// Random opaque token; primary key and the OAuth `state` parameter.
    pub state: String,
    pub sso_configuration_id: Uuid,
    /// PKCE code verifier, attached after the challenge is built.
    pub pkce_verifier: Option<String>,
    /// Where to send the user after the callback completes.
    pub redirect_uri: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl AuthState {
    /// Create a new state record expiring [`STATE_TTL_MINUTES`] from now.
    #[must_use]
    pub fn new(state: String, sso_configuration_id: Uuid, redirect_uri: String) -> Self {
        let now = Utc::now();
        Self {
            state,
            sso_configuration_id,
            pkce_verifier: None,
            redirect_uri,
            created_at: now,
            expires_at: now + Duration::minutes(STATE_TTL_MINUTES),
            consumed_at: None,
        }
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }

    /// Validate that the state is still usable.
    pub fn validate(&self) -> Result<(), StateStoreError> {
        if let Some(consumed_at) = self.consumed_at {
            return Err(StateStoreError::AlreadyConsumed { consumed_at });
        }
        if self.is_expired() {
            return Err(StateStoreError::Expired {
                expired_at: self.expires_at,
            });
        }
        Ok(())
    }

    /// Mark the state as consumed.
    pub fn consume(&mut self) {
        self.consumed_at = Some(Utc::now());
    }
}

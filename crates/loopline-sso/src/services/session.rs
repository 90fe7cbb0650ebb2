//! SSO session lifecycle.

use crate::error::{SsoError, SsoResult};
use loopline_db::models::{CreateSsoSession, SsoConfiguration, SsoSession};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

/// Creates, fetches, revokes and sweeps SSO sessions.
#[derive(Clone)]
pub struct SessionManager {
    pool: PgPool,
}

impl SessionManager {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Issue a session for a completed login. `idp_session_ref` carries the
    /// SAML `SessionIndex` or the OIDC id-token for later single logout.
    #[instrument(skip(self, config, attributes), fields(config_id = %config.id, %user_id))]
    pub async fn create(
        &self,
        config: &SsoConfiguration,
        user_id: Uuid,
        idp_session_ref: Option<String>,
        attributes: serde_json::Value,
    ) -> SsoResult<SsoSession> {
        let session = SsoSession::create(
            &self.pool,
            CreateSsoSession {
                user_id,
                org_id: config.org_id,
                sso_configuration_id: config.id,
                idp_session_ref,
                attributes,
            },
        )
        .await?;

        tracing::info!(session_id = %session.id, expires_at = %session.expires_at, "Created SSO session");
        Ok(session)
    }

    /// Fetch a session by id.
    pub async fn get(&self, session_id: Uuid) -> SsoResult<SsoSession> {
        SsoSession::find_by_id(&self.pool, session_id)
            .await?
            .ok_or(SsoError::SessionNotFound(session_id))
    }

    /// Revoke a session. Unknown ids are an error; revoking an already
    /// revoked or expired session succeeds and returns it unchanged.
    #[instrument(skip(self), fields(%session_id))]
    pub async fn revoke(&self, session_id: Uuid) -> SsoResult<SsoSession> {
        let existing = self.get(session_id).await?;

        match SsoSession::revoke(&self.pool, session_id).await? {
            Some(revoked) => {
                tracing::info!(%session_id, "Revoked SSO session");
                Ok(revoked)
            }
            None => Ok(existing),
        }
    }

    /// Sweep overdue active sessions into the `expired` state.
    pub async fn cleanup_expired(&self) -> SsoResult<u64> {
        let count = SsoSession::mark_expired_overdue(&self.pool).await?;
        if count > 0 {
            tracing::debug!(count, "Marked overdue sessions expired");
        }
        Ok(count)
    }
}

//! SSO session model.
//!
//! A session is issued after a successful federated login and lives for a
//! fixed eight hours. Rows are never deleted; revocation and expiry are
//! recorded in the `status` column so audit queries can tell them apart.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Fixed session lifetime. No sliding expiration.
pub const SESSION_LIFETIME_HOURS: i64 = 8;

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SsoSessionStatus {
    Active,
    Revoked,
    Expired,
}

impl std::fmt::Display for SsoSessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SsoSessionStatus::Active => write!(f, "active"),
            SsoSessionStatus::Revoked => write!(f, "revoked"),
            SsoSessionStatus::Expired => write!(f, "expired"),
        }
    }
}

impl std::str::FromStr for SsoSessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SsoSessionStatus::Active),
            "revoked" => Ok(SsoSessionStatus::Revoked),
            "expired" => Ok(SsoSessionStatus::Expired),
            _ => Err(format!("Unknown session status: {s}")),
        }
    }
}

/// SSO session entity.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SsoSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub sso_configuration_id: Uuid,
    /// Provider-side session reference: SAML `SessionIndex` or the OIDC
    /// id-token. Needed for single logout.
    pub idp_session_ref: Option<String>,
    /// Snapshot of the mapped attributes at login time.
    pub attributes: serde_json::Value,
    pub status: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a new session.
#[derive(Debug, Clone)]
pub struct CreateSsoSession {
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub sso_configuration_id: Uuid,
    pub idp_session_ref: Option<String>,
    pub attributes: serde_json::Value,
}

impl SsoSession {
    /// Create a new active session expiring [`SESSION_LIFETIME_HOURS`] from
    /// now.
    pub async fn create(
        pool: &sqlx::PgPool,
        input: CreateSsoSession,
    ) -> Result<Self, sqlx::Error> {
        let expires_at = Utc::now() + Duration::hours(SESSION_LIFETIME_HOURS);

        sqlx::query_as(
            r"
            INSERT INTO sso_sessions (
                user_id, org_id, sso_configuration_id,
                idp_session_ref, attributes, status, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, 'active', $6)
            RETURNING *
            ",
        )
        .bind(input.user_id)
        .bind(input.org_id)
        .bind(input.sso_configuration_id)
        .bind(&input.idp_session_ref)
        .bind(&input.attributes)
        .bind(expires_at)
        .fetch_one(pool)
        .await
    }

    /// Find a session by ID.
    pub async fn find_by_id(pool: &sqlx::PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM sso_sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Revoke a session. The row is kept; status flips to `revoked` and the
    /// expiry is pulled back to now. Revoking an already revoked or expired
    /// session is a no-op and returns `None`.
    pub async fn revoke(pool: &sqlx::PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            UPDATE sso_sessions
            SET status = 'revoked', expires_at = NOW()
            WHERE id = $1 AND status = 'active'
            RETURNING *
            ",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Mark overdue active sessions as expired. Returns the number of rows
    /// touched. Run periodically.
    pub async fn mark_expired_overdue(pool: &sqlx::PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE sso_sessions SET status = 'expired' WHERE status = 'active' AND expires_at < NOW()",
        )
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Get status enum.
    pub fn session_status(&self) -> Result<SsoSessionStatus, String> {
        self.status.parse()
    }

    /// Whether the session is currently usable.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == "active" && Utc::now() < self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            SsoSessionStatus::Active,
            SsoSessionStatus::Revoked,
            SsoSessionStatus::Expired,
        ] {
            assert_eq!(status.to_string().parse::<SsoSessionStatus>(), Ok(status));
        }
        assert!("destroyed".parse::<SsoSessionStatus>().is_err());
    }

    #[test]
    fn test_is_active_respects_expiry() {
        let session = SsoSession {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            sso_configuration_id: Uuid::new_v4(),
            idp_session_ref: None,
            attributes: serde_json::json!({}),
            status: "active".to_string(),
            expires_at: Utc::now() - Duration::minutes(1),
            created_at: Utc::now() - Duration::hours(9),
        };
        assert!(!session.is_active());

        let fresh = SsoSession {
            expires_at: Utc::now() + Duration::hours(8),
            ..session.clone()
        };
        assert!(fresh.is_active());

        let revoked = SsoSession {
            status: "revoked".to_string(),
            ..fresh
        };
        assert!(!revoked.is_active());
    }
}

//! Organization and team membership models.
//!
//! Provisioning runs these inside a single transaction, so every method is
//! executor-generic.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

/// A user's membership in an organization.
#[derive(Debug, Clone, FromRow)]
pub struct OrgMembership {
    pub id: Uuid,
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub employee_id: Option<String>,
    pub department: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OrgMembership {
    /// Ensure the user is a member of the organization. Existing memberships
    /// are left untouched (first write wins).
    pub async fn ensure<'e, E>(
        executor: E,
        org_id: Uuid,
        user_id: Uuid,
        role: &str,
        employee_id: Option<&str>,
        department: Option<&str>,
    ) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            r"
            INSERT INTO org_memberships (org_id, user_id, role, employee_id, department)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (org_id, user_id) DO NOTHING
            ",
        )
        .bind(org_id)
        .bind(user_id)
        .bind(role)
        .bind(employee_id)
        .bind(department)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Find a membership.
    pub async fn find<'e, E>(
        executor: E,
        org_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as("SELECT * FROM org_memberships WHERE org_id = $1 AND user_id = $2")
            .bind(org_id)
            .bind(user_id)
            .fetch_optional(executor)
            .await
    }
}

/// A user's membership in a team.
#[derive(Debug, Clone, FromRow)]
pub struct TeamMembership {
    pub id: Uuid,
    pub team_id: Uuid,
    pub user_id: Uuid,
    pub member_role: String,
    pub created_at: DateTime<Utc>,
}

impl TeamMembership {
    /// Ensure the user is a member of the team.
    pub async fn ensure<'e, E>(
        executor: E,
        team_id: Uuid,
        user_id: Uuid,
        member_role: &str,
    ) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            r"
            INSERT INTO team_memberships (team_id, user_id, member_role)
            VALUES ($1, $2, $3)
            ON CONFLICT (team_id, user_id) DO NOTHING
            ",
        )
        .bind(team_id)
        .bind(user_id)
        .bind(member_role)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Find a membership.
    pub async fn find<'e, E>(
        executor: E,
        team_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as("SELECT * FROM team_memberships WHERE team_id = $1 AND user_id = $2")
            .bind(team_id)
            .bind(user_id)
            .fetch_optional(executor)
            .await
    }
}

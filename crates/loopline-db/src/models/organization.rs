//! Organization entity model.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use loopline_core::OrgId;

/// A customer organization.
#[derive(Debug, Clone, FromRow)]
pub struct Organization {
    pub id: uuid::Uuid,
    pub name: String,
    /// Team new members are added to by provisioning, when set.
    pub default_team_id: Option<uuid::Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    /// Get the organization ID as a typed `OrgId`.
    #[must_use]
    pub fn org_id(&self) -> OrgId {
        OrgId::from_uuid(self.id)
    }

    /// Find an organization by ID.
    pub async fn find_by_id<'e, E>(
        executor: E,
        id: uuid::Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as("SELECT * FROM organizations WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await
    }
}

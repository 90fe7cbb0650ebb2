//! User entity model.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgExecutor};
use loopline_core::UserId;

/// A user account.
///
/// Users are platform-level; organization scoping happens through
/// memberships. Email addresses are unique and are the sole link between a
/// local account and an external federated identity.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: uuid::Uuid,

    /// Unique email address; match key for federated logins.
    pub email: String,

    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,

    /// Platform role, e.g. `member` or `admin`.
    pub role: String,

    /// Whether the account was created by just-in-time provisioning.
    pub sso_provisioned: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Get the user ID as a typed `UserId`.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        UserId::from_uuid(self.id)
    }

    /// Find a user by ID.
    pub async fn find_by_id(
        pool: &sqlx::PgPool,
        id: uuid::Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a user by email.
    ///
    /// Executor-generic so provisioning can run it inside a transaction.
    pub async fn find_by_email<'e, E>(
        executor: E,
        email: &str,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(executor)
            .await
    }

    /// Create a user from a federated identity (no password).
    pub async fn create_federated<'e, E>(
        executor: E,
        email: &str,
        display_name: Option<&str>,
        first_name: Option<&str>,
        last_name: Option<&str>,
        role: &str,
    ) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as(
            r"
            INSERT INTO users (
                email, display_name, first_name, last_name, role, sso_provisioned
            )
            VALUES ($1, $2, $3, $4, $5, true)
            RETURNING *
            ",
        )
        .bind(email)
        .bind(display_name)
        .bind(first_name)
        .bind(last_name)
        .bind(role)
        .fetch_one(executor)
        .await
    }
}

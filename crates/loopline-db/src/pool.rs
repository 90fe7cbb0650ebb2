//! Database connection pool.

use crate::error::DbError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Default maximum number of pooled connections.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Handle to the Postgres connection pool.
///
/// Thin wrapper around [`sqlx::PgPool`]; cloning is cheap and shares the
/// underlying pool.
#[derive(Debug, Clone)]
pub struct DbPool {
    pool: PgPool,
}

impl DbPool {
    /// Connect with default pool settings.
    ///
    /// # Errors
    ///
    /// Returns `DbError::ConnectionFailed` if the database is unreachable
    /// or the credentials are rejected.
    pub async fn connect(database_url: &str) -> Result<Self, DbError> {
        Self::connect_with(database_url, DEFAULT_MAX_CONNECTIONS).await
    }

    /// Connect with an explicit connection limit.
    ///
    /// # Errors
    ///
    /// Returns `DbError::ConnectionFailed` if the pool cannot be created.
    pub async fn connect_with(database_url: &str, max_connections: u32) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(DbError::ConnectionFailed)?;

        tracing::debug!(max_connections, "database pool created");
        Ok(Self { pool })
    }

    /// Access the underlying sqlx pool.
    #[must_use]
    pub fn inner(&self) -> &PgPool {
        &self.pool
    }

    /// Consume the wrapper, yielding the sqlx pool.
    #[must_use]
    pub fn into_inner(self) -> PgPool {
        self.pool
    }
}

impl From<PgPool> for DbPool {
    fn from(pool: PgPool) -> Self {
        Self { pool }
    }
}

//! Database migration management.
//!
//! Versioned SQL migrations embedded at compile time from `migrations/`.

use crate::error::DbError;
use crate::pool::DbPool;

/// Run all pending database migrations.
///
/// Migrations run in filename order (001_, 002_, ...). Applying an already
/// applied migration is a no-op.
///
/// # Example
///
/// ```rust,ignore
/// use loopline_db::{run_migrations, DbPool};
///
/// let pool = DbPool::connect("postgres://localhost/loopline").await?;
/// run_migrations(&pool).await?;
/// ```
///
/// # Errors
///
/// Returns `DbError::MigrationFailed` if any migration fails to apply.
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbError> {
    tracing::info!("running database migrations");

    sqlx::migrate!("./migrations")
        .run(pool.inner())
        .await
        .map_err(DbError::MigrationFailed)?;

    tracing::info!("migrations complete");
    Ok(())
}

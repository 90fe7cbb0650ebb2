//! Loopline database layer.
//!
//! sqlx/Postgres entity models and queries. Methods that participate in
//! transactions are generic over [`sqlx::PgExecutor`]. Schema migrations
//! are embedded from `migrations/` and applied with [`run_migrations`].

pub mod error;
pub mod migrations;
pub mod models;
pub mod pool;

pub use error::DbError;
pub use migrations::run_migrations;
pub use pool::DbPool;

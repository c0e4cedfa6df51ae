//! Persistence for virtualization inventory sync.
//!
//! - [`repositories`]: sqlx query functions over a `PgPool`, one struct per
//!   table family.
//! - [`store`]: the traits the pipeline persists through.
//! - [`pg`] / [`memory`]: PostgreSQL and in-process implementations.
//! - [`locks`]: the expiring key store behind the sync throttle.

use sqlx::postgres::PgPoolOptions;

pub mod error;
pub mod locks;
pub mod memory;
pub mod models;
pub mod pg;
pub mod repositories;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use store::{InventoryStore, MetricsStore, OperationStore, PlatformStore, SyncStore, Upserted};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Verify the database answers a trivial query.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply pending migrations from `db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../db/migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

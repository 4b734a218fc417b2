//! Persistence layer: the Job Record Store and the Job Queue Client.
//!
//! Both are exposed as traits ([`store::JobStore`], [`queue::TaskQueue`])
//! with a PostgreSQL implementation for production and an in-memory
//! implementation for tests and single-process runs.

use sqlx::postgres::PgPoolOptions;

pub mod models;
pub mod queue;
pub mod repositories;
pub mod store;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
///
/// Every in-flight queue delivery holds one connection for its lifetime, so
/// `max_connections` must exceed the worker concurrency.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to verify connectivity.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply pending migrations from `crates/db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

//! Persistence layer for the sendjoy workflow engine.
//!
//! Connection pool lifecycle helpers plus the model structs and
//! repositories for runs, steps, queue jobs, and events. The pool is
//! created once at process startup and injected everywhere; there are no
//! ambient singletons.

use sqlx::postgres::PgPoolOptions;

pub mod models;
pub mod repositories;

/// Convenience alias used throughout the workspace.
pub type DbPool = sqlx::PgPool;

/// Default maximum pool size.
const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Create a connection pool for the given database URL.
///
/// Pool size comes from `DATABASE_MAX_CONNECTIONS` (default 10).
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_MAX_CONNECTIONS);

    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Verify the database is reachable with a trivial round-trip query.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply all pending migrations from `db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../db/migrations").run(pool).await
}

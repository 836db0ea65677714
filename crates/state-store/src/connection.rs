use crate::error::StateStoreError;
use dotenvy::dotenv;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::env;
use std::time::Duration;

/// Establishes a connection pool to the PostgreSQL database.
///
/// Reads `DATABASE_URL` from the environment (loading a `.env` file if
/// present), creates a connection pool with bounded size and acquire
/// timeout, and returns it. The pool is shared across every bot
/// orchestrator task in the process.
pub async fn connect() -> Result<PgPool, StateStoreError> {
    let _ = dotenv();

    let database_url = env::var("DATABASE_URL")
        .map_err(|_e| StateStoreError::ConnectionConfigError("DATABASE_URL must be set.".to_string()))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&database_url)
        .await?;

    Ok(pool)
}

/// Applies pending migrations, bringing the schema up to the version this
/// binary expects. Safe to call on every startup.
pub async fn run_migrations(pool: &PgPool) -> Result<(), StateStoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

//! Pool construction and embedded migrations.

use std::str::FromStr;

use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::info;

use crate::config::StoreConfig;
use crate::error::StoreError;

/// Migrations under the workspace `migrations/` directory.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Opens a pool configured by `config`.
///
/// Every connection carries a server-side `statement_timeout`.
///
/// # Errors
///
/// Returns `StoreError::Database` if the URL is malformed or the first
/// connection cannot be established.
pub async fn connect(config: &StoreConfig) -> Result<PgPool, StoreError> {
    let options = PgConnectOptions::from_str(&config.database_url)?.options([(
        "statement_timeout",
        config.statement_timeout.as_millis().to_string(),
    )]);

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(options)
        .await?;

    info!(
        max_connections = config.max_connections,
        statement_timeout = ?config.statement_timeout,
        "database pool ready"
    );
    Ok(pool)
}

/// Applies any pending migrations.
///
/// # Errors
///
/// Returns `StoreError::Migrate` if a migration fails or the applied history
/// diverges from the embedded one.
pub async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
    MIGRATOR.run(pool).await?;
    info!("database migrations applied");
    Ok(())
}

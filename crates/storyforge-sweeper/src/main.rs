//! StoryForge stale-task sweeper entry point.

use std::sync::Arc;

use storyforge_core::clock::SystemClock;
use storyforge_store::pg_sweep_repository::PgSweepRepository;
use storyforge_store::{StoreConfig, connect, run_migrations};
use storyforge_sweeper::{SweeperConfig, SweeperError, SweeperRunner};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), SweeperError> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting StoryForge stale-task sweeper");

    // Read configuration from environment.
    let store_config = StoreConfig::from_env()?;
    let sweeper_config = SweeperConfig::from_env()?;

    // Create database connection pool.
    let pool = connect(&store_config).await?;
    if sweeper_config.run_migrations {
        run_migrations(&pool).await?;
        tracing::info!("migrations applied");
    }

    let runner = SweeperRunner::new(
        Arc::new(PgSweepRepository::new(pool)),
        Arc::new(SystemClock),
        sweeper_config,
    );
    runner.run(shutdown_signal()).await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}

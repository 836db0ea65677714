use anyhow::{Context, Result};
use clap::Parser;
use engine::Engine;
use std::path::PathBuf;

/// Aegis is the autonomous trading engine: a multi-bot supervisor running
/// Grid, DCA, Trend-Follower, SMC, and Hybrid strategies against an exchange
/// adapter, gated by a shared Risk Manager and checkpointed to Postgres.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the bots configuration file.
    #[arg(long, short, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();

    let config = configuration::load_config(&cli.config)
        .with_context(|| format!("failed to load configuration from {:?}", cli.config))?;
    let _tracing_guard = configuration::init_tracing(&config.logging)?;

    tracing::info!("aegis starting up");

    let pool = state_store::connect().await.context("failed to connect to the state store")?;
    state_store::run_migrations(&pool).await.context("failed to run state store migrations")?;
    let store = state_store::StateStoreRepository::new(pool);

    let mut engine = Engine::new(config, store)?;
    engine.spawn_bots().await?;

    tracing::info!("all bots spawned, running until shutdown signal");
    engine.run_until_shutdown().await?;

    tracing::info!("aegis shut down cleanly");
    Ok(())
}

//! Process entry point for the LaRue street-survival economy.
//!
//! Loads configuration, opens the database, wires every service into a
//! [`GameContext`] and runs the background loops until Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `larue-config.yaml` (or `LARUE_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Connect to SQLite and run migrations
//! 4. Build the services
//! 5. Spawn the hourly planner and the broadcast ticker
//! 6. Wait for Ctrl-C, signal shutdown, join the loops, close the pool

mod error;
mod publisher;

use std::path::PathBuf;
use std::sync::Arc;

use larue_core::config::{LarueConfig, LoggingConfig};
use larue_core::context::GameContext;
use larue_core::store::GameStore;
use larue_core::time::SystemTime;
use larue_db::{SqliteConfig, SqlitePool};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::BotError;
use crate::publisher::LogPublisher;

/// Config file looked up in the working directory.
const DEFAULT_CONFIG_PATH: &str = "larue-config.yaml";

/// Destination name reported for broadcasts.
const FEED_DESTINATION: &str = "feed";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if any initialization step fails or a background
/// loop dies.
#[tokio::main]
async fn main() -> Result<(), BotError> {
    // 1. Load configuration.
    let (config, config_path) = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!(
        path = %config_path.display(),
        timezone = %config.clock.timezone,
        reset_hour = config.clock.reset_hour,
        "larue-bot starting"
    );

    // 3. Connect to SQLite.
    let pool = SqlitePool::connect(&SqliteConfig::from_database(&config.database)).await?;
    pool.run_migrations().await?;

    // 4. Build the services.
    let store: Arc<dyn GameStore> = Arc::new(pool.store());
    let ctx = GameContext::new(
        store,
        Arc::new(SystemTime),
        Arc::new(LogPublisher::new(FEED_DESTINATION)),
        &config,
    )?;
    info!(
        players = ctx.economy.count_players().await?,
        items = config.items.len(),
        tickets = ctx.scratch.tickets().len(),
        "Services ready"
    );

    // 5. Spawn the background loops.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut loops: Vec<JoinHandle<()>> = Vec::new();
    if config.scheduler.hourly_enabled {
        let scheduler = ctx.scheduler.clone();
        loops.push(tokio::spawn(scheduler.run_hourly_planner(shutdown_rx.clone())));
    }
    if config.scheduler.broadcast_enabled {
        let scheduler = ctx.scheduler.clone();
        loops.push(tokio::spawn(scheduler.run_broadcast_ticker(shutdown_rx.clone())));
    }
    drop(shutdown_rx);
    info!(loops = loops.len(), "Background loops started");

    // 6. Run until Ctrl-C.
    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    if shutdown_tx.send(true).is_err() {
        info!("No background loop was running");
    }
    for handle in loops {
        handle.await?;
    }
    pool.close().await;

    info!("larue-bot shutdown complete");
    Ok(())
}

/// Load configuration from `LARUE_CONFIG` or `larue-config.yaml`.
///
/// A missing file means defaults (plus environment overrides).
fn load_config() -> Result<(LarueConfig, PathBuf), BotError> {
    let path = std::env::var_os("LARUE_CONFIG")
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    if path.exists() {
        let config = LarueConfig::from_file(&path)?;
        return Ok((config, path));
    }

    let mut config = LarueConfig::default();
    config.apply_env_overrides();
    config.validate()?;
    Ok((config, path))
}

/// Install the global subscriber. `RUST_LOG` wins over `logging.level`.
fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

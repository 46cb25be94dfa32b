//! Snapshot engine binary for the holder points tracker.
//!
//! Wires the chain client, the rarity table, and `PostgreSQL` into the
//! scheduled snapshot cycle, then runs until interrupted.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `points-config.yaml` (or `POINTS_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Validate configuration
//! 4. Load the rarity table and build the snapshot builder
//! 5. Connect to `PostgreSQL` and run migrations
//! 6. Create the JSON-RPC chain source
//! 7. Install the Ctrl-C shutdown handler
//! 8. Run cycles: once immediately, then every interval

mod error;
mod rpc;
mod sink;

use std::sync::Arc;
use std::time::Duration;

use points_core::config::{LogFormat, LoggingConfig, PointsConfig};
use points_core::scheduler::{self, ScheduleSettings};
use points_core::snapshot::SnapshotBuilder;
use points_scoring::{RarityTable, ScalingFactors};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::rpc::{ChainSource, RpcClient};
use crate::sink::PgSnapshotSink;

/// Application entry point for the snapshot engine.
///
/// # Errors
///
/// Returns an error if any startup step fails. Cycle failures are logged
/// and retried on the next interval instead.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration (logging settings live in it).
    let config_path = PointsConfig::path_from_env();
    let config = PointsConfig::load_or_default(&config_path).map_err(EngineError::from)?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!(
        config_path = %config_path.display(),
        found = config_path.exists(),
        "points-engine starting"
    );

    // 3. Validate.
    config.validate().map_err(EngineError::from)?;
    let collection = config.chain.collection().map_err(EngineError::from)?;
    let token = config.chain.token().map_err(EngineError::from)?;
    info!(
        collection = %collection,
        token = %token,
        deployment_block = config.chain.deployment_block,
        nft_scaling_factor = %config.scoring.nft_scaling_factor,
        token_scaling_factor = %config.scoring.token_scaling_factor,
        token_decimals = config.scoring.token_decimals,
        "Configuration loaded"
    );

    // 4. Rarity table and scoring.
    let table = RarityTable::load(
        &config.scoring.rarity_table_path,
        config.scoring.units_path.as_deref(),
    )
    .map_err(EngineError::from)?;
    let factors = ScalingFactors::new(
        config.scoring.nft_scaling_factor,
        config.scoring.token_scaling_factor,
    )
    .and_then(|f| f.with_token_decimals(config.scoring.token_decimals))
    .map_err(EngineError::from)?;
    let builder = SnapshotBuilder::new(
        Arc::new(table),
        factors,
        config.schedule.balance_concurrency,
    );

    // 5. PostgreSQL.
    let db = points_db::open(
        &config.infrastructure.postgres_url,
        config.infrastructure.max_connections,
    )
    .await
    .map_err(EngineError::from)?;
    let sink = PgSnapshotSink::new(db.clone(), config.chain.deployment_block);

    // 6. Chain source.
    let rpc = RpcClient::new(
        &config.chain.rpc_url,
        Duration::from_millis(config.chain.request_timeout_ms),
    )
    .map_err(EngineError::from)?;
    let chain = ChainSource::new(
        rpc,
        collection,
        token,
        config.chain.deployment_block,
        config.chain.log_page_blocks,
    );

    // 7. Shutdown on Ctrl-C.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C; stopping"),
        }
        let _ = shutdown_tx.send(true);
    });

    // 8. Run cycles.
    let settings = ScheduleSettings::from_config(&config.schedule);
    let summary =
        scheduler::run_scheduled(&chain, &chain, &sink, &builder, settings, shutdown_rx).await;

    db.close().await;
    info!(
        runs = summary.runs,
        completed = summary.completed,
        failed = summary.failed,
        timed_out = summary.timed_out,
        interrupted = summary.interrupted,
        "points-engine shutdown complete"
    );

    Ok(())
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

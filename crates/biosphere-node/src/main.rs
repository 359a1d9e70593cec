//! Chunk server binary for Biosphere.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `biosphere.yaml` (or `BIOSPHERE_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Connect the snapshot archive (`PostgreSQL`, or in-memory)
//! 4. Connect the step result cache (`Dragonfly`, or in-memory)
//! 5. Build the chunk service around the reference integrator
//! 6. Serve the HTTP API until `Ctrl-C`

mod error;

use std::path::PathBuf;
use std::sync::Arc;

use biosphere_api::{AppState, start_server};
use biosphere_core::config::{ChunkServerConfig, LogFormat, LoggingConfig};
use biosphere_core::physics::BallisticIntegrator;
use biosphere_db::{ArchivePoolSettings, ChunkCache, DragonflyPool, PostgresPool, SnapshotArchive};
use biosphere_sync::ChunkService;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::NodeError;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "biosphere.yaml";

/// Application entry point for a chunk server.
///
/// # Errors
///
/// Returns an error if configuration, storage, or the HTTP server fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let (config, config_source) = load_config()?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!("biosphere-node starting");
    info!(
        source = %config_source,
        bind = %config.server.bind_addr(),
        snapshot_interval = config.streaming.default_snapshot_interval,
        tick_interval_ms = config.streaming.tick_interval_ms,
        "Configuration loaded"
    );

    // 3. Snapshot archive.
    let archive = connect_archive(&config).await?;

    // 4. Step result cache.
    let cache = connect_cache(&config).await?;

    // 5. Chunk service.
    let integrator = Arc::new(BallisticIntegrator::new(&config.physics));
    let service = ChunkService::new(&config, archive.clone(), cache, integrator)
        .map_err(NodeError::from)?;

    // 6. Serve.
    start_server(&config.server, Arc::new(AppState::new(service)))
        .await
        .map_err(NodeError::from)?;

    if let SnapshotArchive::Postgres(pool) = &archive {
        pool.close().await;
    }

    info!("biosphere-node exiting");
    Ok(())
}

/// Load configuration from `BIOSPHERE_CONFIG` or `biosphere.yaml`.
///
/// If the file does not exist, defaults are used; environment overrides
/// apply in both cases.
fn load_config() -> Result<(ChunkServerConfig, String), NodeError> {
    let path = std::env::var_os("BIOSPHERE_CONFIG")
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    if path.exists() {
        let config = ChunkServerConfig::from_file(&path)?;
        Ok((config, path.display().to_string()))
    } else {
        let mut config = ChunkServerConfig::default();
        config.apply_env_overrides();
        Ok((config, String::from("defaults")))
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match logging.format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn connect_archive(config: &ChunkServerConfig) -> Result<SnapshotArchive, NodeError> {
    let Some(url) = &config.storage.postgres_url else {
        warn!("No PostgreSQL configured, snapshots live in memory and are lost on exit");
        return Ok(SnapshotArchive::in_memory());
    };
    let settings = ArchivePoolSettings::with_max_connections(config.storage.postgres_max_connections);
    let pool = PostgresPool::connect(url, settings).await?;
    pool.run_migrations().await?;
    info!("Snapshot archive connected to PostgreSQL");
    Ok(SnapshotArchive::Postgres(pool))
}

async fn connect_cache(config: &ChunkServerConfig) -> Result<ChunkCache, NodeError> {
    let Some(url) = &config.storage.dragonfly_url else {
        info!(capacity = config.cache.capacity, "Step cache kept in memory");
        return Ok(ChunkCache::in_memory(config.cache.capacity));
    };
    let pool = DragonflyPool::connect(url).await?;
    info!(ttl_secs = config.cache.ttl_secs, "Step cache connected to Dragonfly");
    Ok(ChunkCache::Dragonfly {
        pool,
        ttl_secs: config.cache.ttl_secs,
    })
}

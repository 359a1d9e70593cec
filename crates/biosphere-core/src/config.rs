//! Configuration loading and typed config structures for a chunk server.
//!
//! The configuration lives in `biosphere.yaml` next to the binary. Every
//! section and field is optional; an empty file (or no file at all) yields
//! a server with in-memory storage listening on the default port.

use std::path::Path;

use serde::Deserialize;
use tracing::warn;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level chunk server configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChunkServerConfig {
    /// Listen address.
    #[serde(default)]
    pub server: ServerConfig,

    /// Durable snapshot store and cache connection strings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Step result cache bounds.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Step model fetch deadlines.
    #[serde(default)]
    pub step: StepConfig,

    /// Streaming worker defaults.
    #[serde(default)]
    pub streaming: StreamingConfig,

    /// Reference integrator parameters.
    #[serde(default)]
    pub physics: PhysicsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ChunkServerConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `DATABASE_URL` overrides `storage.postgres_url`
    /// - `DRAGONFLY_URL` overrides `storage.dragonfly_url`
    /// - `BIOSPHERE_PORT` overrides `server.port`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, applying env overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config = Self::parse_without_env(yaml)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string, ignoring the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse_without_env(yaml: &str) -> Result<Self, ConfigError> {
        // serde_yml reads an empty document as unit, not as an empty map.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Override connection strings and the port from the environment when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DATABASE_URL") {
            self.storage.postgres_url = Some(val);
        }
        if let Ok(val) = std::env::var("DRAGONFLY_URL") {
            self.storage.dragonfly_url = Some(val);
        }
        if let Ok(val) = std::env::var("BIOSPHERE_PORT") {
            match val.parse() {
                Ok(port) => self.server.port = port,
                Err(e) => warn!(value = %val, error = %e, "Ignoring invalid BIOSPHERE_PORT"),
            }
        }
    }
}

/// Listen address.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// Bind host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerConfig {
    /// `host:port` suitable for `TcpListener::bind`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Storage connection strings. Absent means an in-memory backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageConfig {
    /// `PostgreSQL` connection string for the snapshot archive.
    #[serde(default)]
    pub postgres_url: Option<String>,

    /// Upper bound on pooled `PostgreSQL` connections.
    #[serde(default = "default_postgres_max_connections")]
    pub postgres_max_connections: u32,

    /// Dragonfly (Redis-compatible) URL for the step result cache.
    #[serde(default)]
    pub dragonfly_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            postgres_url: None,
            postgres_max_connections: default_postgres_max_connections(),
            dragonfly_url: None,
        }
    }
}

/// Step result cache bounds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
    /// Maximum entries held by the in-memory cache before the oldest is evicted.
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Expiry of Dragonfly cache entries, in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

/// Step model fetch deadlines.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StepConfig {
    /// Deadline for fetching a peer's cached state.
    #[serde(default = "default_remote_fetch_timeout_ms")]
    pub remote_fetch_timeout_ms: u64,

    /// Deadline for fetching and decoding a durable snapshot.
    #[serde(default = "default_snapshot_fetch_timeout_ms")]
    pub snapshot_fetch_timeout_ms: u64,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            remote_fetch_timeout_ms: default_remote_fetch_timeout_ms(),
            snapshot_fetch_timeout_ms: default_snapshot_fetch_timeout_ms(),
        }
    }
}

/// Defaults applied to streaming workers when a spawn request omits them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamingConfig {
    /// Persist a snapshot every N ticks; 0 disables persistence.
    #[serde(default = "default_snapshot_interval")]
    pub default_snapshot_interval: u64,

    /// Minimum wall-clock time per tick, in milliseconds. 0 runs unthrottled.
    #[serde(default)]
    pub tick_interval_ms: u64,

    /// Cell grains sourced into a fresh chunk when the request does not say.
    #[serde(default = "default_num_cells")]
    pub default_num_cells: u32,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            default_snapshot_interval: default_snapshot_interval(),
            tick_interval_ms: 0,
            default_num_cells: default_num_cells(),
        }
    }
}

/// Parameters of the reference ballistic integrator, in chunk units.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PhysicsConfig {
    /// Downward acceleration along z.
    #[serde(default = "default_gravity")]
    pub gravity: f32,

    /// Integration time step per tick.
    #[serde(default = "default_dt")]
    pub dt: f32,

    /// Fraction of normal velocity kept after bouncing off the floor or a wall.
    #[serde(default = "default_restitution")]
    pub restitution: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: default_gravity(),
            dt: default_dt(),
            restitution: default_restitution(),
        }
    }
}

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable multi-field lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (required by serde)
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_port() -> u16 {
    9000
}

const fn default_postgres_max_connections() -> u32 {
    10
}

const fn default_cache_capacity() -> usize {
    4096
}

const fn default_cache_ttl_secs() -> i64 {
    300
}

const fn default_remote_fetch_timeout_ms() -> u64 {
    1500
}

const fn default_snapshot_fetch_timeout_ms() -> u64 {
    2500
}

const fn default_snapshot_interval() -> u64 {
    5000
}

const fn default_num_cells() -> u32 {
    10
}

const fn default_gravity() -> f32 {
    0.5
}

const fn default_dt() -> f32 {
    0.05
}

const fn default_restitution() -> f32 {
    0.5
}

fn default_log_level() -> String {
    "info".to_owned()
}

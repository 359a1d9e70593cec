//! `PostgreSQL` pool backing the snapshot archive.
//!
//! Queries are built at runtime (not compile-time checked) so the crate
//! builds without a live database. All queries are parameterized.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

use crate::error::DbError;

/// Pool sizing and timeouts for the archive connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchivePoolSettings {
    /// Maximum number of pooled connections.
    pub max_connections: u32,
    /// How long a snapshot write may wait for a free connection.
    pub acquire_timeout: Duration,
    /// Idle connections are closed after this long.
    pub idle_timeout: Duration,
}

impl ArchivePoolSettings {
    /// Default timeouts with the given pool size.
    pub const fn with_max_connections(max_connections: u32) -> Self {
        Self {
            max_connections,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

impl Default for ArchivePoolSettings {
    fn default() -> Self {
        Self::with_max_connections(10)
    }
}

/// Connection pool handle to the snapshot database.
#[derive(Clone)]
pub struct PostgresPool {
    pool: PgPool,
}

impl PostgresPool {
    /// Open a pool against `url`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed, or
    /// [`DbError::Postgres`] if no connection can be established.
    pub async fn connect(url: &str, settings: ArchivePoolSettings) -> Result<Self, DbError> {
        let options: PgConnectOptions = url
            .parse()
            .map_err(|e: sqlx::Error| DbError::Config(format!("Invalid database URL: {e}")))?;

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .idle_timeout(settings.idle_timeout)
            .connect_with(options)
            .await?;

        tracing::info!(
            max_connections = settings.max_connections,
            "Snapshot archive pool connected"
        );
        Ok(Self { pool })
    }

    /// A pool that opens connections on first use instead of up front.
    ///
    /// Until the database is reachable every operation fails with
    /// [`DbError::Postgres`] after `settings.acquire_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed.
    pub fn connect_lazy(url: &str, settings: ArchivePoolSettings) -> Result<Self, DbError> {
        let options: PgConnectOptions = url
            .parse()
            .map_err(|e: sqlx::Error| DbError::Config(format!("Invalid database URL: {e}")))?;

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .idle_timeout(settings.idle_timeout)
            .connect_lazy_with(options);
        Ok(Self { pool })
    }

    /// Create or upgrade the `chunk_snapshots` schema.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Migration`] if any migration fails.
    pub async fn run_migrations(&self) -> Result<(), DbError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Snapshot schema up to date");
        Ok(())
    }

    /// The underlying [`PgPool`], for [`crate::snapshot_store::SnapshotStore`].
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Wait for in-flight snapshot writes, then close every connection.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Snapshot archive pool closed");
    }
}

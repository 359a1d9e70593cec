//! SQL operations on the `chunk_snapshots` table.
//!
//! Each row is one chunk's opaque grain blob at one tick. The
//! `(chunk_id, tick)` pair is unique; re-saving the same tick replaces the
//! blob so there is never more than one authoritative record per pair.

use biosphere_types::{ChunkId, SnapshotKey};
use sqlx::PgPool;

use crate::error::DbError;

/// Convert a tick to its `BIGINT` column value.
///
/// # Errors
///
/// Returns [`DbError::TickOutOfRange`] for ticks above `i64::MAX`.
pub fn tick_column(tick: u64) -> Result<i64, DbError> {
    i64::try_from(tick).map_err(|_overflow| DbError::TickOutOfRange(tick))
}

/// Operations on the `chunk_snapshots` table.
pub struct SnapshotStore<'a> {
    pool: &'a PgPool,
}

impl<'a> SnapshotStore<'a> {
    /// Create a new snapshot store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert (or replace) the snapshot of `chunk_id` at `tick`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::TickOutOfRange`] if `tick` cannot be stored, or
    /// [`DbError::Postgres`] if the insert fails.
    pub async fn insert_snapshot(
        &self,
        chunk_id: &ChunkId,
        tick: u64,
        blob: &[u8],
    ) -> Result<SnapshotKey, DbError> {
        let tick_i64 = tick_column(tick)?;

        let id: i64 = sqlx::query_scalar(
            r"INSERT INTO chunk_snapshots (chunk_id, tick, snapshot)
              VALUES ($1, $2, $3)
              ON CONFLICT (chunk_id, tick) DO UPDATE SET
                snapshot = EXCLUDED.snapshot,
                created_at = now()
              RETURNING id",
        )
        .bind(chunk_id.as_str())
        .bind(tick_i64)
        .bind(blob)
        .fetch_one(self.pool)
        .await?;

        tracing::debug!(chunk_id = %chunk_id, tick, id, "Inserted chunk snapshot");
        Ok(SnapshotKey(id))
    }

    /// Query the snapshot of `chunk_id` at exactly `tick`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn get_snapshot(
        &self,
        chunk_id: &ChunkId,
        tick: u64,
    ) -> Result<Option<ChunkSnapshotRow>, DbError> {
        let tick_i64 = tick_column(tick)?;

        let row = sqlx::query_as::<_, ChunkSnapshotRow>(
            r"SELECT id, chunk_id, tick, snapshot, created_at
              FROM chunk_snapshots
              WHERE chunk_id = $1 AND tick = $2",
        )
        .bind(chunk_id.as_str())
        .bind(tick_i64)
        .fetch_optional(self.pool)
        .await?;

        Ok(row)
    }

    /// Query a snapshot by its record key.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn get_snapshot_by_key(
        &self,
        key: SnapshotKey,
    ) -> Result<Option<ChunkSnapshotRow>, DbError> {
        let row = sqlx::query_as::<_, ChunkSnapshotRow>(
            r"SELECT id, chunk_id, tick, snapshot, created_at
              FROM chunk_snapshots
              WHERE id = $1",
        )
        .bind(key.0)
        .fetch_optional(self.pool)
        .await?;

        Ok(row)
    }

    /// Delete every snapshot of `chunk_id` with a tick strictly greater than `tick`.
    ///
    /// Returns the number of deleted records.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the delete fails.
    pub async fn delete_snapshots_after(&self, chunk_id: &ChunkId, tick: u64) -> Result<u64, DbError> {
        let tick_i64 = tick_column(tick)?;

        let result = sqlx::query(
            r"DELETE FROM chunk_snapshots
              WHERE chunk_id = $1 AND tick > $2",
        )
        .bind(chunk_id.as_str())
        .bind(tick_i64)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// List the ticks stored for `chunk_id`, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn list_ticks(&self, chunk_id: &ChunkId) -> Result<Vec<u64>, DbError> {
        let ticks: Vec<i64> = sqlx::query_scalar(
            r"SELECT tick FROM chunk_snapshots
              WHERE chunk_id = $1
              ORDER BY tick ASC",
        )
        .bind(chunk_id.as_str())
        .fetch_all(self.pool)
        .await?;

        Ok(ticks
            .into_iter()
            .filter_map(|t| u64::try_from(t).ok())
            .collect())
    }
}

/// A row from the `chunk_snapshots` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChunkSnapshotRow {
    /// Record key.
    pub id: i64,
    /// Owning chunk.
    pub chunk_id: String,
    /// Tick the snapshot was taken at.
    pub tick: i64,
    /// Opaque grain blob.
    pub snapshot: Vec<u8>,
    /// Real-world timestamp of the last write.
    pub created_at: chrono::DateTime<chrono::Utc>,
}

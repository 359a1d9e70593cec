//! Snapshot Store Adapter: durable save, exact-tick resume, and keyed fetch.
//!
//! The archive stores each chunk's grain set as an opaque blob produced by
//! the grain codec. Resume is strict: the record at exactly the requested
//! tick must exist and decode, and only then are later records for that
//! chunk purged so a resumed chunk never coexists with an abandoned future.

use std::sync::Arc;

use biosphere_types::codec::{decode_grains, decode_snapshot, encode_snapshot};
use biosphere_types::{ChunkId, Grain, SnapshotKey};
use tracing::{info, warn};

use crate::error::DbError;
use crate::memory::MemorySnapshotStore;
use crate::postgres::PostgresPool;
use crate::snapshot_store::{SnapshotStore, tick_column};

/// A grain set recovered from the archive.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumedSnapshot {
    /// The tick the snapshot was taken at.
    pub tick: u64,
    /// The chunk's grains at that tick.
    pub grains: Vec<Grain>,
}

/// Durable snapshot backend.
#[derive(Clone)]
pub enum SnapshotArchive {
    /// `PostgreSQL` `chunk_snapshots` table.
    Postgres(PostgresPool),
    /// Process-local map; lost on restart.
    Memory(Arc<MemorySnapshotStore>),
}

impl SnapshotArchive {
    /// An empty in-memory archive.
    pub fn in_memory() -> Self {
        Self::Memory(Arc::new(MemorySnapshotStore::new()))
    }

    /// Write one durable record of `chunk_id` at `tick`.
    ///
    /// Failure is reported to the caller; nothing in memory is rolled back.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::TickOutOfRange`] if `tick` exceeds the tick column
    /// (on every backend), [`DbError::Codec`] if the grains cannot be
    /// encoded, or a backend error if the write fails.
    pub async fn save(
        &self,
        chunk_id: &ChunkId,
        tick: u64,
        grains: &[Grain],
    ) -> Result<SnapshotKey, DbError> {
        tick_column(tick)?;
        let blob = encode_snapshot(grains)?;
        let key = match self {
            Self::Postgres(pool) => {
                SnapshotStore::new(pool.pool())
                    .insert_snapshot(chunk_id, tick, &blob)
                    .await?
            }
            Self::Memory(store) => store.insert(chunk_id, tick, blob)?,
        };
        info!(chunk_id = %chunk_id, tick, grains = grains.len(), "Saved chunk snapshot");
        Ok(key)
    }

    /// Load the snapshot of `chunk_id` at exactly `tick`, then purge later ones.
    ///
    /// There is no fallback to an earlier tick. Records with a tick strictly
    /// greater than `tick` are deleted only after the blob decodes; a failed
    /// delete is logged and does not fail the resume.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::SnapshotNotFound`] if no record exists at `tick`,
    /// [`DbError::Codec`] if the blob is corrupt, or a backend error if the
    /// read fails. No records are deleted in any error case.
    pub async fn resume(&self, chunk_id: &ChunkId, tick: u64) -> Result<ResumedSnapshot, DbError> {
        let blob = self
            .load(chunk_id, tick)
            .await?
            .ok_or_else(|| DbError::SnapshotNotFound {
                chunk_id: chunk_id.clone(),
                tick,
            })?;
        let grains = decode_grains(decode_snapshot(&blob)?.grains);

        match self.delete_after(chunk_id, tick).await {
            Ok(deleted) => {
                info!(chunk_id = %chunk_id, tick, deleted, "Resumed chunk, purged later snapshots");
            }
            Err(e) => {
                warn!(chunk_id = %chunk_id, tick, error = %e, "Failed to purge snapshots after resume point");
            }
        }

        Ok(ResumedSnapshot { tick, grains })
    }

    /// Load and decode the snapshot stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::SnapshotKeyNotFound`] if no record has this key,
    /// [`DbError::Codec`] if the blob is corrupt, or a backend error.
    pub async fn fetch_by_key(&self, key: SnapshotKey) -> Result<Vec<Grain>, DbError> {
        let blob = match self {
            Self::Postgres(pool) => SnapshotStore::new(pool.pool())
                .get_snapshot_by_key(key)
                .await?
                .map(|row| row.snapshot),
            Self::Memory(store) => store.get_by_key(key)?,
        }
        .ok_or(DbError::SnapshotKeyNotFound(key))?;

        Ok(decode_grains(decode_snapshot(&blob)?.grains))
    }

    /// Ticks stored for `chunk_id`, ascending.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the query fails.
    pub async fn ticks(&self, chunk_id: &ChunkId) -> Result<Vec<u64>, DbError> {
        match self {
            Self::Postgres(pool) => SnapshotStore::new(pool.pool()).list_ticks(chunk_id).await,
            Self::Memory(store) => store.ticks(chunk_id),
        }
    }

    async fn load(&self, chunk_id: &ChunkId, tick: u64) -> Result<Option<Vec<u8>>, DbError> {
        match self {
            Self::Postgres(pool) => Ok(SnapshotStore::new(pool.pool())
                .get_snapshot(chunk_id, tick)
                .await?
                .map(|row| row.snapshot)),
            Self::Memory(store) => store.get(chunk_id, tick),
        }
    }

    async fn delete_after(&self, chunk_id: &ChunkId, tick: u64) -> Result<u64, DbError> {
        match self {
            Self::Postgres(pool) => {
                SnapshotStore::new(pool.pool())
                    .delete_snapshots_after(chunk_id, tick)
                    .await
            }
            Self::Memory(store) => store.delete_after(chunk_id, tick),
        }
    }
}

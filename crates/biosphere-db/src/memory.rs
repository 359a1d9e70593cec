//! In-process backends for the snapshot archive and the step result cache.
//!
//! Used when no `PostgreSQL` or `Dragonfly` URL is configured and by the
//! test suites. Both are plain maps behind a [`std::sync::Mutex`]; no lock
//! is ever held across an `.await`.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use biosphere_types::{CacheKey, ChunkId, ChunkState, SnapshotKey};

use crate::error::DbError;

// =============================================================================
// Snapshots
// =============================================================================

/// Snapshot records keyed by `(chunk_id, tick)`.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    inner: Mutex<SnapshotTable>,
}

#[derive(Debug, Default)]
struct SnapshotTable {
    last_id: i64,
    records: BTreeMap<(ChunkId, u64), SnapshotRecord>,
}

#[derive(Debug)]
struct SnapshotRecord {
    id: i64,
    blob: Vec<u8>,
}

impl MemorySnapshotStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) the blob of `chunk_id` at `tick`.
    ///
    /// Replacing keeps the record key, matching the upsert of the SQL store.
    pub fn insert(
        &self,
        chunk_id: &ChunkId,
        tick: u64,
        blob: Vec<u8>,
    ) -> Result<SnapshotKey, DbError> {
        let mut table = self.lock()?;
        let key = (chunk_id.clone(), tick);
        if let Some(record) = table.records.get_mut(&key) {
            record.blob = blob;
            return Ok(SnapshotKey(record.id));
        }
        table.last_id = table.last_id.saturating_add(1);
        let id = table.last_id;
        table.records.insert(key, SnapshotRecord { id, blob });
        Ok(SnapshotKey(id))
    }

    /// The blob of `chunk_id` at exactly `tick`.
    pub fn get(&self, chunk_id: &ChunkId, tick: u64) -> Result<Option<Vec<u8>>, DbError> {
        let table = self.lock()?;
        Ok(table
            .records
            .get(&(chunk_id.clone(), tick))
            .map(|r| r.blob.clone()))
    }

    /// The blob stored under `key`.
    pub fn get_by_key(&self, key: SnapshotKey) -> Result<Option<Vec<u8>>, DbError> {
        let table = self.lock()?;
        Ok(table
            .records
            .values()
            .find(|r| r.id == key.0)
            .map(|r| r.blob.clone()))
    }

    /// Delete every record of `chunk_id` with a tick strictly greater than `tick`.
    pub fn delete_after(&self, chunk_id: &ChunkId, tick: u64) -> Result<u64, DbError> {
        let mut table = self.lock()?;
        let before = table.records.len();
        table.records.retain(|(id, t), _| id != chunk_id || *t <= tick);
        let removed = before.saturating_sub(table.records.len());
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }

    /// Ticks stored for `chunk_id`, ascending.
    pub fn ticks(&self, chunk_id: &ChunkId) -> Result<Vec<u64>, DbError> {
        let table = self.lock()?;
        Ok(table
            .records
            .keys()
            .filter(|(id, _)| id == chunk_id)
            .map(|(_, t)| *t)
            .collect())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, SnapshotTable>, DbError> {
        self.inner
            .lock()
            .map_err(|_poisoned| DbError::LockPoisoned("snapshot table"))
    }
}

// =============================================================================
// Step results
// =============================================================================

/// Count-bounded step result cache; the oldest entry is evicted first.
#[derive(Debug)]
pub struct MemoryCache {
    capacity: usize,
    inner: Mutex<CacheTable>,
}

#[derive(Debug, Default)]
struct CacheTable {
    entries: HashMap<CacheKey, ChunkState>,
    order: VecDeque<CacheKey>,
}

impl MemoryCache {
    /// A cache holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(CacheTable::default()),
        }
    }

    /// Store `state` under a freshly minted key.
    pub fn put(&self, state: ChunkState) -> Result<CacheKey, DbError> {
        let mut table = self.lock()?;
        while table.entries.len() >= self.capacity {
            let Some(oldest) = table.order.pop_front() else {
                break;
            };
            table.entries.remove(&oldest);
        }
        let key = CacheKey::new();
        table.entries.insert(key, state);
        table.order.push_back(key);
        Ok(key)
    }

    /// The state stored under `key`, if still present.
    pub fn get(&self, key: CacheKey) -> Result<Option<ChunkState>, DbError> {
        let table = self.lock()?;
        Ok(table.entries.get(&key).cloned())
    }

    /// Number of entries currently held.
    pub fn entry_count(&self) -> Result<usize, DbError> {
        Ok(self.lock()?.entries.len())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, CacheTable>, DbError> {
        self.inner
            .lock()
            .map_err(|_poisoned| DbError::LockPoisoned("cache table"))
    }
}

//! Step result cache: opaque key -> [`ChunkState`].
//!
//! Every `put` mints a fresh key. Entries have no durability guarantee;
//! the in-memory backend evicts the oldest entry once it reaches its
//! capacity and the `Dragonfly` backend lets entries expire after a TTL.

use std::sync::Arc;

use biosphere_types::{CacheKey, ChunkState};

use crate::dragonfly::DragonflyPool;
use crate::error::DbError;
use crate::memory::MemoryCache;

/// Step result cache backend.
#[derive(Clone)]
pub enum ChunkCache {
    /// Count-bounded process-local map.
    Memory(Arc<MemoryCache>),
    /// Shared `Dragonfly` instance with per-entry expiry.
    Dragonfly {
        /// Connection handle.
        pool: DragonflyPool,
        /// Entry expiry in seconds.
        ttl_secs: i64,
    },
}

impl ChunkCache {
    /// An in-memory cache bounded to `capacity` entries.
    pub fn in_memory(capacity: usize) -> Self {
        Self::Memory(Arc::new(MemoryCache::new(capacity)))
    }

    /// Store `state` under a freshly minted key.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the write fails.
    pub async fn put(&self, state: ChunkState) -> Result<CacheKey, DbError> {
        match self {
            Self::Memory(cache) => cache.put(state),
            Self::Dragonfly { pool, ttl_secs } => {
                let key = CacheKey::new();
                pool.set_json_ex(&redis_key(key), &state, *ttl_secs).await?;
                Ok(key)
            }
        }
    }

    /// The state stored under `key`; `None` if it was never stored or has
    /// been evicted.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the read fails or the entry is corrupt.
    pub async fn get(&self, key: CacheKey) -> Result<Option<ChunkState>, DbError> {
        match self {
            Self::Memory(cache) => cache.get(key),
            Self::Dragonfly { pool, .. } => pool.get_json(&redis_key(key)).await,
        }
    }

    /// Number of entries held, when the backend can report it cheaply.
    ///
    /// `Dragonfly` entries expire server-side, so that backend reports `None`.
    pub fn entry_count(&self) -> Option<usize> {
        match self {
            Self::Memory(cache) => cache.entry_count().ok(),
            Self::Dragonfly { .. } => None,
        }
    }
}

/// `chunk_state:{cache_key}`
fn redis_key(key: CacheKey) -> String {
    format!("chunk_state:{key}")
}

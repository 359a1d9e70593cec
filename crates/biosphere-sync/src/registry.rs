//! Process-wide registry of running chunk workers.
//!
//! At most one worker per chunk id may run in a process. A worker holds a
//! [`ChunkLease`] for its whole lifetime; dropping the lease unregisters
//! the chunk. The registry keeps each worker's quit signal and current
//! tick so operators can stop a chunk and the fleet controller can ask
//! which chunks are hosted.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use biosphere_types::{ChunkId, ChunkSummary};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info};

/// Errors returned by [`ChunkRegistry::register`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A worker for this chunk id is already running in this process.
    #[error("chunk {0} is already running")]
    AlreadyRunning(ChunkId),

    /// The registry lock was poisoned by a panicking holder.
    #[error("chunk registry lock poisoned")]
    LockPoisoned,
}

/// Liveness and cancellation handle of one registered worker.
#[derive(Debug)]
struct RegistryEntry {
    quit: watch::Sender<bool>,
    tick: Arc<AtomicU64>,
    started_at: DateTime<Utc>,
}

/// Shared map from chunk id to the handle of its running worker.
#[derive(Debug, Clone, Default)]
pub struct ChunkRegistry {
    inner: Arc<Mutex<BTreeMap<ChunkId, RegistryEntry>>>,
}

impl ChunkRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `chunk_id` for a new worker.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyRunning`] if another worker holds
    /// the id.
    pub fn register(&self, chunk_id: &ChunkId) -> Result<ChunkLease, RegistryError> {
        let mut map = self.lock()?;
        if map.contains_key(chunk_id) {
            return Err(RegistryError::AlreadyRunning(chunk_id.clone()));
        }

        let (quit_tx, quit_rx) = watch::channel(false);
        let tick = Arc::new(AtomicU64::new(0));
        map.insert(
            chunk_id.clone(),
            RegistryEntry {
                quit: quit_tx,
                tick: Arc::clone(&tick),
                started_at: Utc::now(),
            },
        );
        info!(chunk_id = %chunk_id, hosted = map.len(), "Registered chunk worker");

        Ok(ChunkLease {
            chunk_id: chunk_id.clone(),
            registry: self.clone(),
            quit: quit_rx,
            tick,
        })
    }

    /// Release `chunk_id`. Returns whether it was registered.
    ///
    /// Dropping the entry drops its quit sender, so a worker still waiting
    /// on the signal observes it as a quit.
    pub fn unregister(&self, chunk_id: &ChunkId) -> bool {
        let Ok(mut map) = self.lock() else {
            return false;
        };
        let removed = map.remove(chunk_id).is_some();
        if removed {
            info!(chunk_id = %chunk_id, hosted = map.len(), "Unregistered chunk worker");
        }
        removed
    }

    /// Signal the worker of `chunk_id` to exit before its next wait.
    ///
    /// Returns whether a worker was registered under that id.
    pub fn request_stop(&self, chunk_id: &ChunkId) -> bool {
        let Ok(map) = self.lock() else {
            return false;
        };
        let Some(entry) = map.get(chunk_id) else {
            return false;
        };
        entry.quit.send_replace(true);
        debug!(chunk_id = %chunk_id, "Quit requested");
        true
    }

    /// Whether a worker holds `chunk_id`.
    pub fn contains(&self, chunk_id: &ChunkId) -> bool {
        self.lock().is_ok_and(|map| map.contains_key(chunk_id))
    }

    /// Number of hosted workers.
    pub fn len(&self) -> usize {
        self.lock().map_or(0, |map| map.len())
    }

    /// Whether no worker is hosted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hosted workers ordered by chunk id.
    pub fn summaries(&self) -> Vec<ChunkSummary> {
        let Ok(map) = self.lock() else {
            return Vec::new();
        };
        map.iter()
            .map(|(chunk_id, entry)| ChunkSummary {
                chunk_id: chunk_id.clone(),
                tick: entry.tick.load(Ordering::Relaxed),
                started_at: entry.started_at,
            })
            .collect()
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<ChunkId, RegistryEntry>>, RegistryError> {
        self.inner
            .lock()
            .map_err(|_poisoned| RegistryError::LockPoisoned)
    }
}

/// Exclusive claim on a chunk id, released on drop.
#[derive(Debug)]
pub struct ChunkLease {
    chunk_id: ChunkId,
    registry: ChunkRegistry,
    quit: watch::Receiver<bool>,
    tick: Arc<AtomicU64>,
}

impl ChunkLease {
    /// The claimed chunk id.
    pub const fn chunk_id(&self) -> &ChunkId {
        &self.chunk_id
    }

    /// A receiver that flips to `true` (or closes) when the worker must quit.
    pub fn quit_signal(&self) -> watch::Receiver<bool> {
        self.quit.clone()
    }

    /// Publish the worker's current tick to status readers.
    pub fn set_tick(&self, tick: u64) {
        self.tick.store(tick, Ordering::Relaxed);
    }
}

impl Drop for ChunkLease {
    fn drop(&mut self) {
        self.registry.unregister(&self.chunk_id);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn registration_is_exclusive_until_lease_drops() {
        let registry = ChunkRegistry::new();
        let id = ChunkId::from("1-0:0");

        let lease = registry.register(&id).unwrap();
        assert_eq!(
            registry.register(&id).unwrap_err(),
            RegistryError::AlreadyRunning(id.clone())
        );
        assert_eq!(registry.len(), 1);

        drop(lease);
        assert!(registry.is_empty());
        assert!(registry.register(&id).is_ok());
    }

    #[test]
    fn stop_flips_quit_signal() {
        let registry = ChunkRegistry::new();
        let id = ChunkId::from("1-0:0");
        let lease = registry.register(&id).unwrap();
        let quit = lease.quit_signal();

        assert!(!*quit.borrow());
        assert!(registry.request_stop(&id));
        assert!(*quit.borrow());
        assert!(!registry.request_stop(&ChunkId::from("elsewhere")));
    }

    #[test]
    fn summaries_report_ticks_in_id_order() {
        let registry = ChunkRegistry::new();
        let b = registry.register(&ChunkId::from("b")).unwrap();
        let _a = registry.register(&ChunkId::from("a")).unwrap();
        b.set_tick(17);

        let summaries = registry.summaries();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].chunk_id, ChunkId::from("a"));
        assert_eq!(summaries[1].tick, 17);
    }

    #[tokio::test]
    async fn unregister_closes_quit_signal() {
        let registry = ChunkRegistry::new();
        let id = ChunkId::from("1-0:0");
        let lease = registry.register(&id).unwrap();
        let mut quit = lease.quit_signal();

        registry.unregister(&id);
        assert!(quit.changed().await.is_err());
    }
}

//! In-process neighbor router for the streaming model.
//!
//! Every chunk id has one mailbox: an unbounded channel plus a per-tick
//! buffer on the receiving side. A worker publishes one [`NeighborExport`]
//! per neighbor per tick; the receiving [`ChunkMailbox`] holds exports until
//! every expected neighbor has reported for the tick the worker is waiting
//! on, then hands them over as a single [`NeighborImport`].
//!
//! Neighbors are not required to be in lock-step. A fast neighbor's exports
//! for later ticks are buffered, and a mailbox is created on first publish
//! if its owner has not opened it yet. Topologies are assumed symmetric: a
//! worker waits for exactly the chunks it lists as neighbors.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use biosphere_types::{ChunkId, WireGrain};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Errors returned by [`ChunkRouter::open_mailbox`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouterError {
    /// The mailbox already has a reader.
    #[error("mailbox for chunk {0} is already open")]
    AlreadyOpen(ChunkId),

    /// The router lock was poisoned by a panicking holder.
    #[error("router lock poisoned")]
    LockPoisoned,
}

/// What one chunk sends one neighbor after finishing a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborExport {
    /// The sending chunk.
    pub from: ChunkId,
    /// The tick the receiver should consume this at.
    pub tick: u64,
    /// The sender's own grains, in the sender's frame.
    pub chunk_grains: Vec<WireGrain>,
    /// Grains that escaped toward the receiver, already in the receiver's frame.
    pub escaped_grains: Vec<WireGrain>,
}

/// Everything a chunk needs from its neighbors to run one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NeighborImport {
    /// The tick being imported.
    pub tick: u64,
    /// Grains handed over to this chunk, already in its frame.
    pub incoming: Vec<WireGrain>,
    /// Each neighbor's own grains in that neighbor's frame, by neighbor id.
    pub environment: BTreeMap<ChunkId, Vec<WireGrain>>,
}

/// The single wait point of a streaming worker.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkEvent {
    /// All neighbors reported for the awaited tick.
    NeighborImport(NeighborImport),
    /// The worker must exit.
    Quit,
}

struct MailboxSlot {
    tx: mpsc::UnboundedSender<NeighborExport>,
    rx: Option<mpsc::UnboundedReceiver<NeighborExport>>,
}

impl MailboxSlot {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx: Some(rx) }
    }
}

/// Routes neighbor exports to per-chunk mailboxes.
#[derive(Clone, Default)]
pub struct ChunkRouter {
    slots: Arc<Mutex<HashMap<ChunkId, MailboxSlot>>>,
}

impl ChunkRouter {
    /// An empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the reading end of `chunk_id`'s mailbox.
    ///
    /// `expected` is the set of neighbors whose exports complete a tick.
    /// Exports buffered before the mailbox was opened are kept.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::AlreadyOpen`] if another reader holds the mailbox.
    pub fn open_mailbox(
        &self,
        chunk_id: &ChunkId,
        expected: BTreeSet<ChunkId>,
    ) -> Result<ChunkMailbox, RouterError> {
        let mut slots = self.lock()?;
        let slot = slots
            .entry(chunk_id.clone())
            .or_insert_with(MailboxSlot::new);
        let rx = slot
            .rx
            .take()
            .ok_or_else(|| RouterError::AlreadyOpen(chunk_id.clone()))?;

        Ok(ChunkMailbox {
            chunk_id: chunk_id.clone(),
            router: self.clone(),
            expected,
            rx,
            pending: BTreeMap::new(),
        })
    }

    /// Remove `chunk_id`'s mailbox and drop anything buffered in it.
    pub fn close_mailbox(&self, chunk_id: &ChunkId) {
        if let Ok(mut slots) = self.lock() {
            slots.remove(chunk_id);
        }
    }

    /// Deliver `export` to the mailbox of `to`, creating it if needed.
    pub fn publish(&self, to: &ChunkId, export: NeighborExport) {
        let Ok(mut slots) = self.lock() else {
            warn!(to = %to, "Router lock poisoned, dropping export");
            return;
        };
        let slot = slots.entry(to.clone()).or_insert_with(MailboxSlot::new);
        if slot.tx.send(export).is_err() {
            debug!(to = %to, "Mailbox reader gone, dropping export");
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<ChunkId, MailboxSlot>>, RouterError> {
        self.slots.lock().map_err(|_poisoned| RouterError::LockPoisoned)
    }
}

/// The reading end of one chunk's mailbox. Closes the mailbox on drop.
pub struct ChunkMailbox {
    chunk_id: ChunkId,
    router: ChunkRouter,
    expected: BTreeSet<ChunkId>,
    rx: mpsc::UnboundedReceiver<NeighborExport>,
    pending: BTreeMap<u64, BTreeMap<ChunkId, NeighborExport>>,
}

impl ChunkMailbox {
    /// Wait until either `quit` fires or every expected neighbor has
    /// reported for `tick`.
    ///
    /// Quit wins ties. A closed quit channel counts as quit.
    pub async fn next_event(&mut self, tick: u64, quit: &mut watch::Receiver<bool>) -> ChunkEvent {
        loop {
            if *quit.borrow() {
                return ChunkEvent::Quit;
            }
            if let Some(import) = self.take_complete(tick) {
                return ChunkEvent::NeighborImport(import);
            }

            tokio::select! {
                biased;
                changed = quit.changed() => {
                    if changed.is_err() {
                        return ChunkEvent::Quit;
                    }
                }
                received = self.rx.recv() => {
                    let Some(export) = received else {
                        return ChunkEvent::Quit;
                    };
                    self.accept(export, tick);
                }
            }
        }
    }

    /// Buffer an export, discarding stale ticks and unknown senders.
    fn accept(&mut self, export: NeighborExport, current_tick: u64) {
        if export.tick < current_tick {
            warn!(
                chunk_id = %self.chunk_id,
                from = %export.from,
                tick = export.tick,
                current_tick,
                "Discarding stale neighbor export"
            );
            return;
        }
        if !self.expected.contains(&export.from) {
            warn!(chunk_id = %self.chunk_id, from = %export.from, "Discarding export from a non-neighbor");
            return;
        }

        let from = export.from.clone();
        let previous = self
            .pending
            .entry(export.tick)
            .or_default()
            .insert(from.clone(), export);
        if previous.is_some() {
            warn!(chunk_id = %self.chunk_id, from = %from, "Neighbor reported twice for one tick, keeping the latest");
        }
    }

    /// The import for `tick` if every expected neighbor has reported.
    fn take_complete(&mut self, tick: u64) -> Option<NeighborImport> {
        let reported = self.pending.get(&tick).map_or(0, BTreeMap::len);
        if reported < self.expected.len() {
            return None;
        }

        let exports = self.pending.remove(&tick).unwrap_or_default();
        let mut import = NeighborImport {
            tick,
            ..NeighborImport::default()
        };
        for (from, export) in exports {
            import.incoming.extend(export.escaped_grains);
            import.environment.insert(from, export.chunk_grains);
        }
        Some(import)
    }
}

impl Drop for ChunkMailbox {
    fn drop(&mut self) {
        self.router.close_mailbox(&self.chunk_id);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::time::Duration;

    use biosphere_types::{GrainId, GrainKind, Vec3f};

    use super::*;

    fn id(s: &str) -> ChunkId {
        ChunkId::from(s)
    }

    fn wire(n: u64) -> WireGrain {
        WireGrain {
            id: GrainId(n),
            pos: Vec3f::new(0.5, 0.5, 0.0),
            vel: Vec3f::default(),
            kind: GrainKind::Soil,
            cell_prop: None,
        }
    }

    fn export(from: &str, tick: u64, escaped: Vec<WireGrain>) -> NeighborExport {
        NeighborExport {
            from: id(from),
            tick,
            chunk_grains: vec![wire(100)],
            escaped_grains: escaped,
        }
    }

    #[tokio::test]
    async fn import_waits_for_every_neighbor() {
        let router = ChunkRouter::new();
        let expected: BTreeSet<_> = [id("east"), id("west")].into_iter().collect();
        let mut mailbox = router.open_mailbox(&id("me"), expected).unwrap();
        let (_quit_tx, mut quit) = watch::channel(false);

        router.publish(&id("me"), export("east", 0, vec![wire(1)]));
        let pending =
            tokio::time::timeout(Duration::from_millis(50), mailbox.next_event(0, &mut quit)).await;
        assert!(pending.is_err(), "import must not complete with one neighbor missing");

        router.publish(&id("me"), export("west", 0, vec![wire(2)]));
        let ChunkEvent::NeighborImport(import) = mailbox.next_event(0, &mut quit).await else {
            panic!("expected an import");
        };
        assert_eq!(import.tick, 0);
        assert_eq!(import.incoming.len(), 2);
        assert_eq!(import.environment.len(), 2);
    }

    #[tokio::test]
    async fn early_exports_are_buffered_per_tick() {
        let router = ChunkRouter::new();
        // Published before the owner opens its mailbox.
        router.publish(&id("me"), export("east", 1, vec![wire(11)]));
        router.publish(&id("me"), export("east", 0, vec![wire(10)]));

        let expected: BTreeSet<_> = [id("east")].into_iter().collect();
        let mut mailbox = router.open_mailbox(&id("me"), expected).unwrap();
        let (_quit_tx, mut quit) = watch::channel(false);

        let ChunkEvent::NeighborImport(first) = mailbox.next_event(0, &mut quit).await else {
            panic!("expected tick 0");
        };
        assert_eq!(first.incoming, vec![wire(10)]);
        let ChunkEvent::NeighborImport(second) = mailbox.next_event(1, &mut quit).await else {
            panic!("expected tick 1");
        };
        assert_eq!(second.incoming, vec![wire(11)]);
    }

    #[tokio::test]
    async fn quit_wins_over_a_ready_import() {
        let router = ChunkRouter::new();
        let mut mailbox = router.open_mailbox(&id("me"), BTreeSet::new()).unwrap();
        let (quit_tx, mut quit) = watch::channel(false);

        quit_tx.send_replace(true);
        assert_eq!(mailbox.next_event(0, &mut quit).await, ChunkEvent::Quit);
    }

    #[tokio::test]
    async fn isolated_chunk_never_waits() {
        let router = ChunkRouter::new();
        let mut mailbox = router.open_mailbox(&id("me"), BTreeSet::new()).unwrap();
        let (_quit_tx, mut quit) = watch::channel(false);

        let event = mailbox.next_event(5, &mut quit).await;
        assert_eq!(
            event,
            ChunkEvent::NeighborImport(NeighborImport {
                tick: 5,
                ..NeighborImport::default()
            })
        );
    }

    #[test]
    fn mailbox_has_a_single_reader_until_dropped() {
        let router = ChunkRouter::new();
        let first = router.open_mailbox(&id("me"), BTreeSet::new()).unwrap();
        assert!(matches!(
            router.open_mailbox(&id("me"), BTreeSet::new()),
            Err(RouterError::AlreadyOpen(_))
        ));
        drop(first);
        assert!(router.open_mailbox(&id("me"), BTreeSet::new()).is_ok());
    }

    #[tokio::test]
    async fn stale_and_foreign_exports_are_ignored() {
        let router = ChunkRouter::new();
        let expected: BTreeSet<_> = [id("east")].into_iter().collect();
        let mut mailbox = router.open_mailbox(&id("me"), expected).unwrap();
        let (_quit_tx, mut quit) = watch::channel(false);

        router.publish(&id("me"), export("east", 2, Vec::new()));
        router.publish(&id("me"), export("stranger", 3, vec![wire(9)]));
        router.publish(&id("me"), export("east", 3, vec![wire(3)]));

        let ChunkEvent::NeighborImport(import) = mailbox.next_event(3, &mut quit).await else {
            panic!("expected tick 3");
        };
        assert_eq!(import.incoming, vec![wire(3)]);
        assert!(!import.environment.contains_key(&id("stranger")));
    }
}

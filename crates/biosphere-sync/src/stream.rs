//! Streaming Synchronizer: the long-running per-chunk tick loop.
//!
//! A worker claims its chunk id in the [`ChunkRegistry`], opens its mailbox
//! on the [`ChunkRouter`], loads or seeds its chunk, and publishes its
//! initial state so neighbors waiting on the start tick are not blocked.
//! Each iteration then waits for the neighbor import of the current tick
//! (or quit), merges it, optionally snapshots, steps physics, and publishes
//! the next export to every neighbor.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use biosphere_core::chunk::GrainChunk;
use biosphere_core::migration::{distribute, merge_and_partition};
use biosphere_core::physics::Integrator;
use biosphere_core::topology::ResolvedTopology;
use biosphere_db::{DbError, SnapshotArchive};
use biosphere_types::codec::encode_grains;
use biosphere_types::{ChunkId, ChunkRel, ChunkState, Grain, WireGrain};
use tracing::{debug, info, warn};

use crate::registry::{ChunkLease, ChunkRegistry, RegistryError};
use crate::router::{ChunkEvent, ChunkMailbox, ChunkRouter, NeighborExport, NeighborImport, RouterError};

/// Why a worker never entered its tick loop.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Another worker already hosts the chunk.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The chunk's mailbox already has a reader.
    #[error(transparent)]
    Router(#[from] RouterError),

    /// The exact-tick snapshot was missing or undecodable.
    #[error("failed to resume chunk {chunk_id} at tick {tick}: {source}")]
    Resume {
        /// The chunk being resumed.
        chunk_id: ChunkId,
        /// The requested resume point.
        tick: u64,
        /// The archive error.
        source: DbError,
    },
}

/// Shared collaborators of every streaming worker in a process.
#[derive(Clone)]
pub struct StreamContext {
    /// Exclusive chunk id claims.
    pub registry: ChunkRegistry,
    /// Neighbor export delivery.
    pub router: ChunkRouter,
    /// Durable snapshots.
    pub archive: SnapshotArchive,
    /// The physics step.
    pub integrator: Arc<dyn Integrator>,
}

/// Per-worker pacing and durability settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    /// Snapshot every this many ticks; 0 disables snapshots.
    pub snapshot_interval: u64,
    /// Pause after each tick; zero runs flat out.
    pub tick_interval: Duration,
}

/// How a worker obtains its initial chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOrigin {
    /// Load the snapshot at exactly this tick.
    Resume(u64),
    /// Start at tick 0 with fresh sources.
    Seed {
        /// Soil grains to emit.
        num_soil: u32,
        /// Water grains to emit.
        num_water: u32,
        /// Cell grains to emit.
        num_cells: u32,
    },
}

/// Everything needed to start one worker.
#[derive(Debug, Clone)]
pub struct ChunkLaunch {
    /// The validated topology of the chunk.
    pub topology: ResolvedTopology,
    /// Initial state source.
    pub origin: ChunkOrigin,
    /// Pacing and snapshot settings.
    pub settings: StreamSettings,
}

/// Claim, load, and run one chunk until it is told to quit.
///
/// The chunk id is registered before any snapshot is read, so a duplicate
/// spawn never touches the archive. On any startup failure the claim is
/// released and the error returned; the tick loop itself never fails.
///
/// # Errors
///
/// Returns a [`StreamError`] if the chunk is already hosted or cannot be
/// resumed.
pub async fn run_chunk(context: StreamContext, launch: ChunkLaunch) -> Result<(), StreamError> {
    let chunk_id = launch.topology.chunk_id().clone();
    let lease = context.registry.register(&chunk_id)?;
    let expected = launch.topology.neighbor_ids().cloned().collect();
    let mailbox = context.router.open_mailbox(&chunk_id, expected)?;

    let chunk = match launch.origin {
        ChunkOrigin::Resume(tick) => {
            let resumed = context
                .archive
                .resume(&chunk_id, tick)
                .await
                .map_err(|source| StreamError::Resume {
                    chunk_id: chunk_id.clone(),
                    tick,
                    source,
                })?;
            GrainChunk::with_grains(resumed.grains, resumed.tick)
        }
        ChunkOrigin::Seed {
            num_soil,
            num_water,
            num_cells,
        } => GrainChunk::seeded(num_soil, num_water, num_cells),
    };
    lease.set_tick(chunk.tick());

    StreamingWorker {
        mailbox,
        lease,
        topology: launch.topology,
        chunk,
        router: context.router,
        archive: context.archive,
        integrator: context.integrator,
        settings: launch.settings,
    }
    .run()
    .await;
    Ok(())
}

/// One running chunk. Field order matters: the mailbox closes before the
/// registry claim is released.
struct StreamingWorker {
    mailbox: ChunkMailbox,
    lease: ChunkLease,
    topology: ResolvedTopology,
    chunk: GrainChunk,
    router: ChunkRouter,
    archive: SnapshotArchive,
    integrator: Arc<dyn Integrator>,
    settings: StreamSettings,
}

impl StreamingWorker {
    async fn run(mut self) {
        let mut quit = self.lease.quit_signal();
        info!(
            chunk_id = %self.lease.chunk_id(),
            tick = self.chunk.tick(),
            grains = self.chunk.grains().len(),
            neighbors = self.topology.neighbor_count(),
            "Chunk worker started"
        );

        self.publish(BTreeMap::new());

        loop {
            let tick = self.chunk.tick();
            let import = match self.mailbox.next_event(tick, &mut quit).await {
                ChunkEvent::Quit => break,
                ChunkEvent::NeighborImport(import) => import,
            };

            let environment = self.incorporate(import);
            self.snapshot_if_due(tick).await;

            let escaped = self
                .chunk
                .step(self.integrator.as_ref(), &environment, self.topology.wall());
            self.lease.set_tick(self.chunk.tick());

            let escapes = self.route_escapees(escaped);
            self.publish(escapes);

            // An isolated chunk never waits on its mailbox, so yield even
            // when unpaced to keep sharing the executor.
            if self.settings.tick_interval.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(self.settings.tick_interval).await;
            }
        }

        info!(chunk_id = %self.lease.chunk_id(), tick = self.chunk.tick(), "Chunk worker stopped");
    }

    /// Take ownership of handed-over grains and return the environment.
    fn incorporate(&mut self, import: NeighborImport) -> Vec<Grain> {
        let mut states = BTreeMap::new();
        states.insert(ChunkRel::ORIGIN, ChunkState::self_only(import.incoming));
        for (neighbor, grains) in import.environment {
            let Some(rel) = self.topology.offset_of(&neighbor) else {
                warn!(chunk_id = %self.lease.chunk_id(), from = %neighbor, "Import from unknown neighbor, ignoring");
                continue;
            };
            states.insert(rel, ChunkState::self_only(grains));
        }

        let partition = merge_and_partition(states);
        debug!(
            chunk_id = %self.lease.chunk_id(),
            tick = import.tick,
            incoming = partition.self_grains.len(),
            environment = partition.environment.len(),
            "Merged neighbor import"
        );
        self.chunk.incorporate(partition.self_grains);
        partition.environment
    }

    async fn snapshot_if_due(&self, tick: u64) {
        if tick.checked_rem(self.settings.snapshot_interval) != Some(0) {
            return;
        }
        if let Err(e) = self
            .archive
            .save(self.lease.chunk_id(), tick, self.chunk.grains())
            .await
        {
            warn!(chunk_id = %self.lease.chunk_id(), tick, error = %e, "Periodic snapshot failed");
        }
    }

    /// Bin escapees by destination neighbor. Escapes into a wall are dropped.
    fn route_escapees(&self, escaped: Vec<Grain>) -> BTreeMap<ChunkId, Vec<WireGrain>> {
        let mut escapes = BTreeMap::new();
        for shard in distribute(escaped).shards {
            match self.topology.neighbor_at(shard.dp) {
                Some(neighbor) => {
                    escapes.insert(neighbor.clone(), shard.grains);
                }
                None => {
                    warn!(
                        chunk_id = %self.lease.chunk_id(),
                        dp = %shard.dp,
                        count = shard.grains.len(),
                        "Grains escaped toward a missing neighbor, dropping"
                    );
                }
            }
        }
        escapes
    }

    /// Send the current state to every neighbor for consumption at the
    /// chunk's current tick.
    fn publish(&self, mut escapes: BTreeMap<ChunkId, Vec<WireGrain>>) {
        let chunk_grains = encode_grains(self.chunk.grains());
        for neighbor in self.topology.neighbor_ids() {
            self.router.publish(
                neighbor,
                NeighborExport {
                    from: self.lease.chunk_id().clone(),
                    tick: self.chunk.tick(),
                    chunk_grains: chunk_grains.clone(),
                    escaped_grains: escapes.remove(neighbor).unwrap_or_default(),
                },
            );
        }
    }
}

//! `ChunkService`: the operations a chunk server exposes.
//!
//! Spawn starts a streaming worker and returns at once; step runs one
//! stateless tick through the [`StepSynchronizer`]; the rest are reads over
//! the cache and the registry.

use std::sync::Arc;
use std::time::Duration;

use biosphere_core::config::{ChunkServerConfig, StreamingConfig};
use biosphere_core::physics::Integrator;
use biosphere_core::topology::{ResolvedTopology, TopologyError};
use biosphere_db::{ChunkCache, DbError, SnapshotArchive};
use biosphere_types::{
    CacheKey, ChunkId, ChunkSummaryResponse, GetChunkResponse, SpawnChunkRequest,
    SpawnChunkResponse, StatusResponse, StepChunkRequest,
};
use tracing::{error, info};

use crate::fetch::InputFetcher;
use crate::peer::PeerClient;
use crate::registry::ChunkRegistry;
use crate::router::ChunkRouter;
use crate::step::{StepError, StepSynchronizer};
use crate::stream::{ChunkLaunch, ChunkOrigin, StreamContext, StreamSettings, run_chunk};

struct ServiceInner {
    streams: StreamContext,
    steps: StepSynchronizer,
    cache: ChunkCache,
    defaults: StreamingConfig,
}

/// Cheaply cloneable handle to one chunk server's state.
#[derive(Clone)]
pub struct ChunkService {
    inner: Arc<ServiceInner>,
}

impl ChunkService {
    /// Wire a service over the given storage backends and physics step.
    ///
    /// # Errors
    ///
    /// Returns the [`reqwest::Error`] if the peer HTTP client cannot be built.
    pub fn new(
        config: &ChunkServerConfig,
        archive: SnapshotArchive,
        cache: ChunkCache,
        integrator: Arc<dyn Integrator>,
    ) -> Result<Self, reqwest::Error> {
        let peers = PeerClient::new(Duration::from_millis(config.step.remote_fetch_timeout_ms))?;
        let fetcher = InputFetcher::new(
            cache.clone(),
            archive.clone(),
            peers,
            Duration::from_millis(config.step.snapshot_fetch_timeout_ms),
        );
        let steps = StepSynchronizer::new(fetcher, cache.clone(), Arc::clone(&integrator));

        Ok(Self {
            inner: Arc::new(ServiceInner {
                streams: StreamContext {
                    registry: ChunkRegistry::new(),
                    router: ChunkRouter::new(),
                    archive,
                    integrator,
                },
                steps,
                cache,
                defaults: config.streaming.clone(),
            }),
        })
    }

    /// Start a streaming worker for the requested chunk.
    ///
    /// The topology is validated here; everything after that (claiming the
    /// chunk id, resuming, the tick loop) happens in a detached task whose
    /// failures are only logged.
    ///
    /// # Errors
    ///
    /// Returns a [`TopologyError`] if the declared neighbor list is malformed.
    pub fn spawn_chunk(&self, request: &SpawnChunkRequest) -> Result<SpawnChunkResponse, TopologyError> {
        let topology = ResolvedTopology::resolve(&request.topology)?;
        let chunk_id = topology.chunk_id().clone();

        let origin = if request.resumes() {
            ChunkOrigin::Resume(request.start_tick)
        } else {
            ChunkOrigin::Seed {
                num_soil: request.num_soil,
                num_water: request.num_water,
                num_cells: request.num_cells.unwrap_or(self.inner.defaults.default_num_cells),
            }
        };
        let launch = ChunkLaunch {
            topology,
            origin,
            settings: StreamSettings {
                snapshot_interval: request
                    .snapshot_interval
                    .unwrap_or(self.inner.defaults.default_snapshot_interval),
                tick_interval: Duration::from_millis(self.inner.defaults.tick_interval_ms),
            },
        };

        info!(chunk_id = %chunk_id, ?origin, "Spawning chunk worker");
        let context = self.inner.streams.clone();
        let task_chunk_id = chunk_id.clone();
        tokio::spawn(async move {
            if let Err(e) = run_chunk(context, launch).await {
                error!(chunk_id = %task_chunk_id, error = %e, "Chunk worker failed to start");
            }
        });

        Ok(SpawnChunkResponse {
            accepted: true,
            chunk_id,
        })
    }

    /// Compute one tick of one chunk and return the result's cache key.
    ///
    /// # Errors
    ///
    /// See [`StepSynchronizer::step`].
    pub async fn step_chunk(&self, request: &StepChunkRequest) -> Result<CacheKey, StepError> {
        self.inner.steps.step(&request.inputs).await
    }

    /// Look up a cached step result for a peer.
    ///
    /// # Errors
    ///
    /// Returns a [`DbError`] if the cache backend fails. A missing key is
    /// not an error.
    pub async fn get_chunk(&self, key: CacheKey) -> Result<GetChunkResponse, DbError> {
        let content = self.inner.cache.get(key).await?;
        Ok(GetChunkResponse {
            success: content.is_some(),
            content,
        })
    }

    /// Liveness and load of this process.
    pub fn status(&self) -> StatusResponse {
        StatusResponse {
            alive: true,
            hosted_chunks: self.inner.streams.registry.len(),
            cached_states: self.inner.cache.entry_count(),
        }
    }

    /// The chunks this process hosts.
    pub fn summary(&self) -> ChunkSummaryResponse {
        ChunkSummaryResponse {
            chunks: self.inner.streams.registry.summaries(),
        }
    }

    /// Ask a hosted chunk to exit before its next wait.
    ///
    /// Returns whether the chunk was hosted here.
    pub fn stop_chunk(&self, chunk_id: &ChunkId) -> bool {
        self.inner.streams.registry.request_stop(chunk_id)
    }
}

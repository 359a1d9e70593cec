//! Step Synchronizer: stateless, cache-backed tick computation.
//!
//! One call computes one tick of one chunk from 1 to 9 relative inputs and
//! stores the result under a fresh cache key. Global tick scheduling is
//! the caller's job: it threads returned keys into later calls for this
//! chunk and its neighbors. Overlapping calls for the same chunk and tick
//! are not excluded here.

use std::collections::BTreeSet;
use std::sync::Arc;

use biosphere_core::chunk::GrainChunk;
use biosphere_core::migration::{distribute, format_chunk_state, merge_and_partition, wall_from_offsets};
use biosphere_core::physics::Integrator;
use biosphere_db::{ChunkCache, DbError};
use biosphere_types::codec::encode_grains;
use biosphere_types::{CacheKey, ChunkRel, ChunkShard, ChunkState, StepInput};
use tracing::{debug, info};

use crate::fetch::{FetchFailed, InputFetcher};

/// Minimum number of inputs in one step call.
pub const MIN_STEP_INPUTS: usize = 1;
/// Maximum number of inputs in one step call (the full 3x3 neighborhood).
pub const MAX_STEP_INPUTS: usize = 9;

/// Errors of one step call.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// The request carried fewer than 1 or more than 9 inputs.
    #[error("step requires {MIN_STEP_INPUTS} to {MAX_STEP_INPUTS} inputs, got {0}")]
    InvalidInputCount(usize),

    /// An input offset lies outside the 3x3 neighborhood.
    #[error("step input offset {0} is outside the 3x3 neighborhood")]
    InvalidOffset(ChunkRel),

    /// Two inputs name the same offset.
    #[error("step input offset {0} given more than once")]
    DuplicateOffset(ChunkRel),

    /// At least one input could not be fetched.
    #[error(transparent)]
    FetchFailed(#[from] FetchFailed),

    /// The computed state could not be stored.
    #[error("failed to store step result: {0}")]
    Cache(#[source] DbError),
}

impl StepError {
    /// Whether the caller sent a malformed request (as opposed to a
    /// retryable failure).
    pub const fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInputCount(_) | Self::InvalidOffset(_) | Self::DuplicateOffset(_)
        )
    }
}

/// Reject malformed input lists before anything is fetched.
///
/// # Errors
///
/// Returns the first [`StepError`] caller error found.
pub fn validate_inputs(inputs: &[StepInput]) -> Result<(), StepError> {
    if !(MIN_STEP_INPUTS..=MAX_STEP_INPUTS).contains(&inputs.len()) {
        return Err(StepError::InvalidInputCount(inputs.len()));
    }
    let mut seen = BTreeSet::new();
    for input in inputs {
        if !input.dp.within_neighborhood() {
            return Err(StepError::InvalidOffset(input.dp));
        }
        if !seen.insert(input.dp) {
            return Err(StepError::DuplicateOffset(input.dp));
        }
    }
    Ok(())
}

/// Computes ticks on request from fetched neighbor states.
#[derive(Clone)]
pub struct StepSynchronizer {
    fetcher: InputFetcher,
    cache: ChunkCache,
    integrator: Arc<dyn Integrator>,
}

impl StepSynchronizer {
    /// A synchronizer that fetches through `fetcher` and stores into `cache`.
    pub fn new(fetcher: InputFetcher, cache: ChunkCache, integrator: Arc<dyn Integrator>) -> Self {
        Self {
            fetcher,
            cache,
            integrator,
        }
    }

    /// Compute one tick and return the key of the stored result.
    ///
    /// The result holds the self shard plus one shard per direction grains
    /// escaped toward. A cardinal direction is walled iff no input was given
    /// at that offset.
    ///
    /// # Errors
    ///
    /// Returns a caller error for malformed inputs (nothing is fetched),
    /// [`StepError::FetchFailed`] if any input is unavailable, or
    /// [`StepError::Cache`] if the result cannot be stored.
    pub async fn step(&self, inputs: &[StepInput]) -> Result<CacheKey, StepError> {
        validate_inputs(inputs)?;

        let states = self.fetcher.fetch_all(inputs).await?;
        let wall = wall_from_offsets(states.keys().copied());
        let input_log = tracing::enabled!(tracing::Level::DEBUG).then(|| {
            states
                .iter()
                .map(|(dp, state)| format!("{dp} <- {}", format_chunk_state(state)))
                .collect::<Vec<_>>()
                .join("; ")
        });

        let partition = merge_and_partition(states);
        let mut chunk = GrainChunk::with_grains(partition.self_grains, 0);
        let escaped = chunk.step(self.integrator.as_ref(), &partition.environment, wall);
        let distribution = distribute(escaped);

        let mut shards = Vec::with_capacity(distribution.shards.len().saturating_add(1));
        shards.push(ChunkShard {
            dp: ChunkRel::ORIGIN,
            grains: encode_grains(chunk.grains()),
        });
        shards.extend(distribution.shards);
        let result = ChunkState { shards };

        if let Some(inputs) = input_log {
            debug!(inputs = %inputs, result = %format_chunk_state(&result), "Stepped chunk");
        }

        let grains = result.grain_count();
        let key = self.cache.put(result).await.map_err(StepError::Cache)?;
        info!(
            %key,
            inputs = inputs.len(),
            grains,
            dropped = partition.dropped.saturating_add(distribution.dropped),
            "Step result cached"
        );
        Ok(key)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::time::{Duration, Instant};

    use biosphere_core::physics::BallisticIntegrator;
    use biosphere_db::SnapshotArchive;
    use biosphere_types::{ChunkDataLocator, ChunkId, ChunkWall, Grain, GrainId, GrainKind, Vec3f, WireGrain};

    use super::*;
    use crate::peer::PeerClient;

    /// Moves every grain by a fixed delta and records the wall it saw.
    struct Drift {
        dx: f32,
        seen_wall: std::sync::Mutex<Option<ChunkWall>>,
    }

    impl Drift {
        fn new(dx: f32) -> Self {
            Self {
                dx,
                seen_wall: std::sync::Mutex::new(None),
            }
        }
    }

    impl Integrator for Drift {
        fn integrate(&self, grains: &mut [Grain], _environment: &[Grain], wall: ChunkWall) {
            *self.seen_wall.lock().unwrap() = Some(wall);
            for grain in grains {
                grain.position.x += self.dx;
            }
        }
    }

    fn wire(id: u64, x: f32) -> WireGrain {
        WireGrain {
            id: GrainId(id),
            pos: Vec3f::new(x, 0.5, 0.0),
            vel: Vec3f::default(),
            kind: GrainKind::Water,
            cell_prop: None,
        }
    }

    fn synchronizer(cache: &ChunkCache, archive: &SnapshotArchive, integrator: Arc<dyn Integrator>) -> StepSynchronizer {
        let peers = PeerClient::new(Duration::from_millis(1500)).unwrap();
        let fetcher = InputFetcher::new(
            cache.clone(),
            archive.clone(),
            peers,
            Duration::from_millis(2500),
        );
        StepSynchronizer::new(fetcher, cache.clone(), integrator)
    }

    fn local(dp: ChunkRel, key: CacheKey) -> StepInput {
        StepInput {
            dp,
            data: ChunkDataLocator::Local(key),
        }
    }

    #[test]
    fn input_count_and_offsets_are_validated() {
        let key = CacheKey::new();
        assert!(matches!(validate_inputs(&[]), Err(StepError::InvalidInputCount(0))));

        let ten: Vec<_> = (0..10).map(|_| local(ChunkRel::ORIGIN, key)).collect();
        assert!(matches!(validate_inputs(&ten), Err(StepError::InvalidInputCount(10))));

        let far = [local(ChunkRel::new(2, 0), key)];
        assert!(matches!(validate_inputs(&far), Err(StepError::InvalidOffset(_))));

        let dup = [local(ChunkRel::XP, key), local(ChunkRel::XP, key)];
        assert!(matches!(validate_inputs(&dup), Err(StepError::DuplicateOffset(_))));

        assert!(validate_inputs(&[local(ChunkRel::ORIGIN, key)]).is_ok());
    }

    #[test]
    fn minimum_integer_offsets_are_invalid() {
        let key = CacheKey::new();
        for dp in [ChunkRel::new(i32::MIN, 0), ChunkRel::new(0, i32::MIN)] {
            let err = validate_inputs(&[local(dp, key)]).unwrap_err();
            assert!(matches!(err, StepError::InvalidOffset(rel) if rel == dp));
            assert!(err.is_caller_error());
        }
    }

    #[tokio::test]
    async fn oversized_request_is_rejected_before_any_fetch() {
        let cache = ChunkCache::in_memory(16);
        let archive = SnapshotArchive::in_memory();
        let sync = synchronizer(&cache, &archive, Arc::new(BallisticIntegrator::default()));

        // Unroutable peers: any fetch attempt would take the full deadline.
        let inputs: Vec<_> = (9000..9010)
            .map(|port| StepInput {
                dp: ChunkRel::ORIGIN,
                data: ChunkDataLocator::Remote {
                    peer: format!("10.255.255.1:{port}"),
                    cache_key: CacheKey::new(),
                },
            })
            .collect();

        let started = Instant::now();
        let err = sync.step(&inputs).await.unwrap_err();
        assert!(matches!(err, StepError::InvalidInputCount(10)));
        assert!(err.is_caller_error());
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(cache.entry_count(), Some(0));
    }

    #[tokio::test]
    async fn one_failed_input_fails_the_whole_step() {
        let cache = ChunkCache::in_memory(16);
        let archive = SnapshotArchive::in_memory();
        let sync = synchronizer(&cache, &archive, Arc::new(BallisticIntegrator::default()));

        let good = cache.put(ChunkState::self_only(vec![wire(1, 0.5)])).await.unwrap();
        let inputs = [
            local(ChunkRel::ORIGIN, good),
            local(ChunkRel::XP, good),
            local(ChunkRel::YM, CacheKey::new()),
        ];

        let err = sync.step(&inputs).await.unwrap_err();
        assert!(matches!(
            err,
            StepError::FetchFailed(FetchFailed { failed: 1, total: 3 })
        ));
        assert!(!err.is_caller_error());
        assert_eq!(cache.entry_count(), Some(1));
    }

    #[tokio::test]
    async fn silent_peer_fails_the_step_at_the_deadline() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let cache = ChunkCache::in_memory(16);
        let own = cache.put(ChunkState::self_only(vec![wire(1, 0.5)])).await.unwrap();
        let fetcher = InputFetcher::new(
            cache.clone(),
            SnapshotArchive::in_memory(),
            PeerClient::new(Duration::from_millis(200)).unwrap(),
            Duration::from_millis(2500),
        );
        let sync = StepSynchronizer::new(fetcher, cache.clone(), Arc::new(Drift::new(0.0)));

        let inputs = [
            local(ChunkRel::ORIGIN, own),
            StepInput {
                dp: ChunkRel::XM,
                data: ChunkDataLocator::Remote {
                    peer,
                    cache_key: CacheKey::new(),
                },
            },
        ];

        let started = Instant::now();
        let err = sync.step(&inputs).await.unwrap_err();
        assert!(matches!(
            err,
            StepError::FetchFailed(FetchFailed { failed: 1, total: 2 })
        ));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(cache.entry_count(), Some(1));
    }

    #[tokio::test]
    async fn step_merges_steps_and_distributes() {
        let cache = ChunkCache::in_memory(16);
        let archive = SnapshotArchive::in_memory();
        let drift = Arc::new(Drift::new(0.5));
        let sync = synchronizer(&cache, &archive, drift.clone());

        // Own grain at 0.7 escapes east; the west neighbor hands over a grain at 0.1.
        let own = cache.put(ChunkState::self_only(vec![wire(1, 0.7)])).await.unwrap();
        let west = cache
            .put(ChunkState {
                shards: vec![
                    ChunkShard {
                        dp: ChunkRel::ORIGIN,
                        grains: vec![wire(2, 0.5)],
                    },
                    ChunkShard {
                        dp: ChunkRel::XP,
                        grains: vec![wire(3, 0.1)],
                    },
                ],
            })
            .await
            .unwrap();

        let key = sync
            .step(&[local(ChunkRel::ORIGIN, own), local(ChunkRel::XM, west)])
            .await
            .unwrap();
        let result = cache.get(key).await.unwrap().unwrap();

        let own_shard = result.shard(ChunkRel::ORIGIN).unwrap();
        assert_eq!(own_shard.grains.len(), 1);
        assert_eq!(own_shard.grains[0].id, GrainId(3));
        assert!((own_shard.grains[0].pos.x - 0.6).abs() < 1e-5);

        let east = result.shard(ChunkRel::XP).unwrap();
        assert_eq!(east.grains[0].id, GrainId(1));
        assert!((east.grains[0].pos.x - 0.2).abs() < 1e-5);

        assert_eq!(
            *drift.seen_wall.lock().unwrap(),
            Some(ChunkWall {
                xm: false,
                xp: true,
                ym: true,
                yp: true,
            })
        );
    }

    #[tokio::test]
    async fn durable_input_becomes_a_self_shard() {
        let cache = ChunkCache::in_memory(16);
        let archive = SnapshotArchive::in_memory();
        let sync = synchronizer(&cache, &archive, Arc::new(Drift::new(0.0)));

        let grain = biosphere_types::codec::decode_grain(wire(5, 0.4));
        let snapshot = archive.save(&ChunkId::from("1-0:0"), 40, &[grain]).await.unwrap();

        let key = sync
            .step(&[StepInput {
                dp: ChunkRel::ORIGIN,
                data: ChunkDataLocator::Durable(snapshot),
            }])
            .await
            .unwrap();
        let result = cache.get(key).await.unwrap().unwrap();
        assert_eq!(result.shards.len(), 1);
        assert_eq!(result.shards[0].grains[0].id, GrainId(5));
    }
}

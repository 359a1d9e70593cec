//! Step input fetching: one strategy per locator, fanned out concurrently.

use std::collections::BTreeMap;
use std::time::Duration;

use biosphere_db::{ChunkCache, DbError, SnapshotArchive};
use biosphere_types::codec::encode_grains;
use biosphere_types::{CacheKey, ChunkDataLocator, ChunkRel, ChunkState, SnapshotKey, StepInput};
use futures::future::join_all;
use tracing::{error, warn};

use crate::peer::PeerClient;

/// Why a single step input could not be obtained.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The key is not (or no longer) in this server's cache.
    #[error("cache key {0} not found locally")]
    LocalMissing(CacheKey),

    /// The peer answered but does not hold the key.
    #[error("peer {peer} does not hold cache key {cache_key}")]
    RemoteMissing {
        /// Peer address.
        peer: String,
        /// The requested key.
        cache_key: CacheKey,
    },

    /// The peer request failed or timed out.
    #[error("request to peer {peer} failed: {source}")]
    Peer {
        /// Peer address.
        peer: String,
        /// The underlying HTTP error.
        source: reqwest::Error,
    },

    /// The durable snapshot fetch exceeded its deadline.
    #[error("snapshot {key} fetch timed out after {timeout:?}")]
    SnapshotTimeout {
        /// The requested snapshot.
        key: SnapshotKey,
        /// The deadline that elapsed.
        timeout: Duration,
    },

    /// The cache or archive failed, or the snapshot blob was corrupt.
    #[error("storage error: {0}")]
    Storage(#[from] DbError),
}

/// Aggregate result of a fan-out where at least one input failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{failed} of {total} step inputs could not be fetched")]
pub struct FetchFailed {
    /// Number of inputs that failed.
    pub failed: usize,
    /// Number of inputs requested.
    pub total: usize,
}

/// Resolves step input locators against the cache, peers, and the archive.
#[derive(Clone)]
pub struct InputFetcher {
    cache: ChunkCache,
    archive: SnapshotArchive,
    peers: PeerClient,
    snapshot_timeout: Duration,
}

impl InputFetcher {
    /// A fetcher over the given backends.
    ///
    /// Remote fetches are bounded by the deadline configured on `peers`;
    /// durable fetches by `snapshot_timeout`.
    pub const fn new(
        cache: ChunkCache,
        archive: SnapshotArchive,
        peers: PeerClient,
        snapshot_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            archive,
            peers,
            snapshot_timeout,
        }
    }

    /// Fetch one input's prior-tick state.
    ///
    /// A durable snapshot only carries the chunk's own grains, so it comes
    /// back as a single self shard with no escapees.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] describing why the input is unavailable.
    pub async fn fetch(&self, locator: &ChunkDataLocator) -> Result<ChunkState, FetchError> {
        match locator {
            ChunkDataLocator::Local(key) => self
                .cache
                .get(*key)
                .await?
                .ok_or(FetchError::LocalMissing(*key)),
            ChunkDataLocator::Remote { peer, cache_key } => {
                let response = self
                    .peers
                    .get_chunk(peer, *cache_key)
                    .await
                    .map_err(|source| FetchError::Peer {
                        peer: peer.clone(),
                        source,
                    })?;
                response
                    .content
                    .filter(|_| response.success)
                    .ok_or_else(|| FetchError::RemoteMissing {
                        peer: peer.clone(),
                        cache_key: *cache_key,
                    })
            }
            ChunkDataLocator::Durable(key) => {
                let grains = tokio::time::timeout(self.snapshot_timeout, self.archive.fetch_by_key(*key))
                    .await
                    .map_err(|_elapsed| FetchError::SnapshotTimeout {
                        key: *key,
                        timeout: self.snapshot_timeout,
                    })??;
                Ok(ChunkState::self_only(encode_grains(&grains)))
            }
        }
    }

    /// Fetch every input concurrently and wait for all of them.
    ///
    /// Succeeds only if every fetch succeeds; there is no partial result
    /// and no retry.
    ///
    /// # Errors
    ///
    /// Returns [`FetchFailed`] if any input failed.
    pub async fn fetch_all(
        &self,
        inputs: &[StepInput],
    ) -> Result<BTreeMap<ChunkRel, ChunkState>, FetchFailed> {
        let results = join_all(
            inputs
                .iter()
                .map(|input| async move { (input.dp, self.fetch(&input.data).await) }),
        )
        .await;

        let total = results.len();
        let mut failed: usize = 0;
        let mut states = BTreeMap::new();
        for (dp, result) in results {
            match result {
                Ok(state) => {
                    states.insert(dp, state);
                }
                Err(e) => {
                    warn!(%dp, error = %e, "Step input fetch failed");
                    failed = failed.saturating_add(1);
                }
            }
        }

        if failed > 0 {
            error!(failed, total, "Aborting step, not every input could be fetched");
            return Err(FetchFailed { failed, total });
        }
        Ok(states)
    }
}

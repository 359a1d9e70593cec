//! Request and response payloads of the chunk service.
//!
//! | Operation | Request | Response |
//! |-----------|---------|----------|
//! | Spawn | [`SpawnChunkRequest`] | [`SpawnChunkResponse`] |
//! | Step | [`StepChunkRequest`] | [`StepChunkResponse`] |
//! | Get chunk (peer cache fetch) | cache key in path | [`GetChunkResponse`] |
//! | Status | -- | [`StatusResponse`] |
//! | Summary | -- | [`ChunkSummaryResponse`] |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::chunk::{ChunkState, ChunkTopology};
use crate::geometry::ChunkRel;
use crate::ids::{CacheKey, ChunkId, SnapshotKey};

/// Start a long-running streaming worker for one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SpawnChunkRequest {
    /// Chunk id and neighbor offsets.
    pub topology: ChunkTopology,
    /// Resume from the snapshot at exactly this tick when non-zero.
    #[serde(default)]
    pub start_tick: u64,
    /// Resume from the snapshot at `start_tick` even when it is zero.
    #[serde(default)]
    pub init_from_snapshot: bool,
    /// Number of soil grains to source into a fresh chunk.
    #[serde(default)]
    pub num_soil: u32,
    /// Number of water grains to source into a fresh chunk.
    #[serde(default)]
    pub num_water: u32,
    /// Number of cell grains to source into a fresh chunk (server default when absent).
    #[serde(default)]
    pub num_cells: Option<u32>,
    /// Persist every N ticks; 0 disables, absent uses the server default.
    #[serde(default)]
    pub snapshot_interval: Option<u64>,
}

impl SpawnChunkRequest {
    /// Whether the chunk must be loaded from a durable snapshot.
    pub const fn resumes(&self) -> bool {
        self.start_tick > 0 || self.init_from_snapshot
    }
}

/// Acknowledgment of a spawn; failures after this point surface in logs only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SpawnChunkResponse {
    /// Always `true` once the request has been handed to a worker task.
    pub accepted: bool,
    /// The chunk the worker was started for.
    pub chunk_id: ChunkId,
}

/// Where a step input's prior-tick state can be obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ChunkDataLocator {
    /// A key in this server's own cache.
    Local(CacheKey),
    /// A key in a peer chunk server's cache.
    Remote {
        /// Peer address (`host:port`).
        peer: String,
        /// Key in the peer's cache.
        cache_key: CacheKey,
    },
    /// A durable snapshot record.
    Durable(SnapshotKey),
}

/// One relative input of a step call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StepInput {
    /// Offset of the input chunk relative to the chunk being stepped.
    pub dp: ChunkRel,
    /// How to obtain its prior-tick state.
    pub data: ChunkDataLocator,
}

/// Compute one tick of one chunk from 1 to 9 relative inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StepChunkRequest {
    /// The relative inputs.
    pub inputs: Vec<StepInput>,
}

/// Result of a step call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StepChunkResponse {
    /// Whether the tick was computed; `false` means retry or escalate.
    pub success: bool,
    /// Key of the computed post-tick state on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<CacheKey>,
}

impl StepChunkResponse {
    /// A successful step producing `key`.
    pub const fn succeeded(key: CacheKey) -> Self {
        Self {
            success: true,
            cache_key: Some(key),
        }
    }

    /// A failed step.
    pub const fn failed() -> Self {
        Self {
            success: false,
            cache_key: None,
        }
    }
}

/// Result of fetching a cached chunk state by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct GetChunkResponse {
    /// Whether the key was present.
    pub success: bool,
    /// The cached state when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ChunkState>,
}

/// Liveness report consumed by the fleet controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StatusResponse {
    /// Always `true` when the server answers.
    pub alive: bool,
    /// Number of streaming chunk workers hosted by this process.
    pub hosted_chunks: usize,
    /// Number of step results currently held in the cache, when the cache
    /// backend can count them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_states: Option<usize>,
}

/// One hosted chunk worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ChunkSummary {
    /// The chunk id.
    pub chunk_id: ChunkId,
    /// The worker's current tick.
    pub tick: u64,
    /// When the worker registered.
    pub started_at: DateTime<Utc>,
}

/// Which chunk ids this process currently hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ChunkSummaryResponse {
    /// Hosted chunk workers, ordered by chunk id.
    pub chunks: Vec<ChunkSummary>,
}

//! Shards, chunk states, snapshots, and topology descriptors.
//!
//! A [`ChunkState`] is the unit of exchange for both synchronization
//! strategies: the chunk's own grains at offset `(0, 0)` plus one
//! [`ChunkShard`] per direction grains escaped toward.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::geometry::ChunkRel;
use crate::grain::WireGrain;
use crate::ids::ChunkId;

/// Grains associated with one relative offset of an exported chunk state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ChunkShard {
    /// Offset of the frame the grains are expressed in, relative to the
    /// exporting chunk.
    pub dp: ChunkRel,
    /// Grains in that frame.
    pub grains: Vec<WireGrain>,
}

/// A full exported chunk state for one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ChunkState {
    /// Self shard plus per-direction escape shards.
    pub shards: Vec<ChunkShard>,
}

impl ChunkState {
    /// A state consisting of a single self shard and no escapees.
    ///
    /// This is all that can be reconstructed from a plain snapshot.
    pub fn self_only(grains: Vec<WireGrain>) -> Self {
        Self {
            shards: vec![ChunkShard {
                dp: ChunkRel::ORIGIN,
                grains,
            }],
        }
    }

    /// Total number of grains across all shards.
    pub fn grain_count(&self) -> usize {
        self.shards.iter().map(|s| s.grains.len()).sum()
    }

    /// The shard at `dp`, if present.
    pub fn shard(&self, dp: ChunkRel) -> Option<&ChunkShard> {
        self.shards.iter().find(|s| s.dp == dp)
    }
}

/// Serialized grain set stored in a durable snapshot record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ChunkSnapshot {
    /// Every grain owned by the chunk at the snapshot tick.
    pub grains: Vec<WireGrain>,
}

/// One declared neighbor of a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct NeighborEntry {
    /// Offset along x, in `{-1, 0, 1}`.
    pub dx: i32,
    /// Offset along y, in `{-1, 0, 1}`.
    pub dy: i32,
    /// The neighbor's chunk id.
    pub chunk_id: ChunkId,
}

impl NeighborEntry {
    /// The entry's offset.
    pub const fn rel(&self) -> ChunkRel {
        ChunkRel::new(self.dx, self.dy)
    }
}

/// A chunk id plus its declared neighbor list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ChunkTopology {
    /// The chunk being described.
    pub chunk_id: ChunkId,
    /// Declared neighbors; missing cardinal offsets are walls.
    #[serde(default)]
    pub neighbors: Vec<NeighborEntry>,
}

//! Topology and wall resolution.
//!
//! Turns a chunk's declared neighbor list into two lookup tables
//! (offset -> chunk id, chunk id -> offset) and a [`ChunkWall`] mask. A
//! cardinal direction is walled iff no neighbor entry has that exact unit
//! offset. Malformed neighbor lists are rejected here, at build time, so
//! the tick loop never has to deal with them.

use std::collections::BTreeMap;

use biosphere_types::{ChunkId, ChunkRel, ChunkTopology, ChunkWall, NeighborEntry};

/// Configuration errors in a declared topology.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    /// A neighbor offset lies outside `{-1, 0, 1}^2`.
    #[error("chunk {chunk}: neighbor {neighbor} declared at out-of-range offset {rel}")]
    OffsetOutOfRange {
        /// The chunk being resolved.
        chunk: ChunkId,
        /// The offending neighbor.
        neighbor: ChunkId,
        /// The declared offset.
        rel: ChunkRel,
    },

    /// A neighbor was declared at `(0, 0)`, which is the chunk itself.
    #[error("chunk {chunk}: neighbor {neighbor} declared at the self offset")]
    SelfOffset {
        /// The chunk being resolved.
        chunk: ChunkId,
        /// The offending neighbor.
        neighbor: ChunkId,
    },

    /// Two neighbors were declared at the same offset.
    #[error("chunk {chunk}: offset {rel} declared more than once")]
    DuplicateOffset {
        /// The chunk being resolved.
        chunk: ChunkId,
        /// The duplicated offset.
        rel: ChunkRel,
    },

    /// The same neighbor id appears at two offsets, so id -> offset is ambiguous.
    #[error("chunk {chunk}: neighbor {neighbor} declared at more than one offset")]
    DuplicateNeighbor {
        /// The chunk being resolved.
        chunk: ChunkId,
        /// The duplicated neighbor.
        neighbor: ChunkId,
    },
}

/// A validated topology with its lookup tables and wall mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTopology {
    chunk_id: ChunkId,
    rel_to_id: BTreeMap<ChunkRel, ChunkId>,
    id_to_rel: BTreeMap<ChunkId, ChunkRel>,
    wall: ChunkWall,
}

impl ResolvedTopology {
    /// Validate a declared topology and build its lookup tables.
    ///
    /// # Errors
    ///
    /// Returns a [`TopologyError`] for out-of-range, self, or duplicate
    /// offsets and for a neighbor id declared at more than one offset.
    pub fn resolve(topology: &ChunkTopology) -> Result<Self, TopologyError> {
        let chunk = &topology.chunk_id;
        let mut rel_to_id = BTreeMap::new();
        let mut id_to_rel = BTreeMap::new();

        for NeighborEntry { dx, dy, chunk_id } in &topology.neighbors {
            let rel = ChunkRel::new(*dx, *dy);
            if !rel.within_neighborhood() {
                return Err(TopologyError::OffsetOutOfRange {
                    chunk: chunk.clone(),
                    neighbor: chunk_id.clone(),
                    rel,
                });
            }
            if rel.is_origin() {
                return Err(TopologyError::SelfOffset {
                    chunk: chunk.clone(),
                    neighbor: chunk_id.clone(),
                });
            }
            if rel_to_id.insert(rel, chunk_id.clone()).is_some() {
                return Err(TopologyError::DuplicateOffset {
                    chunk: chunk.clone(),
                    rel,
                });
            }
            if id_to_rel.insert(chunk_id.clone(), rel).is_some() {
                return Err(TopologyError::DuplicateNeighbor {
                    chunk: chunk.clone(),
                    neighbor: chunk_id.clone(),
                });
            }
        }

        let wall = ChunkWall {
            xm: !rel_to_id.contains_key(&ChunkRel::XM),
            xp: !rel_to_id.contains_key(&ChunkRel::XP),
            ym: !rel_to_id.contains_key(&ChunkRel::YM),
            yp: !rel_to_id.contains_key(&ChunkRel::YP),
        };

        Ok(Self {
            chunk_id: chunk.clone(),
            rel_to_id,
            id_to_rel,
            wall,
        })
    }

    /// The chunk this topology describes.
    pub const fn chunk_id(&self) -> &ChunkId {
        &self.chunk_id
    }

    /// The wall mask handed to the physics step.
    pub const fn wall(&self) -> ChunkWall {
        self.wall
    }

    /// The neighbor at `rel`, if one was declared.
    pub fn neighbor_at(&self, rel: ChunkRel) -> Option<&ChunkId> {
        self.rel_to_id.get(&rel)
    }

    /// The offset at which `id` was declared, if it is a neighbor.
    pub fn offset_of(&self, id: &ChunkId) -> Option<ChunkRel> {
        self.id_to_rel.get(id).copied()
    }

    /// Every declared neighbor id, ordered by id.
    pub fn neighbor_ids(&self) -> impl Iterator<Item = &ChunkId> {
        self.id_to_rel.keys()
    }

    /// Number of declared neighbors.
    pub fn neighbor_count(&self) -> usize {
        self.rel_to_id.len()
    }
}

/// Format of generated chunk ids: `{biosphere}-{x}:{y}`.
pub fn chunk_id_for(biosphere_id: u64, x: u32, y: u32) -> ChunkId {
    ChunkId(format!("{biosphere_id}-{x}:{y}"))
}

/// Generate the topologies of an `nx` by `ny` biosphere laid on a cylinder.
///
/// The x axis wraps around when `nx >= 3`; with fewer columns wrapping
/// would declare the same neighbor at two offsets, so x is walled instead.
/// The y axis is always walled at both ends.
pub fn cylinder_topology(biosphere_id: u64, nx: u32, ny: u32) -> Vec<ChunkTopology> {
    let wraps = nx >= 3;
    let mut topologies = Vec::new();

    for y in 0..ny {
        for x in 0..nx {
            let mut neighbors = Vec::new();
            for dy in -1_i32..=1 {
                for dx in -1_i32..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let Some(ny_) = step_axis(y, dy, ny, false) else {
                        continue;
                    };
                    let Some(nx_) = step_axis(x, dx, nx, wraps) else {
                        continue;
                    };
                    neighbors.push(NeighborEntry {
                        dx,
                        dy,
                        chunk_id: chunk_id_for(biosphere_id, nx_, ny_),
                    });
                }
            }
            topologies.push(ChunkTopology {
                chunk_id: chunk_id_for(biosphere_id, x, y),
                neighbors,
            });
        }
    }

    topologies
}

/// Move one step along an axis of length `len`, wrapping or stopping at the edge.
fn step_axis(pos: u32, delta: i32, len: u32, wraps: bool) -> Option<u32> {
    let moved = i64::from(pos).saturating_add(i64::from(delta));
    let len = i64::from(len);
    let resolved = if wraps {
        moved.rem_euclid(len)
    } else if (0..len).contains(&moved) {
        moved
    } else {
        return None;
    };
    u32::try_from(resolved).ok()
}

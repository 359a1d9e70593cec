//! Migration engine: merging neighbor states and distributing escapees.
//!
//! Visibility is bounded to the 3x3 neighborhood. Grains whose combined
//! offset lands outside it are dropped on merge, and escapees that jump
//! more than one chunk (or claim to escape while still inside) are dropped
//! on distribute. Both drops are logged and counted; they are never
//! renormalized.

use std::collections::BTreeMap;

use biosphere_types::codec::{decode_grain, encode_grain};
use biosphere_types::{ChunkRel, ChunkShard, ChunkState, ChunkWall, Grain, WireGrain};
use tracing::warn;

/// Result of merging neighbor states into the requesting chunk's frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    /// Grains that now belong to the requesting chunk (combined offset `(0, 0)`).
    pub self_grains: Vec<Grain>,
    /// Read-only grains in the surrounding eight chunks.
    pub environment: Vec<Grain>,
    /// Grains dropped because their combined offset left the neighborhood.
    pub dropped: usize,
}

/// Result of binning escaped grains into per-offset shards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Distribution {
    /// One shard per destination offset, ordered by offset.
    pub shards: Vec<ChunkShard>,
    /// Grains dropped as zero-offset or multi-chunk escapes.
    pub dropped: usize,
}

/// Translate grains from a frame at `rel` into the local frame.
pub fn translate(grains: &mut [Grain], rel: ChunkRel) {
    let delta = rel.as_vec3();
    for grain in grains {
        grain.position = grain.position + delta;
    }
}

/// Merge chunk states fetched at relative offsets into self and environment grains.
///
/// Each shard's grains are translated by the fetch offset plus the shard's
/// own offset. A combined offset of `(0, 0)` goes to self, any other offset
/// inside the 3x3 neighborhood goes to the environment, and everything else
/// is dropped.
pub fn merge_and_partition(states: BTreeMap<ChunkRel, ChunkState>) -> Partition {
    let mut partition = Partition::default();

    for (fetch_rel, state) in states {
        for shard in state.shards {
            let combined = fetch_rel.offset_by(shard.dp);
            if !combined.within_neighborhood() {
                partition.dropped = partition.dropped.saturating_add(shard.grains.len());
                continue;
            }

            let mut grains: Vec<Grain> = shard.grains.into_iter().map(decode_grain).collect();
            translate(&mut grains, combined);

            if combined.is_origin() {
                partition.self_grains.extend(grains);
            } else {
                partition.environment.extend(grains);
            }
        }
    }

    partition
}

/// Bin escaped grains into per-destination shards.
///
/// The destination offset is the floor of the grain's `x` and `y`; that
/// offset is subtracted from the position so the receiving chunk sees a
/// `[0, 1)`-normalized coordinate.
pub fn distribute(escaped: Vec<Grain>) -> Distribution {
    let mut bins: BTreeMap<ChunkRel, Vec<WireGrain>> = BTreeMap::new();
    for mut grain in escaped {
        let dp = containing_offset(&grain);
        grain.position = grain.position - dp.as_vec3();
        bins.entry(dp).or_default().push(encode_grain(&grain));
    }

    let mut distribution = Distribution::default();
    for (dp, grains) in bins {
        if dp.is_origin() || !dp.within_neighborhood() {
            warn!(count = grains.len(), %dp, "Outgoing grains landed in an invalid offset, dropping");
            distribution.dropped = distribution.dropped.saturating_add(grains.len());
            continue;
        }
        distribution.shards.push(ChunkShard { dp, grains });
    }
    distribution
}

/// Wall mask for a step whose inputs were supplied at `offsets`.
///
/// A cardinal direction is walled iff no input was supplied there.
pub fn wall_from_offsets(offsets: impl IntoIterator<Item = ChunkRel>) -> ChunkWall {
    let mut wall = ChunkWall::CLOSED;
    for rel in offsets {
        match rel {
            ChunkRel::XM => wall.xm = false,
            ChunkRel::XP => wall.xp = false,
            ChunkRel::YM => wall.ym = false,
            ChunkRel::YP => wall.yp = false,
            _ => {}
        }
    }
    wall
}

/// One-line summary of a chunk state: `(dx,dy):Ngs + ...`.
pub fn format_chunk_state(state: &ChunkState) -> String {
    state
        .shards
        .iter()
        .map(|s| format!("{}:{}gs", s.dp, s.grains.len()))
        .collect::<Vec<_>>()
        .join(" + ")
}

/// Signed integer floor of the grain's `x`/`y`.
///
/// Non-finite positions saturate, which lands them outside the
/// neighborhood (or at the origin for NaN) so they are dropped.
#[allow(clippy::cast_possible_truncation)]
fn containing_offset(grain: &Grain) -> ChunkRel {
    ChunkRel::new(
        grain.position.x.floor() as i32,
        grain.position.y.floor() as i32,
    )
}

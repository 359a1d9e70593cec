//! Spatial primitives shared by every chunk.
//!
//! Grain positions are expressed in the owning chunk's local frame, where
//! `x` and `y` nominally lie in `[0, 1)` and `z` is unconstrained. A grain
//! that leaves the unit cell encodes the crossing direction in the integer
//! part of its `x`/`y` components, which is what [`ChunkRel`] captures.

use core::ops::{Add, Sub};

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A 3-component float vector used for grain positions and velocities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Vec3f {
    /// X component (chunk-local, `[0, 1)` when inside the chunk).
    pub x: f32,
    /// Y component (chunk-local, `[0, 1)` when inside the chunk).
    pub y: f32,
    /// Z component (height, unconstrained).
    pub z: f32,
}

impl Vec3f {
    /// Construct a vector from its components.
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Multiply every component by `k`.
    #[must_use]
    pub fn scaled(self, k: f32) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }
}

impl Add for Vec3f {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3f {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// Offset of a chunk relative to another chunk, in whole chunk units.
///
/// The 3x3 neighborhood of a chunk is every offset with both components in
/// `{-1, 0, 1}`; `(0, 0)` is the chunk itself.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export, export_to = "bindings/")]
pub struct ChunkRel {
    /// Offset along x.
    pub dx: i32,
    /// Offset along y.
    pub dy: i32,
}

impl ChunkRel {
    /// The chunk itself.
    pub const ORIGIN: Self = Self::new(0, 0);
    /// Neighbor toward negative x.
    pub const XM: Self = Self::new(-1, 0);
    /// Neighbor toward positive x.
    pub const XP: Self = Self::new(1, 0);
    /// Neighbor toward negative y.
    pub const YM: Self = Self::new(0, -1);
    /// Neighbor toward positive y.
    pub const YP: Self = Self::new(0, 1);

    /// Construct an offset.
    pub const fn new(dx: i32, dy: i32) -> Self {
        Self { dx, dy }
    }

    /// Whether this is the `(0, 0)` offset.
    pub const fn is_origin(self) -> bool {
        self.dx == 0 && self.dy == 0
    }

    /// Whether both components lie in `{-1, 0, 1}`.
    pub const fn within_neighborhood(self) -> bool {
        self.dx.unsigned_abs() <= 1 && self.dy.unsigned_abs() <= 1
    }

    /// Whether this offset names one of the eight surrounding chunks.
    pub const fn is_neighbor(self) -> bool {
        self.within_neighborhood() && !self.is_origin()
    }

    /// Compose two offsets (e.g. a fetch offset and a shard's own offset).
    #[must_use]
    pub const fn offset_by(self, other: Self) -> Self {
        Self::new(self.dx.saturating_add(other.dx), self.dy.saturating_add(other.dy))
    }

    /// The offset as a positional delta with `z = 0`.
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_vec3(self) -> Vec3f {
        Vec3f::new(self.dx as f32, self.dy as f32, 0.0)
    }
}

impl core::fmt::Display for ChunkRel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({},{})", self.dx, self.dy)
    }
}

/// Closed boundaries of a chunk, one flag per cardinal direction.
///
/// `true` means there is no neighbor on that side and the physics step
/// must treat the edge as a wall.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ChunkWall {
    /// Wall on the negative-x side.
    pub xm: bool,
    /// Wall on the positive-x side.
    pub xp: bool,
    /// Wall on the negative-y side.
    pub ym: bool,
    /// Wall on the positive-y side.
    pub yp: bool,
}

impl ChunkWall {
    /// A chunk with no neighbors at all.
    pub const CLOSED: Self = Self {
        xm: true,
        xp: true,
        ym: true,
        yp: true,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighborhood_membership() {
        assert!(ChunkRel::new(1, -1).is_neighbor());
        assert!(!ChunkRel::ORIGIN.is_neighbor());
        assert!(ChunkRel::ORIGIN.within_neighborhood());
        assert!(!ChunkRel::new(2, 0).within_neighborhood());
        assert!(!ChunkRel::new(0, -2).is_neighbor());
    }

    #[test]
    fn extreme_offsets_are_outside_the_neighborhood() {
        assert!(!ChunkRel::new(i32::MIN, 0).within_neighborhood());
        assert!(!ChunkRel::new(0, i32::MIN).is_neighbor());
        assert!(!ChunkRel::new(i32::MAX, i32::MIN).within_neighborhood());
    }

    #[test]
    fn offsets_compose() {
        let combined = ChunkRel::XP.offset_by(ChunkRel::new(1, 1));
        assert_eq!(combined, ChunkRel::new(2, 1));
        assert_eq!(ChunkRel::XM.offset_by(ChunkRel::XP), ChunkRel::ORIGIN);
    }

    #[test]
    fn offsets_order_row_major_by_dx_first() {
        let mut rels = vec![ChunkRel::XP, ChunkRel::XM, ChunkRel::ORIGIN, ChunkRel::YM];
        rels.sort();
        assert_eq!(rels, vec![ChunkRel::XM, ChunkRel::YM, ChunkRel::ORIGIN, ChunkRel::XP]);
    }
}

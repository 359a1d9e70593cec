//! Grain representations.
//!
//! [`WireGrain`] is what travels between chunk servers and what is written
//! into snapshot blobs. [`Grain`] is the in-memory form the physics step
//! and the migration engine operate on. Conversion lives in
//! [`crate::codec`].

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::geometry::Vec3f;
use crate::ids::GrainId;

/// What a grain is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum GrainKind {
    /// Inert soil particle.
    Soil,
    /// Water particle.
    Water,
    /// Living cell; the only kind that carries a payload.
    Cell,
}

/// Serialized grain as exchanged between chunks and stored in snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct WireGrain {
    /// Grain identity.
    pub id: GrainId,
    /// Position in the frame of the chunk the grain is addressed to.
    pub pos: Vec3f,
    /// Velocity.
    pub vel: Vec3f,
    /// Grain kind.
    pub kind: GrainKind,
    /// Opaque cell payload (cells only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_prop: Option<serde_json::Value>,
}

/// In-memory grain owned by exactly one chunk at a time.
#[derive(Debug, Clone, PartialEq)]
pub struct Grain {
    /// Grain identity.
    pub id: GrainId,
    /// Chunk-local position.
    pub position: Vec3f,
    /// Velocity.
    pub velocity: Vec3f,
    /// Grain kind.
    pub kind: GrainKind,
    /// Opaque cell payload, never inspected outside the physics step.
    pub cell_prop: Option<serde_json::Value>,
}

impl Grain {
    /// Whether the grain's `x`/`y` position lies inside the unit cell.
    pub fn is_inside_unit_cell(&self) -> bool {
        (0.0..1.0).contains(&self.position.x) && (0.0..1.0).contains(&self.position.y)
    }
}

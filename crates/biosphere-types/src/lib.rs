//! Shared type definitions for the Biosphere chunk servers.
//!
//! This crate is the single source of truth for everything that crosses a
//! process or storage boundary: grains, shards, chunk states, topology
//! descriptors, and the request/response payloads of the chunk service.
//! Wire types flow downstream to `TypeScript` via `ts-rs` for the debug
//! client.
//!
//! # Modules
//!
//! - [`ids`] -- Identifier newtypes (chunk, grain, cache key, snapshot key)
//! - [`geometry`] -- Vectors, relative chunk offsets, and wall masks
//! - [`grain`] -- Wire and in-memory grain representations
//! - [`chunk`] -- Shards, chunk states, snapshots, and topology descriptors
//! - [`api`] -- Chunk service request/response payloads
//! - [`codec`] -- Conversion between wire and in-memory grains, snapshot blobs

pub mod api;
pub mod chunk;
pub mod codec;
pub mod geometry;
pub mod grain;
pub mod ids;

// Re-export all public types at crate root for convenience.
pub use api::{
    ChunkDataLocator, ChunkSummary, ChunkSummaryResponse, GetChunkResponse, SpawnChunkRequest,
    SpawnChunkResponse, StatusResponse, StepChunkRequest, StepChunkResponse, StepInput,
};
pub use chunk::{ChunkShard, ChunkSnapshot, ChunkState, ChunkTopology, NeighborEntry};
pub use codec::CodecError;
pub use geometry::{ChunkRel, ChunkWall, Vec3f};
pub use grain::{Grain, GrainKind, WireGrain};
pub use ids::{CacheKey, ChunkId, GrainId, SnapshotKey};

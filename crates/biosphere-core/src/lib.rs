//! Spatial bookkeeping and the per-chunk tick for Biosphere.
//!
//! Everything in this crate is synchronous and free of I/O. The
//! synchronizers in `biosphere-sync` call into it once per tick:
//!
//! ```text
//! neighbor states --> merge_and_partition --> (self, environment)
//!                                                   |
//!                        GrainChunk::step(Integrator, environment, wall)
//!                                                   |
//!                        escaped grains --> distribute --> escape shards
//! ```
//!
//! # Modules
//!
//! - [`config`] -- Chunk server configuration loaded from `biosphere.yaml`.
//! - [`topology`] -- Neighbor lookup tables and wall masks.
//! - [`migration`] -- Merge of neighbor states and distribution of escapees.
//! - [`physics`] -- The [`Integrator`] seam and a reference ballistic integrator.
//! - [`chunk`] -- [`GrainChunk`], particle sources, and the tick counter.
//!
//! [`Integrator`]: physics::Integrator
//! [`GrainChunk`]: chunk::GrainChunk

pub mod chunk;
pub mod config;
pub mod migration;
pub mod physics;
pub mod topology;

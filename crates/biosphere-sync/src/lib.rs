//! Chunk synchronization for Biosphere.
//!
//! Two execution models share the migration engine in `biosphere-core`:
//!
//! - **Streaming**: one long-running worker per chunk, exchanging
//!   [`NeighborExport`]s with its neighbors through an in-process
//!   [`ChunkRouter`] and snapshotting every N ticks.
//! - **Step**: stateless, request-driven ticks. Each call fetches 1 to 9
//!   relative inputs (local cache, peer cache, or durable snapshot), steps
//!   once, and caches the result under a fresh key.
//!
//! [`ChunkService`] bundles both behind the operations the HTTP API exposes.
//!
//! # Modules
//!
//! - [`registry`] -- At most one worker per chunk id, with stop handles.
//! - [`router`] -- Per-chunk mailboxes and the quit-or-import wait point.
//! - [`stream`] -- The streaming tick loop.
//! - [`fetch`] -- Step input locators and the concurrent fan-out.
//! - [`peer`] -- HTTP client for peer cache fetches.
//! - [`step`] -- The step synchronizer.
//! - [`service`] -- The chunk server facade.
//!
//! [`NeighborExport`]: router::NeighborExport
//! [`ChunkRouter`]: router::ChunkRouter
//! [`ChunkService`]: service::ChunkService

pub mod fetch;
pub mod peer;
pub mod registry;
pub mod router;
pub mod service;
pub mod step;
pub mod stream;

pub use service::ChunkService;
pub use step::StepError;

//! Storage layer for the Biosphere chunk servers.
//!
//! `PostgreSQL` holds durable chunk snapshots used for crash recovery and
//! durable step inputs. `Dragonfly` holds the short-lived step results
//! exchanged between chunk servers. Both have in-memory stand-ins for
//! single-process deployments and tests.
//!
//! # Architecture
//!
//! ```text
//! Streaming worker --save every N ticks--> SnapshotArchive --> PostgreSQL | Memory
//!                  <--resume at tick-----/
//!
//! Step call --put result--> ChunkCache --> Dragonfly (TTL) | Memory (bounded)
//!           <--get input---/
//! ```
//!
//! # Modules
//!
//! - [`archive`] -- Snapshot save / exact-tick resume / keyed fetch
//! - [`cache`] -- Step result cache
//! - [`snapshot_store`] -- SQL operations on `chunk_snapshots`
//! - [`postgres`] -- `PostgreSQL` connection pool and configuration
//! - [`dragonfly`] -- `Dragonfly` (Redis-compatible) JSON operations
//! - [`memory`] -- In-process backends
//! - [`error`] -- Shared error types

pub mod archive;
pub mod cache;
pub mod dragonfly;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod snapshot_store;

// Re-export primary types for convenience.
pub use archive::{ResumedSnapshot, SnapshotArchive};
pub use cache::ChunkCache;
pub use dragonfly::DragonflyPool;
pub use error::DbError;
pub use memory::{MemoryCache, MemorySnapshotStore};
pub use postgres::{ArchivePoolSettings, PostgresPool};
pub use snapshot_store::{ChunkSnapshotRow, SnapshotStore};

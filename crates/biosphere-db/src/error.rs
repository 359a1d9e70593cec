//! Error types for the storage layer.
//!
//! All errors are propagated via [`DbError`] which wraps the underlying
//! [`sqlx`], [`fred`], and codec errors with context about which record
//! was involved.

use biosphere_types::{ChunkId, CodecError, SnapshotKey};

/// Errors that can occur in the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A `Dragonfly`/Redis operation failed.
    #[error("Dragonfly error: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// A cached chunk state could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A snapshot blob could not be encoded or decoded.
    #[error("Snapshot codec error: {0}")]
    Codec(#[from] CodecError),

    /// No snapshot exists for the chunk at exactly this tick.
    #[error("no snapshot for chunk {chunk_id} at tick {tick}")]
    SnapshotNotFound {
        /// The chunk being resumed.
        chunk_id: ChunkId,
        /// The requested tick.
        tick: u64,
    },

    /// The tick does not fit the `BIGINT` tick column.
    #[error("tick {0} exceeds the largest storable tick")]
    TickOutOfRange(u64),

    /// No snapshot record has this key.
    #[error("no snapshot with key {0}")]
    SnapshotKeyNotFound(SnapshotKey),

    /// An in-memory store's lock was poisoned by a panicking writer.
    #[error("in-memory {0} lock poisoned")]
    LockPoisoned(&'static str),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

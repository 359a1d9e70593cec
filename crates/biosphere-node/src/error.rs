//! Error types for the chunk server binary.
//!
//! [`NodeError`] wraps every failure mode of startup and serving so `main`
//! can propagate with `?`.

/// Top-level error for the chunk server binary.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: biosphere_core::config::ConfigError,
    },

    /// A storage backend could not be reached or migrated.
    #[error("storage error: {source}")]
    Storage {
        /// The underlying storage error.
        #[from]
        source: biosphere_db::DbError,
    },

    /// The peer HTTP client could not be built.
    #[error("peer client error: {source}")]
    PeerClient {
        /// The underlying HTTP client error.
        #[from]
        source: reqwest::Error,
    },

    /// The HTTP API failed to bind or serve.
    #[error("server error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: biosphere_api::ServerError,
    },
}

//! HTTP API of a Biosphere chunk server.
//!
//! Exposes the [`ChunkService`] operations over JSON:
//!
//! - **Spawn** a streaming chunk worker (fire-and-forget, `202 Accepted`)
//! - **Step** one chunk one tick from 1 to 9 relative inputs
//! - **Cache fetch** so peer servers can resolve `Remote` step inputs
//! - **Status / summary** for the external fleet controller
//! - **Stop** a hosted chunk
//!
//! [`ChunkService`]: biosphere_sync::ChunkService

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::{ServerError, start_server};
pub use state::AppState;

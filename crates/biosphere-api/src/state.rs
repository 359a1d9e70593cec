//! Shared application state for the chunk server API.

use biosphere_sync::ChunkService;

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// The chunk server's operations.
    pub service: ChunkService,
}

impl AppState {
    /// Wrap a service for the router.
    pub const fn new(service: ChunkService) -> Self {
        Self { service }
    }
}

//! Axum router construction for the chunk server API.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the complete Axum router for a chunk server.
///
/// CORS allows any origin so the debug client can poll status from a
/// browser.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Streaming workers
        .route(
            "/api/chunks",
            get(handlers::list_chunks).post(handlers::spawn_chunk),
        )
        .route("/api/chunks/{id}/stop", post(handlers::stop_chunk))
        // Step model
        .route("/api/step", post(handlers::step_chunk))
        .route("/api/cache/{key}", get(handlers::get_cached))
        // Fleet controller
        .route("/api/status", get(handlers::status))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

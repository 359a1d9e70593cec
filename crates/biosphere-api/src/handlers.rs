//! REST endpoint handlers for the chunk server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/chunks` | Spawn a streaming chunk worker |
//! | `GET` | `/api/chunks` | Hosted chunks with their ticks |
//! | `POST` | `/api/chunks/{id}/stop` | Stop a hosted chunk |
//! | `POST` | `/api/step` | Compute one tick from relative inputs |
//! | `GET` | `/api/cache/{key}` | Fetch a cached step result |
//! | `GET` | `/api/status` | Liveness and load |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use biosphere_types::{
    CacheKey, ChunkId, SpawnChunkRequest, StepChunkRequest, StepChunkResponse,
};
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// POST /api/chunks -- spawn
// ---------------------------------------------------------------------------

/// Start a streaming worker and acknowledge immediately.
///
/// Only a malformed topology is reported here. A duplicate chunk id or a
/// missing resume snapshot surfaces in the logs and in `/api/chunks`.
pub async fn spawn_chunk(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SpawnChunkRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state.service.spawn_chunk(&request)?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

// ---------------------------------------------------------------------------
// GET /api/chunks -- summary
// ---------------------------------------------------------------------------

/// List the chunks hosted by this process.
pub async fn list_chunks(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.service.summary())
}

// ---------------------------------------------------------------------------
// POST /api/chunks/{id}/stop
// ---------------------------------------------------------------------------

/// Signal a hosted chunk to exit before its next wait.
pub async fn stop_chunk(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let chunk_id = ChunkId::new(id);
    if !state.service.stop_chunk(&chunk_id) {
        return Err(ApiError::NotFound(format!("chunk {chunk_id}")));
    }
    Ok(Json(serde_json::json!({
        "stopping": true,
        "chunk_id": chunk_id,
    })))
}

// ---------------------------------------------------------------------------
// POST /api/step
// ---------------------------------------------------------------------------

/// Compute one tick and return the cache key of the result.
///
/// Malformed input lists are `400`. Any other failure is `200` with
/// `success: false`; the tick was not applied and must be retried.
pub async fn step_chunk(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StepChunkRequest>,
) -> Result<impl IntoResponse, ApiError> {
    match state.service.step_chunk(&request).await {
        Ok(key) => Ok(Json(StepChunkResponse::succeeded(key))),
        Err(e) if e.is_caller_error() => Err(ApiError::InvalidStep(e)),
        Err(e) => {
            warn!(error = %e, "Step failed");
            Ok(Json(StepChunkResponse::failed()))
        }
    }
}

// ---------------------------------------------------------------------------
// GET /api/cache/{key}
// ---------------------------------------------------------------------------

/// Return the chunk state cached under `key`, for peer servers.
pub async fn get_cached(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let key: CacheKey = key
        .parse()
        .map_err(|e| ApiError::InvalidCacheKey(format!("{key}: {e}")))?;
    Ok(Json(state.service.get_chunk(key).await?))
}

// ---------------------------------------------------------------------------
// GET /api/status
// ---------------------------------------------------------------------------

/// Report liveness and how many chunks this process hosts.
pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.service.status())
}

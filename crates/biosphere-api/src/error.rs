//! Error types for the chunk server API.
//!
//! [`ApiError`] converts into a JSON response `{error, status}`. Step
//! fetch failures are not errors at this layer: they are reported as
//! `200 {success: false}` so callers retry or escalate the tick.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use biosphere_core::topology::TopologyError;
use biosphere_db::DbError;
use biosphere_sync::StepError;

/// Errors that can occur in the API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The spawn request declared a malformed topology.
    #[error("invalid topology: {0}")]
    Topology(#[from] TopologyError),

    /// The step request was malformed.
    #[error("invalid step request: {0}")]
    InvalidStep(StepError),

    /// A path segment was not a valid cache key.
    #[error("invalid cache key: {0}")]
    InvalidCacheKey(String),

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A storage backend failed.
    #[error("storage error: {0}")]
    Storage(#[from] DbError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Topology(_) | Self::InvalidStep(_) | Self::InvalidCacheKey(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

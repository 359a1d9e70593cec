//! Integration tests for the chunk server API endpoints.
//!
//! Tests drive the Axum `Router` directly via `tower::ServiceExt` with
//! in-memory storage, so no TCP server or database is needed.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use biosphere_api::{AppState, build_router};
use biosphere_core::config::ChunkServerConfig;
use biosphere_core::physics::BallisticIntegrator;
use biosphere_db::{ChunkCache, SnapshotArchive};
use biosphere_sync::ChunkService;
use biosphere_types::{
    CacheKey, ChunkDataLocator, ChunkId, ChunkRel, ChunkState, ChunkTopology, GrainId, GrainKind,
    NeighborEntry, SpawnChunkRequest, StepChunkRequest, StepInput, Vec3f, WireGrain,
};
use serde_json::Value;
use tower::ServiceExt;

fn make_router() -> (Router, ChunkCache) {
    let cache = ChunkCache::in_memory(32);
    let service = ChunkService::new(
        &ChunkServerConfig::default(),
        SnapshotArchive::in_memory(),
        cache.clone(),
        Arc::new(BallisticIntegrator::default()),
    )
    .unwrap();
    (build_router(Arc::new(AppState::new(service))), cache)
}

fn resting_grain(id: u64) -> WireGrain {
    WireGrain {
        id: GrainId(id),
        pos: Vec3f::new(0.5, 0.5, 0.0),
        vel: Vec3f::default(),
        kind: GrainKind::Soil,
        cell_prop: None,
    }
}

fn post_json<T: serde::Serialize>(path: &str, body: &T) -> Request<Body> {
    Request::post(path)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// =========================================================================
// Status and summary
// =========================================================================

#[tokio::test]
async fn test_status_reports_alive() {
    let (router, _cache) = make_router();

    let response = router
        .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["alive"], true);
    assert_eq!(json["hosted_chunks"], 0);
    assert_eq!(json["cached_states"], 0);
}

#[tokio::test]
async fn test_list_chunks_empty() {
    let (router, _cache) = make_router();

    let response = router
        .oneshot(Request::get("/api/chunks").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["chunks"].as_array().unwrap().len(), 0);
}

// =========================================================================
// Spawn and stop
// =========================================================================

#[tokio::test]
async fn test_spawn_is_accepted() {
    let (router, _cache) = make_router();
    let request = SpawnChunkRequest {
        topology: ChunkTopology {
            chunk_id: ChunkId::from("7-0:0"),
            neighbors: Vec::new(),
        },
        start_tick: 0,
        init_from_snapshot: false,
        num_soil: 3,
        num_water: 0,
        num_cells: Some(0),
        snapshot_interval: Some(0),
    };

    let response = router
        .oneshot(post_json("/api/chunks", &request))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["accepted"], true);
    assert_eq!(json["chunk_id"], "7-0:0");
}

#[tokio::test]
async fn test_spawn_rejects_malformed_topology() {
    let (router, _cache) = make_router();
    let request = SpawnChunkRequest {
        topology: ChunkTopology {
            chunk_id: ChunkId::from("7-0:0"),
            neighbors: vec![
                NeighborEntry {
                    dx: 1,
                    dy: 0,
                    chunk_id: ChunkId::from("7-1:0"),
                },
                NeighborEntry {
                    dx: 1,
                    dy: 0,
                    chunk_id: ChunkId::from("7-2:0"),
                },
            ],
        },
        start_tick: 0,
        init_from_snapshot: false,
        num_soil: 0,
        num_water: 0,
        num_cells: None,
        snapshot_interval: None,
    };

    let response = router
        .oneshot(post_json("/api/chunks", &request))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], 400);
    assert!(json["error"].as_str().unwrap().contains("more than once"));
}

#[tokio::test]
async fn test_stop_unknown_chunk_is_not_found() {
    let (router, _cache) = make_router();

    let response = router
        .oneshot(
            Request::post("/api/chunks/9-9:9/stop")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =========================================================================
// Step and cache
// =========================================================================

#[tokio::test]
async fn test_step_without_inputs_is_bad_request() {
    let (router, _cache) = make_router();

    let response = router
        .oneshot(post_json("/api/step", &StepChunkRequest { inputs: Vec::new() }))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], 400);
}

#[tokio::test]
async fn test_step_with_unknown_key_reports_failure() {
    let (router, _cache) = make_router();
    let request = StepChunkRequest {
        inputs: vec![StepInput {
            dp: ChunkRel::ORIGIN,
            data: ChunkDataLocator::Local(CacheKey::new()),
        }],
    };

    let response = router.oneshot(post_json("/api/step", &request)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["success"], false);
    assert!(json.get("cache_key").is_none());
}

#[tokio::test]
async fn test_step_result_is_served_to_peers() {
    let (router, cache) = make_router();
    let input = cache
        .put(ChunkState::self_only(vec![resting_grain(1), resting_grain(2)]))
        .await
        .unwrap();
    let request = StepChunkRequest {
        inputs: vec![StepInput {
            dp: ChunkRel::ORIGIN,
            data: ChunkDataLocator::Local(input),
        }],
    };

    let response = router
        .clone()
        .oneshot(post_json("/api/step", &request))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["success"], true);
    let key = json["cache_key"].as_str().unwrap().to_owned();

    let response = router
        .oneshot(
            Request::get(format!("/api/cache/{key}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["success"], true);

    let state: ChunkState = serde_json::from_value(json["content"].clone()).unwrap();
    assert_eq!(state.grain_count(), 2);
    assert_eq!(state.shard(ChunkRel::ORIGIN).unwrap().grains.len(), 2);
}

#[tokio::test]
async fn test_get_cache_unknown_key() {
    let (router, _cache) = make_router();
    let path = format!("/api/cache/{}", CacheKey::new());

    let response = router
        .oneshot(Request::get(&path).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_get_cache_invalid_key() {
    let (router, _cache) = make_router();

    let response = router
        .oneshot(
            Request::get("/api/cache/not-a-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

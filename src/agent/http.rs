//! HTTP surface of a node agent
//!
//! Invoked only by the coordinator and the recovery engine: store,
//! retrieve and delete chunk blobs, answer liveness probes, report
//! stats.

use crate::agent::store::ChunkStore;
use crate::coordinator::agent_client::CHECKSUM_HEADER;
use crate::common::sha256_hex;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared agent state for HTTP handlers
#[derive(Clone)]
pub struct AgentState {
    pub store: Arc<ChunkStore>,
    pub node_id: String,
}

/// Creates the agent HTTP router
pub fn create_router(state: AgentState, max_chunk_bytes: usize) -> Router {
    Router::new()
        .route(
            "/chunks/:chunk_id",
            get(retrieve_chunk).put(store_chunk).delete(delete_chunk),
        )
        .route("/health", get(health))
        .route("/stats", get(stats))
        .layer(DefaultBodyLimit::max(max_chunk_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn store_chunk(
    State(state): State<AgentState>,
    Path(chunk_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let Some(expected) = headers
        .get(CHECKSUM_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("missing {} header", CHECKSUM_HEADER) })),
        );
    };

    match state.store.put(&chunk_id, &body, &expected) {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "stored",
                "node_id": state.node_id,
                "chunk_id": chunk_id,
                "size": body.len(),
            })),
        ),
        Err(e @ crate::Error::ChecksumMismatch { .. }) => {
            tracing::warn!("rejected chunk {}: {}", chunk_id, e);
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": e.to_string() })),
            )
        }
        Err(e) => {
            tracing::error!("store of chunk {} failed: {}", chunk_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}

async fn retrieve_chunk(
    State(state): State<AgentState>,
    Path(chunk_id): Path<String>,
) -> impl IntoResponse {
    match state.store.get(&chunk_id) {
        Ok(Some(data)) => {
            let checksum = sha256_hex(&data);
            let mut headers = HeaderMap::new();
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            );
            // Hex digests are always valid header values.
            headers.insert(CHECKSUM_HEADER, HeaderValue::from_str(&checksum).unwrap());
            (StatusCode::OK, headers, data).into_response()
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("chunk {} not found", chunk_id) })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("retrieve of chunk {} failed: {}", chunk_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn delete_chunk(
    State(state): State<AgentState>,
    Path(chunk_id): Path<String>,
) -> impl IntoResponse {
    match state.store.delete(&chunk_id) {
        Ok(existed) => (
            StatusCode::OK,
            Json(json!({ "status": "deleted", "existed": existed })),
        ),
        Err(e) => {
            tracing::error!("delete of chunk {} failed: {}", chunk_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}

async fn health(State(state): State<AgentState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "node_id": state.node_id,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn stats(State(state): State<AgentState>) -> impl IntoResponse {
    match state.store.stats() {
        Ok(stats) => (
            StatusCode::OK,
            Json(json!({
                "node_id": state.node_id,
                "chunks": stats.chunks,
                "bytes": stats.bytes,
            })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

//! HTTP API for the coordinator
//!
//! The only surface external collaborators call: file upload/download,
//! cluster status, agent registration/heartbeats, and the administrative
//! liveness overrides used for operational testing.

use crate::coordinator::server::{Coordinator, UploadRequest};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared coordinator state for HTTP handlers
#[derive(Clone)]
pub struct CoordState {
    pub coordinator: Arc<Coordinator>,
}

/// Creates the HTTP router with all public endpoints
pub fn create_router(state: CoordState, max_upload_bytes: usize) -> Router {
    Router::new()
        // File operations
        .route("/files", post(upload_file).get(list_files))
        .route("/files/:file_id", get(download_file))
        // Cluster state
        .route("/status", get(status))
        .route("/health", get(health))
        // Agent lifecycle
        .route("/nodes/register", post(register_node))
        .route("/nodes/:node_id/heartbeat", post(node_heartbeat))
        // Administrative liveness overrides
        .route("/nodes/:node_id/offline", post(node_offline))
        .route("/nodes/:node_id/online", post(node_online))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

type ApiResult<T> = std::result::Result<T, ApiError>;

struct ApiError(crate::Error);

impl From<crate::Error> for ApiError {
    fn from(e: crate::Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.to_http_status();
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct UploadParams {
    chunk_size: Option<u64>,
    replication: Option<u32>,
    strategy: Option<String>,
    name: Option<String>,
}

async fn upload_file(
    State(state): State<CoordState>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let config = state.coordinator.config();
    let strategy = params
        .strategy
        .as_deref()
        .unwrap_or(&config.strategy)
        .parse()?;

    let request = UploadRequest {
        name: params.name.unwrap_or_else(|| "unnamed".to_string()),
        chunk_size: params.chunk_size.unwrap_or(config.chunk_size),
        replication_factor: params.replication.unwrap_or(config.replication_factor),
        strategy,
    };

    let file = state.coordinator.upload(body, request).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "file_id": file.file_id,
            "name": file.name,
            "size": file.size,
            "total_chunks": file.total_chunks,
            "checksum": file.checksum,
        })),
    ))
}

async fn download_file(
    State(state): State<CoordState>,
    Path(file_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let bytes = state.coordinator.download(&file_id).await?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    ))
}

async fn list_files(State(state): State<CoordState>) -> ApiResult<impl IntoResponse> {
    let files = state.coordinator.metadata().list_files()?;
    let total = files.len();
    Ok(Json(json!({ "files": files, "total": total })))
}

async fn status(State(state): State<CoordState>) -> ApiResult<impl IntoResponse> {
    let status = state.coordinator.status()?;
    Ok(Json(status))
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
struct RegisterNodeRequest {
    node_id: String,
    address: String,
}

async fn register_node(
    State(state): State<CoordState>,
    Json(request): Json<RegisterNodeRequest>,
) -> impl IntoResponse {
    state
        .coordinator
        .registry()
        .register(&request.node_id, &request.address);
    Json(json!({ "status": "registered", "node_id": request.node_id }))
}

#[derive(Debug, Deserialize)]
struct HeartbeatRequest {
    #[serde(default)]
    used_bytes: u64,
}

async fn node_heartbeat(
    State(state): State<CoordState>,
    Path(node_id): Path<String>,
    Json(request): Json<HeartbeatRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .coordinator
        .registry()
        .record_heartbeat(&node_id, request.used_bytes)?;
    Ok(Json(json!({ "status": "ok" })))
}

async fn node_offline(
    State(state): State<CoordState>,
    Path(node_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.coordinator.node_offline(&node_id)?;
    Ok(Json(json!({ "status": "offline", "node_id": node_id })))
}

async fn node_online(
    State(state): State<CoordState>,
    Path(node_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.coordinator.node_online(&node_id)?;
    Ok(Json(json!({ "status": "online", "node_id": node_id })))
}

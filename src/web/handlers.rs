use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::error::{AppError, Result};
use crate::logs::{LogEntry, DEFAULT_RECENT_LIMIT};
use crate::pipeline::PipelineStats;
use crate::plugin::PluginInfo;
use crate::state::AppState;
use crate::stream::ClientStats;
use crate::video::codec::jpeg_for;
use crate::video::mjpeg::STREAM_CONTENT_TYPE;
use crate::video::{SourceState, SourceStats};

const LOG_SOURCE: &str = "App";

/// Unified success response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
}

impl ApiResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

// ============================================================================
// Health & Status
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct ActivePluginInfo {
    pub id: String,
    pub name: String,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    pub source: String,
    pub source_state: SourceState,
    pub source_stats: SourceStats,
    pub active_plugin: Option<ActivePluginInfo>,
    /// Version of the latest published frame, 0 before the first one
    pub frame_version: u64,
    pub pipeline: PipelineStats,
    pub viewers: usize,
    pub frames_sent: u64,
    pub clients: Vec<ClientStats>,
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let active_plugin = state.registry.active().map(|active| ActivePluginInfo {
        id: active.id().to_string(),
        name: active.name().to_string(),
    });

    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        source: state.source_name.clone(),
        source_state: state.source_state(),
        source_stats: state.source_counters.snapshot(),
        active_plugin,
        frame_version: state.slot.version(),
        pipeline: state.pipeline_counters.snapshot(),
        viewers: state.broadcaster.client_count(),
        frames_sent: state.broadcaster.frames_sent(),
        clients: state.broadcaster.clients_stat(),
    })
}

// ============================================================================
// Models
// ============================================================================

pub async fn list_models(State(state): State<Arc<AppState>>) -> Result<Json<Vec<PluginInfo>>> {
    let registry = state.registry.clone();
    let models = tokio::task::spawn_blocking(move || registry.list_available())
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Json(models))
}

#[derive(Debug, Deserialize)]
pub struct SelectModelRequest {
    /// Plugin id; null or empty switches back to video-only mode
    ///
    /// The field itself is required so a misspelled key is rejected
    /// instead of silently unloading the active plugin.
    #[serde(deserialize_with = "Option::deserialize")]
    pub model_id: Option<String>,
}

/// Swap the active plugin
///
/// Loading reads the manifest and warms the plugin up, so it runs off the
/// async workers. The previous plugin stays active when loading fails.
pub async fn select_model(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SelectModelRequest>,
) -> Result<Json<ApiResponse>> {
    let model_id = req
        .model_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());

    let Some(model_id) = model_id else {
        let previous = state.registry.unload();
        info!("Plugin unloaded (was {:?})", previous);
        return Ok(Json(ApiResponse::ok("Switched to video only mode")));
    };

    let registry = state.registry.clone();
    let id = model_id.clone();
    tokio::task::spawn_blocking(move || registry.load(&id))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(Json(ApiResponse::ok(format!(
        "Switched to model: {}",
        model_id
    ))))
}

// ============================================================================
// Logs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct LogsQuery {
    pub limit: Option<usize>,
}

pub async fn get_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogsQuery>,
) -> Json<Vec<LogEntry>> {
    let limit = query.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
    Json(state.logs.recent(limit))
}

pub async fn clear_logs(State(state): State<Arc<AppState>>) -> Json<ApiResponse> {
    state.logs.clear();
    state.logs.info(LOG_SOURCE, "Logs cleared");
    Json(ApiResponse::ok("Logs cleared"))
}

// ============================================================================
// Video
// ============================================================================

#[derive(Deserialize, Default)]
pub struct MjpegStreamQuery {
    /// Optional client ID (if not provided, a random UUID will be generated)
    pub client_id: Option<String>,
}

/// MJPEG stream endpoint
///
/// Never fails: without a published frame the viewer receives the
/// placeholder until the source comes up.
pub async fn video_feed(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MjpegStreamQuery>,
) -> impl IntoResponse {
    // Validate: non-empty, max 64 chars
    let client_id = query
        .client_id
        .filter(|id| !id.is_empty() && id.len() <= 64)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let body_stream = state.broadcaster.client_stream(client_id);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, STREAM_CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .header(header::PRAGMA, "no-cache")
        .header(header::EXPIRES, "0")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(body_stream))
        .unwrap()
}

/// Single JPEG snapshot of the latest published frame
pub async fn snapshot(State(state): State<Arc<AppState>>) -> Result<Response> {
    let published = state
        .slot
        .current()
        .ok_or_else(|| AppError::ServiceUnavailable("No frame available".to_string()))?;

    let jpeg = jpeg_for(&published.frame, state.broadcaster.config().jpeg_quality)
        .await
        .map_err(|e| AppError::VideoError(e.to_string()))?;

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "image/jpeg")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("X-Frame-Version", published.version)
        .body(Body::from(jpeg))
        .unwrap())
}

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use log::{error, info};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::clock::Clock;
use crate::constants::VIDEO_MIME_TYPE;
use crate::error::RecorderError;
use crate::export::build_session_export;
use crate::store::SegmentStore;

// State for the read-only session API
pub struct AppState {
    pub store: Arc<SegmentStore>,
    pub clock: Arc<dyn Clock>,
}

/// Build the API router
///
/// - `GET /api/sessions` - all sessions, oldest first
/// - `GET /api/sessions/{id}/export` - export document for one session
/// - `GET /api/video/{id}` - raw WebM for one video chunk
/// - `GET /api/metrics` - stored storage metrics
pub fn api_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/sessions", get(sessions_handler))
        .route("/api/sessions/{id}/export", get(export_handler))
        .route("/api/video/{id}", get(video_handler))
        .route("/api/metrics", get(metrics_handler))
        .layer(cors)
        .with_state(state)
}

/// Serve the session API until the process is stopped
pub async fn serve_sessions(
    store: Arc<SegmentStore>,
    clock: Arc<dyn Clock>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = api_router(Arc::new(AppState { store, clock }));

    let listener = tokio::net::TcpListener::bind(format!("[::]:{}", port))
        .await
        .map_err(|e| format!("Failed to bind to port {}: {}", port, e))?;
    info!("Serving session API on port {}", port);
    axum::serve(listener, app)
        .await
        .map_err(|e| format!("Server error: {}", e))?;

    Ok(())
}

fn error_response(e: RecorderError) -> Response {
    match e {
        RecorderError::NotFound { .. } => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
        e => {
            error!("API request failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn sessions_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.store.get_all_sessions().await {
        Ok(sessions) => Json(sessions).into_response(),
        Err(e) => error_response(e),
    }
}

async fn export_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let data = match state.store.export_session_data(&id).await {
        Ok(data) => data,
        Err(e) => return error_response(e),
    };

    let export = build_session_export(&data, state.clock.now_ms(), |segment| {
        format!("/api/video/{}", segment.video_chunk_id)
    });
    Json(export).into_response()
}

async fn video_handler(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.store.get_video_chunk(&id).await {
        Ok(chunk) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, VIDEO_MIME_TYPE)],
            chunk.blob,
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.store.get_storage_metrics().await {
        Ok(metrics) => Json(metrics.unwrap_or_default()).into_response(),
        Err(e) => error_response(e),
    }
}

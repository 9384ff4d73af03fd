/// Health check API routes
use crate::state::AppState;
use axum::{extract::State, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub ffmpeg_available: bool,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub message: String,
}

/// GET / - Service banner
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Loudness Equalizer API".to_string(),
    })
}

/// GET /api/health - Health check endpoint
pub async fn health(State(app_state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        ffmpeg_available: app_state.equalizer.is_available().await,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// API route modules
pub mod download;
pub mod equalize;
pub mod health;

use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

/// All application routes, without transport layers (tracing, CORS)
pub fn router(app_state: AppState, max_upload_bytes: usize) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health::health))
        .route("/equalize", post(equalize::equalize))
        .route("/download/:job_id", get(download::download_archive))
        .route("/jobs/:job_id", get(download::get_job));

    Router::new()
        .route("/", get(health::root))
        .nest("/api", api_routes)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(app_state)
}

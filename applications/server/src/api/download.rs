/// Archive download and job lookup API
use crate::{
    error::{Result, ServerError},
    services::{JobManifest, ARCHIVE_FILE_NAME},
    state::AppState,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

/// GET /api/download/:job_id
/// Stream a finished job's archive
pub async fn download_archive(
    Path(job_id): Path<String>,
    State(app_state): State<AppState>,
) -> Result<Response> {
    let archive_path = app_state.job_store.archive_path(&job_id).await?;

    let file_size = tokio::fs::metadata(&archive_path).await?.len();
    let file = File::open(&archive_path).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    tracing::debug!(job_id = %job_id, bytes = file_size, "Serving archive");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_LENGTH, file_size)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", ARCHIVE_FILE_NAME),
        )
        .body(body)
        .map_err(|e| ServerError::Internal(format!("Failed to build response: {}", e)))
}

/// GET /api/jobs/:job_id
/// Per-file summary of a finished job
pub async fn get_job(
    Path(job_id): Path<String>,
    State(app_state): State<AppState>,
) -> Result<Json<JobManifest>> {
    Ok(Json(app_state.job_store.manifest(&job_id).await?))
}

/// Equalization upload API
use crate::{
    error::{Result, ServerError},
    services::job_store::FileSummary,
    state::AppState,
};
use axum::{extract::State, Json};
use bytes::Bytes;
use http::{header, HeaderMap};
use loudeq_loudness::{BatchJob, CancellationToken, NormalizationTarget};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Serialize)]
pub struct EqualizeResponse {
    pub message: String,
    pub processed_count: usize,
    pub job_id: String,
    pub download_url: String,
    pub files: Vec<FileSummary>,
}

#[derive(Debug)]
struct Upload {
    file_name: String,
    data: Bytes,
}

#[derive(Debug, Default)]
struct UploadForm {
    files: Vec<Upload>,
    target: Option<NormalizationTarget>,
}

/// POST /api/equalize
/// Equalize uploaded files and package the results into a downloadable archive
pub async fn equalize(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<EqualizeResponse>> {
    let form = parse_upload_form(&headers, body).await?;

    if form.files.is_empty() {
        return Err(ServerError::BadRequest("No files uploaded".to_string()));
    }

    let settings = &app_state.settings;
    if let Some(rejected) = form.files.iter().find(|u| !settings.accepts(&u.file_name)) {
        return Err(ServerError::BadRequest(format!(
            "File {} is not an accepted audio file (expected {})",
            rejected.file_name,
            settings.allowed_extensions.join(", ")
        )));
    }

    // Removed, with every input and intermediate output, when the request ends
    let work_dir = tempfile::Builder::new().prefix("loudeq-").tempdir()?;
    let input_dir = work_dir.path().join("input");
    let output_dir = work_dir.path().join("output");
    tokio::fs::create_dir(&input_dir).await?;

    let mut inputs = Vec::with_capacity(form.files.len());
    let mut taken = HashSet::new();
    for upload in &form.files {
        let name = unique_name(&upload.file_name, &mut taken);
        let path = input_dir.join(&name);
        tokio::fs::write(&path, &upload.data).await?;
        inputs.push(path);
    }

    tracing::info!(files = inputs.len(), "Received equalization upload");

    let mut job = BatchJob::new(inputs, &output_dir);
    if let Some(target) = form.target {
        job = job.with_target(target);
    }
    let result = app_state
        .equalizer
        .run(&job, &CancellationToken::new())
        .await?;

    let manifest = app_state.job_store.store_job(&result).await?;
    let job_id = manifest.job_id;

    if let Err(e) = app_state.job_store.prune().await {
        tracing::warn!(error = %e, "Failed to prune old jobs");
    }

    tracing::info!(
        job_id = %job_id,
        processed = manifest.processed_count,
        "Equalization job finished"
    );

    Ok(Json(EqualizeResponse {
        message: format!(
            "Successfully processed {} files",
            manifest.processed_count
        ),
        processed_count: manifest.processed_count,
        job_id: job_id.to_string(),
        download_url: format!("/api/download/{}", job_id),
        files: manifest.files,
    }))
}

async fn parse_upload_form(headers: &HeaderMap, body: Bytes) -> Result<UploadForm> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ServerError::BadRequest("Missing Content-Type".to_string()))?;

    if !content_type.starts_with("multipart/form-data") {
        return Err(ServerError::BadRequest(
            "Expected multipart/form-data".to_string(),
        ));
    }

    let boundary = multer::parse_boundary(content_type)
        .map_err(|_| ServerError::BadRequest("Missing boundary".to_string()))?;

    let stream = futures::stream::once(async move { Ok::<_, std::io::Error>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Failed to parse multipart: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "files" | "file" => {
                let file_name = field
                    .file_name()
                    .and_then(sanitize_file_name)
                    .ok_or_else(|| {
                        ServerError::BadRequest("Uploaded file has no usable name".to_string())
                    })?;

                let data = field.bytes().await.map_err(|e| {
                    ServerError::BadRequest(format!("Failed to read {}: {}", file_name, e))
                })?;

                form.files.push(Upload { file_name, data });
            }
            "target_lufs" => {
                let text = field.text().await.map_err(|e| {
                    ServerError::BadRequest(format!("Failed to read target_lufs: {}", e))
                })?;
                form.target = Some(parse_target(&text)?);
            }
            _ => {}
        }
    }

    Ok(form)
}

fn parse_target(text: &str) -> Result<NormalizationTarget> {
    let lufs: f64 = text
        .trim()
        .parse()
        .map_err(|_| ServerError::BadRequest(format!("Invalid target_lufs: {}", text)))?;
    let target = NormalizationTarget::with_integrated_lufs(lufs);
    if !target.is_valid() {
        return Err(ServerError::BadRequest(format!(
            "target_lufs {} is out of range",
            lufs
        )));
    }
    Ok(target)
}

/// Reduce a client-supplied name to its final path component
fn sanitize_file_name(raw: &str) -> Option<String> {
    let name = raw.rsplit(['/', '\\']).next()?.trim();
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}

/// `name`, or `name` prefixed with a counter when an earlier upload took it
fn unique_name(name: &str, taken: &mut HashSet<String>) -> String {
    let mut candidate = name.to_string();
    let mut counter = 1;
    while !taken.insert(candidate.clone()) {
        candidate = format!("{}_{}", counter, name);
        counter += 1;
    }
    candidate
}

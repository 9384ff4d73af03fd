/// Common test utilities and fixtures
use async_trait::async_trait;
use axum::Router;
use loudeq_loudness::{
    BatchEqualizer, EqualizerConfig, LinearDirective, LoudnessError, LoudnessStatistics,
    LoudnessTool,
};
use loudeq_server::{api, config::ServerConfig, services::JobStore, state::AppState};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

pub const BOUNDARY: &str = "loudeq-test-boundary";

/// Loudness tool that never runs ffmpeg: every file measures the same and
/// writing copies the input.
#[derive(Default)]
pub struct FakeTool {
    pub unavailable: bool,
    pub failing: HashSet<String>,
}

impl FakeTool {
    pub fn failing(names: &[&str]) -> Self {
        Self {
            failing: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl LoudnessTool for FakeTool {
    fn name(&self) -> &str {
        "fake"
    }

    async fn is_available(&self) -> bool {
        !self.unavailable
    }

    async fn analyze(
        &self,
        input: &Path,
        _target_lufs: f64,
    ) -> loudeq_loudness::Result<LoudnessStatistics> {
        let name = input.file_name().unwrap().to_string_lossy().into_owned();
        if self.failing.contains(&name) {
            return Err(LoudnessError::analysis(name, "Invalid data found when processing input"));
        }
        Ok(LoudnessStatistics::new("-18.20", "-0.90", "6.40", "-28.50"))
    }

    async fn write(
        &self,
        input: &Path,
        output: &Path,
        _directive: &LinearDirective<'_>,
    ) -> loudeq_loudness::Result<()> {
        std::fs::copy(input, output)?;
        Ok(())
    }
}

/// Router over a fresh data directory; keep the `TempDir` alive for the test
pub async fn create_test_app(tool: FakeTool) -> (Router, TempDir) {
    let temp_dir = TempDir::new().unwrap();

    let job_store = JobStore::new(temp_dir.path().to_path_buf(), 10);
    job_store.initialize().await.unwrap();

    let config = EqualizerConfig {
        workers: 2,
        ..EqualizerConfig::default()
    };
    let equalizer = BatchEqualizer::new(Arc::new(tool), config);

    let app_state = AppState::new(
        Arc::new(equalizer),
        Arc::new(job_store),
        Arc::new(ServerConfig::default().equalizer),
    );

    (api::router(app_state, 16 * 1024 * 1024), temp_dir)
}

/// Encode a multipart/form-data body with one `files` part per upload
pub fn multipart_body(files: &[(&str, &str)], fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (file_name, data) in files {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{}\"\r\nContent-Type: audio/mpeg\r\n\r\n",
                BOUNDARY, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(data.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}

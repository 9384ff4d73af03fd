/// Job store - keeps each equalization job's archive and manifest on disk
use crate::error::{Result, ServerError};
use crate::services::archive::create_archive;
use chrono::{DateTime, Utc};
use loudeq_loudness::{BatchResult, FileOutcome, FileReport};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Name of the archive every job produces
pub const ARCHIVE_FILE_NAME: &str = "equalized_mp3s.zip";

const MANIFEST_FILE_NAME: &str = "job.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a job id from a URL segment; anything but a UUID is rejected
    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw).ok().map(Self)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Succeeded,
    Failed,
    Cancelled,
}

/// Per-file line of a job summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSummary {
    pub file: String,
    pub status: FileStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&FileReport> for FileSummary {
    fn from(report: &FileReport) -> Self {
        let (status, output, error) = match &report.outcome {
            FileOutcome::Succeeded { output, .. } => (
                FileStatus::Succeeded,
                output
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned()),
                None,
            ),
            FileOutcome::Failed { message, .. } => {
                (FileStatus::Failed, None, Some(message.clone()))
            }
            FileOutcome::Cancelled => (FileStatus::Cancelled, None, None),
        };
        Self {
            file: report.file_name.clone(),
            status,
            output,
            error,
        }
    }
}

/// What a finished job produced, persisted next to its archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobManifest {
    pub job_id: JobId,
    pub created_at: DateTime<Utc>,
    pub processed_count: usize,
    pub files: Vec<FileSummary>,
}

impl JobManifest {
    pub fn from_batch(job_id: JobId, result: &BatchResult) -> Self {
        Self {
            job_id,
            created_at: Utc::now(),
            processed_count: result.processed_count(),
            files: result.reports.iter().map(FileSummary::from).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobStore {
    base_path: PathBuf,
    max_jobs: usize,
}

impl JobStore {
    pub fn new(base_path: PathBuf, max_jobs: usize) -> Self {
        Self {
            base_path,
            max_jobs,
        }
    }

    /// Initialize storage directories
    pub async fn initialize(&self) -> Result<()> {
        fs::create_dir_all(self.jobs_dir()).await?;
        Ok(())
    }

    fn jobs_dir(&self) -> PathBuf {
        self.base_path.join("jobs")
    }

    pub fn job_dir(&self, job_id: JobId) -> PathBuf {
        self.jobs_dir().join(job_id.to_string())
    }

    /// Where a job's archive is written
    pub fn archive_path_for(&self, job_id: JobId) -> PathBuf {
        self.job_dir(job_id).join(ARCHIVE_FILE_NAME)
    }

    /// Reserve a fresh job directory
    pub async fn create_job(&self) -> Result<JobId> {
        let job_id = JobId::generate();
        fs::create_dir_all(self.job_dir(job_id)).await?;
        tracing::debug!(job_id = %job_id, "Created job directory");
        Ok(job_id)
    }

    /// Archive a finished batch under a new job id and record its manifest.
    ///
    /// A job that cannot be completed is removed again, so every job
    /// directory left on disk either has a manifest or is still being written.
    pub async fn store_job(&self, result: &BatchResult) -> Result<JobManifest> {
        let job_id = self.create_job().await?;
        match self.finish_job(job_id, result).await {
            Ok(manifest) => Ok(manifest),
            Err(e) => {
                self.discard(job_id).await;
                Err(e)
            }
        }
    }

    async fn finish_job(&self, job_id: JobId, result: &BatchResult) -> Result<JobManifest> {
        create_archive(result.succeeded.clone(), self.archive_path_for(job_id)).await?;
        let manifest = JobManifest::from_batch(job_id, result);
        self.save_manifest(&manifest).await?;
        Ok(manifest)
    }

    async fn discard(&self, job_id: JobId) {
        match fs::remove_dir_all(self.job_dir(job_id)).await {
            Ok(()) => tracing::debug!(job_id = %job_id, "Removed incomplete job"),
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Failed to remove incomplete job");
            }
        }
    }

    pub async fn save_manifest(&self, manifest: &JobManifest) -> Result<()> {
        let path = self.job_dir(manifest.job_id).join(MANIFEST_FILE_NAME);
        let data = serde_json::to_vec_pretty(manifest)
            .map_err(|e| ServerError::Storage(format!("Failed to encode manifest: {}", e)))?;
        fs::write(&path, data).await?;
        Ok(())
    }

    /// Load the manifest of a finished job
    pub async fn manifest(&self, raw_job_id: &str) -> Result<JobManifest> {
        let job_id = parse_job_id(raw_job_id)?;
        let path = self.job_dir(job_id).join(MANIFEST_FILE_NAME);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(job_not_found(raw_job_id));
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&data).map_err(|e| {
            ServerError::Storage(format!("Corrupt manifest for job {}: {}", job_id, e))
        })
    }

    /// Path of an existing job archive
    pub async fn archive_path(&self, raw_job_id: &str) -> Result<PathBuf> {
        let job_id = parse_job_id(raw_job_id)?;
        let path = self.archive_path_for(job_id);
        if !fs::try_exists(&path).await? {
            return Err(job_not_found(raw_job_id));
        }
        self.validate_path(&path)?;
        Ok(path)
    }

    /// Delete the oldest finished jobs beyond the retention limit.
    ///
    /// Jobs without a manifest are still being written and are left alone.
    /// Returns how many jobs were removed.
    pub async fn prune(&self) -> Result<usize> {
        let mut finished = Vec::new();
        let mut entries = fs::read_dir(self.jobs_dir()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Some(job_id) = entry.file_name().to_str().and_then(JobId::parse) else {
                continue;
            };
            match self.manifest(&job_id.to_string()).await {
                Ok(manifest) => finished.push((manifest.created_at, job_id)),
                Err(ServerError::NotFound(_)) => {}
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Skipping unreadable job");
                }
            }
        }

        if finished.len() <= self.max_jobs {
            return Ok(0);
        }

        finished.sort_by(|a, b| b.0.cmp(&a.0));
        let mut removed = 0;
        for (_, job_id) in finished.into_iter().skip(self.max_jobs) {
            fs::remove_dir_all(self.job_dir(job_id)).await?;
            removed += 1;
        }
        tracing::info!(removed, "Pruned old jobs");
        Ok(removed)
    }

    /// Validate that a path is within the storage directory (prevent directory traversal)
    pub fn validate_path(&self, path: &Path) -> Result<()> {
        let canonical_base = self
            .base_path
            .canonicalize()
            .map_err(|e| ServerError::Storage(format!("Invalid base path: {}", e)))?;

        let canonical_path = path
            .canonicalize()
            .map_err(|e| ServerError::Storage(format!("Invalid path: {}", e)))?;

        if !canonical_path.starts_with(&canonical_base) {
            return Err(ServerError::BadRequest(
                "Path traversal attempt detected".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_job_id(raw: &str) -> Result<JobId> {
    JobId::parse(raw).ok_or_else(|| job_not_found(raw))
}

fn job_not_found(raw: &str) -> ServerError {
    ServerError::NotFound(format!("Job not found: {}", raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_locate_archive() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(temp_dir.path().to_path_buf(), 10);
        store.initialize().await.unwrap();

        let job_id = store.create_job().await.unwrap();
        std::fs::write(store.archive_path_for(job_id), b"zip").unwrap();

        let path = store.archive_path(&job_id.to_string()).await.unwrap();
        assert!(path.ends_with(ARCHIVE_FILE_NAME));
        assert!(path.exists());
    }

    #[test]
    fn test_job_id_rejects_non_uuid() {
        assert!(JobId::parse("../../etc/passwd").is_none());
        assert!(JobId::parse("").is_none());
        assert!(JobId::parse(&Uuid::new_v4().to_string()).is_some());
    }

    #[test]
    fn test_summary_from_reports() {
        let failed = FileReport {
            input: PathBuf::from("/in/bad.mp3"),
            file_name: "bad.mp3".to_string(),
            outcome: FileOutcome::Failed {
                stage: loudeq_loudness::FileStage::Normalizing,
                message: "Error normalizing bad.mp3: ffmpeg error: boom".to_string(),
            },
        };
        let summary = FileSummary::from(&failed);
        assert_eq!(summary.status, FileStatus::Failed);
        assert!(summary.error.unwrap().contains("boom"));
        assert!(summary.output.is_none());
    }
}

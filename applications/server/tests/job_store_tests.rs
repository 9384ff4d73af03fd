/// Job store tests
/// Retention, manifests and lookup of stored job archives
use chrono::{Duration, Utc};
use loudeq_loudness::{BatchResult, FileOutcome, FileReport, LoudnessStatistics};
use loudeq_server::{
    services::job_store::{FileStatus, FileSummary},
    services::{JobId, JobManifest, JobStore},
    ServerError,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

async fn store_with_limit(max_jobs: usize) -> (JobStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let store = JobStore::new(temp_dir.path().to_path_buf(), max_jobs);
    store.initialize().await.unwrap();
    (store, temp_dir)
}

/// Create a finished job whose manifest claims it is `age_minutes` old
async fn finished_job(store: &JobStore, age_minutes: i64) -> JobId {
    let job_id = store.create_job().await.unwrap();
    std::fs::write(store.archive_path_for(job_id), b"zip").unwrap();
    let manifest = JobManifest {
        job_id,
        created_at: Utc::now() - Duration::minutes(age_minutes),
        processed_count: 1,
        files: vec![FileSummary {
            file: "a.mp3".to_string(),
            status: FileStatus::Succeeded,
            output: Some("equalized_a.mp3".to_string()),
            error: None,
        }],
    };
    store.save_manifest(&manifest).await.unwrap();
    job_id
}

/// A batch result in which `output` is the only success
fn batch_with_output(output: PathBuf) -> BatchResult {
    BatchResult {
        succeeded: vec![output.clone()],
        reports: vec![FileReport {
            input: PathBuf::from("/uploads/a.mp3"),
            file_name: "a.mp3".to_string(),
            outcome: FileOutcome::Succeeded {
                output,
                measured: LoudnessStatistics::new("-27.61", "-4.47", "18.06", "-39.20"),
            },
        }],
    }
}

fn job_dirs(base: &Path) -> usize {
    std::fs::read_dir(base.join("jobs")).unwrap().count()
}

#[tokio::test]
async fn test_store_job_writes_archive_and_manifest() {
    let (store, temp_dir) = store_with_limit(5).await;
    let outputs = TempDir::new().unwrap();
    let output = outputs.path().join("equalized_a.mp3");
    std::fs::write(&output, b"mp3").unwrap();

    let manifest = store.store_job(&batch_with_output(output)).await.unwrap();

    assert_eq!(manifest.processed_count, 1);
    assert_eq!(manifest.files[0].output.as_deref(), Some("equalized_a.mp3"));
    assert!(store.archive_path(&manifest.job_id.to_string()).await.is_ok());
    assert_eq!(store.manifest(&manifest.job_id.to_string()).await.unwrap(), manifest);
    assert_eq!(job_dirs(temp_dir.path()), 1);
}

/// A job whose archive cannot be built leaves no directory behind
#[tokio::test]
async fn test_failed_job_is_removed() {
    let (store, temp_dir) = store_with_limit(5).await;
    let vanished = temp_dir.path().join("gone").join("equalized_a.mp3");

    assert!(store.store_job(&batch_with_output(vanished)).await.is_err());
    assert_eq!(job_dirs(temp_dir.path()), 0);
    assert_eq!(store.prune().await.unwrap(), 0);
}

#[tokio::test]
async fn test_manifest_round_trip() {
    let (store, _temp_dir) = store_with_limit(5).await;
    let job_id = finished_job(&store, 0).await;

    let manifest = store.manifest(&job_id.to_string()).await.unwrap();
    assert_eq!(manifest.job_id, job_id);
    assert_eq!(manifest.files[0].status, FileStatus::Succeeded);
}

#[tokio::test]
async fn test_prune_removes_oldest_jobs() {
    let (store, _temp_dir) = store_with_limit(2).await;
    let oldest = finished_job(&store, 30).await;
    let middle = finished_job(&store, 20).await;
    let newest = finished_job(&store, 10).await;

    let removed = store.prune().await.unwrap();
    assert_eq!(removed, 1);

    assert!(matches!(
        store.archive_path(&oldest.to_string()).await,
        Err(ServerError::NotFound(_))
    ));
    assert!(store.archive_path(&middle.to_string()).await.is_ok());
    assert!(store.archive_path(&newest.to_string()).await.is_ok());
}

#[tokio::test]
async fn test_prune_within_limit_keeps_everything() {
    let (store, _temp_dir) = store_with_limit(3).await;
    finished_job(&store, 5).await;
    finished_job(&store, 1).await;

    assert_eq!(store.prune().await.unwrap(), 0);
}

#[tokio::test]
async fn test_prune_leaves_unfinished_jobs() {
    let (store, _temp_dir) = store_with_limit(1).await;
    let in_progress = store.create_job().await.unwrap();
    finished_job(&store, 2).await;
    finished_job(&store, 1).await;

    assert_eq!(store.prune().await.unwrap(), 1);
    assert!(store.job_dir(in_progress).exists());
}

#[tokio::test]
async fn test_lookup_of_unknown_and_malformed_ids() {
    let (store, _temp_dir) = store_with_limit(5).await;

    let unknown = uuid::Uuid::new_v4().to_string();

    for raw in ["", "nope", "../jobs", unknown.as_str()] {
        assert!(matches!(
            store.archive_path(raw).await,
            Err(ServerError::NotFound(_))
        ));
        assert!(matches!(
            store.manifest(raw).await,
            Err(ServerError::NotFound(_))
        ));
    }
}

#[tokio::test]
async fn test_job_without_archive_is_not_found() {
    let (store, _temp_dir) = store_with_limit(5).await;
    let job_id = store.create_job().await.unwrap();

    assert!(matches!(
        store.archive_path(&job_id.to_string()).await,
        Err(ServerError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_validate_path_rejects_outside_files() {
    let (store, _temp_dir) = store_with_limit(5).await;
    let outside = TempDir::new().unwrap();
    let file = outside.path().join("other.zip");
    std::fs::write(&file, b"zip").unwrap();

    assert!(matches!(
        store.validate_path(&file),
        Err(ServerError::BadRequest(_))
    ));
}

/// Server services
pub mod archive;
pub mod job_store;

pub use archive::create_archive;
pub use job_store::{JobId, JobManifest, JobStore, ARCHIVE_FILE_NAME};

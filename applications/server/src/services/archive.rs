/// Zip packaging of equalized outputs
use crate::error::{Result, ServerError};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

/// Write `files` into a new zip archive at `archive_path`, flat, under their
/// file names. Returns the number of entries written.
///
/// MP3 data does not deflate, so entries are stored uncompressed.
pub async fn create_archive(files: Vec<PathBuf>, archive_path: PathBuf) -> Result<usize> {
    tokio::task::spawn_blocking(move || write_archive(&files, &archive_path))
        .await
        .map_err(|e| ServerError::Internal(format!("Archive task failed: {}", e)))?
}

fn write_archive(files: &[PathBuf], archive_path: &Path) -> Result<usize> {
    let mut writer = ZipWriter::new(BufWriter::new(File::create(archive_path)?));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    for path in files {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ServerError::Storage(format!("Unnamed archive entry: {:?}", path)))?;

        writer.start_file(name, options)?;
        let mut source = File::open(path)?;
        io::copy(&mut source, &mut writer)?;
    }

    writer.finish()?;
    Ok(files.len())
}

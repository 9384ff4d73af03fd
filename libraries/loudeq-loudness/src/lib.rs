//! Two-pass loudness equalization for batches of audio files
//!
//! This crate provides:
//! - Extraction of ffmpeg `loudnorm` measurements from diagnostic output
//! - A [`LoudnessTool`] capability with an ffmpeg subprocess implementation
//! - Per-file measurement and linear-mode normalization
//! - Batch equalization with per-file failure isolation and cancellation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌────────────────────┐
//! │ Input File  │ ──► │  Measurer    │ ──► │ LoudnessStatistics │
//! └─────────────┘     └──────────────┘     └────────────────────┘
//!                                                    │
//!                                                    ▼
//! ┌─────────────┐     ┌──────────────┐     ┌────────────────────┐
//! │ Output File │ ◄── │  Normalizer  │ ◄── │  LinearDirective   │
//! └─────────────┘     └──────────────┘     └────────────────────┘
//!
//! BatchEqualizer runs the chain above for every file of a batch.
//! ```
//!
//! # Example
//!
//! ```ignore
//! use loudeq_loudness::{BatchEqualizer, EqualizerConfig, FfmpegTool};
//! use std::sync::Arc;
//!
//! let tool = Arc::new(FfmpegTool::new("ffmpeg"));
//! let equalizer = BatchEqualizer::new(tool, EqualizerConfig::default());
//!
//! let result = equalizer.equalize_volumes(&inputs, &output_dir).await?;
//! println!("Processed {} files", result.processed_count());
//! ```

#![deny(unsafe_code)]

mod analyzer;
mod batch;
mod error;
mod ffmpeg;
mod measurer;
mod normalizer;
mod target;
mod tool;

pub use analyzer::{
    parse_measurement, LoudnessStatistics, ScanLimits, DEFAULT_MAX_DIAGNOSTIC_BYTES,
    DEFAULT_MAX_DIAGNOSTIC_LINES,
};
pub use batch::{
    default_workers, output_path_for, BatchEqualizer, BatchJob, BatchResult, EqualizerConfig,
    FileOutcome, FileReport, FileStage, OUTPUT_PREFIX,
};
pub use error::{LoudnessError, ParseError, Result};
pub use ffmpeg::{AudioFileInfo, FfmpegTool};
pub use measurer::LoudnessMeasurer;
pub use normalizer::LoudnessNormalizer;
pub use target::{
    analysis_filter, LinearDirective, NormalizationTarget, EBU_R128_BROADCAST_LUFS,
    MAX_TARGET_LUFS, MIN_TARGET_LUFS, OUTPUT_BITRATE_KBPS, OUTPUT_SAMPLE_RATE_HZ,
    TARGET_LOUDNESS_RANGE_LU, TARGET_TRUE_PEAK_DBTP,
};
pub use tool::LoudnessTool;

// Re-exported so callers can cancel batches without depending on tokio-util
pub use tokio_util::sync::CancellationToken;

use std::path::Path;

/// Name used for a file in logs and error messages
pub(crate) fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

//! The loudness tool capability
//!
//! The pipeline never shells out directly. It talks to a [`LoudnessTool`],
//! which the ffmpeg adapter implements for production and tests replace with
//! scripted fakes.

use crate::{analyzer::LoudnessStatistics, error::Result, target::LinearDirective};
use async_trait::async_trait;
use std::path::Path;

#[async_trait]
pub trait LoudnessTool: Send + Sync {
    /// Human-readable tool name used in error messages
    fn name(&self) -> &str;

    /// Whether the tool can be executed at all.
    ///
    /// A missing executable is reported as `false`, never as an error.
    async fn is_available(&self) -> bool;

    /// Run the read-only measurement pass over `input`.
    ///
    /// Fails with [`LoudnessError::Analysis`](crate::LoudnessError::Analysis).
    async fn analyze(&self, input: &Path, target_lufs: f64) -> Result<LoudnessStatistics>;

    /// Run the write pass, producing (or overwriting) `output`.
    ///
    /// Fails with [`LoudnessError::Normalization`](crate::LoudnessError::Normalization)
    /// carrying the tool's raw diagnostic text.
    async fn write(&self, input: &Path, output: &Path, directive: &LinearDirective<'_>)
        -> Result<()>;
}

//! First pass: loudness measurement

use crate::{
    analyzer::LoudnessStatistics,
    error::{LoudnessError, Result},
    file_label,
    target::EBU_R128_BROADCAST_LUFS,
    tool::LoudnessTool,
};
use std::path::Path;
use std::sync::Arc;

/// Runs the read-only analysis pass over single files
#[derive(Clone)]
pub struct LoudnessMeasurer {
    tool: Arc<dyn LoudnessTool>,
    /// Loudness the analysis pass is pointed at; does not affect `input_*` values
    target_lufs: f64,
}

impl LoudnessMeasurer {
    pub fn new(tool: Arc<dyn LoudnessTool>) -> Self {
        Self {
            tool,
            target_lufs: EBU_R128_BROADCAST_LUFS,
        }
    }

    pub fn with_target_lufs(mut self, target_lufs: f64) -> Self {
        self.target_lufs = target_lufs;
        self
    }

    pub fn target_lufs(&self) -> f64 {
        self.target_lufs
    }

    /// Measure the loudness statistics of one file.
    ///
    /// Fails with [`LoudnessError::Analysis`] if the file cannot be opened,
    /// the tool fails, or no measurement block is found in its output.
    pub async fn measure(&self, path: &Path) -> Result<LoudnessStatistics> {
        let label = file_label(path);

        tokio::fs::File::open(path)
            .await
            .map_err(|e| LoudnessError::analysis(&label, format!("cannot open file: {}", e)))?;

        tracing::debug!(file = %label, "Measuring loudness");
        let stats = self.tool.analyze(path, self.target_lufs).await?;
        tracing::debug!(file = %label, %stats, "Loudness measured");

        Ok(stats)
    }
}

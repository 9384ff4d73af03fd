//! Second pass: linear loudness normalization
//!
//! Linear mode applies one constant gain to the whole file, which the filter
//! can only compute from statistics of the entire signal. That is why every
//! write pass is preceded by a full measurement pass over the same input.

use crate::{
    analyzer::LoudnessStatistics,
    error::{LoudnessError, Result},
    file_label,
    measurer::LoudnessMeasurer,
    target::{LinearDirective, NormalizationTarget},
    tool::LoudnessTool,
};
use std::path::Path;
use std::sync::Arc;

#[derive(Clone)]
pub struct LoudnessNormalizer {
    measurer: LoudnessMeasurer,
    tool: Arc<dyn LoudnessTool>,
}

impl LoudnessNormalizer {
    pub fn new(tool: Arc<dyn LoudnessTool>) -> Self {
        Self {
            measurer: LoudnessMeasurer::new(Arc::clone(&tool)),
            tool,
        }
    }

    pub fn with_measurer(measurer: LoudnessMeasurer, tool: Arc<dyn LoudnessTool>) -> Self {
        Self { measurer, tool }
    }

    pub fn measurer(&self) -> &LoudnessMeasurer {
        &self.measurer
    }

    /// Measure `input` and write a level-adjusted copy to `output`.
    ///
    /// Returns the first-pass statistics that drove the correction. A failed
    /// measurement is reported as [`LoudnessError::Normalization`]. On failure
    /// `output` may or may not exist.
    pub async fn normalize(
        &self,
        input: &Path,
        output: &Path,
        target: &NormalizationTarget,
    ) -> Result<LoudnessStatistics> {
        let measured = self.measurer.measure(input).await.map_err(|e| match e {
            LoudnessError::Analysis { file, reason } => LoudnessError::Normalization {
                file,
                reason: format!("measurement failed: {}", reason),
            },
            other => other,
        })?;

        self.apply(input, output, target, &measured).await?;
        Ok(measured)
    }

    /// Run only the write pass, using statistics measured earlier for the same input
    pub async fn apply(
        &self,
        input: &Path,
        output: &Path,
        target: &NormalizationTarget,
        measured: &LoudnessStatistics,
    ) -> Result<()> {
        let directive = LinearDirective::new(*target, measured);
        tracing::debug!(
            file = %file_label(input),
            output = %output.display(),
            filter = %directive,
            "Applying linear normalization"
        );
        self.tool.write(input, output, &directive).await
    }
}

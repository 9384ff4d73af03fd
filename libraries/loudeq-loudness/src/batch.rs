//! Batch loudness equalization
//!
//! Runs measure → normalize for every file of a batch on a bounded number of
//! concurrent workers. A failing file never affects its siblings: each file
//! ends in exactly one [`FileOutcome`], and inputs that do not exist are
//! skipped without leaving any record.
//!
//! Results are gathered by input position, so the output order always matches
//! the input order no matter which worker finishes first.
//!
//! Output names depend only on the input's file name, so two inputs sharing a
//! name would write the same output. The first such input owns the output and
//! later ones fail without running any tool.
//!
//! Cancellation stops new files from starting. Files already in a tool call
//! are allowed to finish, and files that never started are reported as
//! [`FileOutcome::Cancelled`].

use crate::{
    analyzer::LoudnessStatistics,
    error::{LoudnessError, Result},
    file_label,
    measurer::LoudnessMeasurer,
    normalizer::LoudnessNormalizer,
    target::NormalizationTarget,
    tool::LoudnessTool,
};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{hash_map::Entry, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Prefix added to the file name of every normalized output
pub const OUTPUT_PREFIX: &str = "equalized_";

/// Output location for one input: `output_dir / ("equalized_" + basename)`
pub fn output_path_for(input: &Path, output_dir: &Path) -> Option<PathBuf> {
    let file_name = input.file_name()?;
    let mut name = std::ffi::OsString::from(OUTPUT_PREFIX);
    name.push(file_name);
    Some(output_dir.join(name))
}

/// Stage a file had reached when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStage {
    Measuring,
    Normalizing,
}

/// Terminal state of one attempted input file
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Succeeded {
        output: PathBuf,
        measured: LoudnessStatistics,
    },
    Failed {
        stage: FileStage,
        message: String,
    },
    /// The batch was cancelled before this file started
    Cancelled,
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    pub input: PathBuf,
    pub file_name: String,
    #[serde(flatten)]
    pub outcome: FileOutcome,
}

/// Everything a batch run produced
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchResult {
    /// Outputs of files that passed both passes, in input order
    pub succeeded: Vec<PathBuf>,
    /// One report per attempted input, in input order (skipped inputs excluded)
    pub reports: Vec<FileReport>,
}

impl BatchResult {
    pub fn processed_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn outcome_for(&self, input: &Path) -> Option<&FileOutcome> {
        self.reports
            .iter()
            .find(|r| r.input == input)
            .map(|r| &r.outcome)
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileReport> {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, FileOutcome::Failed { .. }))
    }

    pub fn cancelled_count(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.outcome == FileOutcome::Cancelled)
            .count()
    }
}

/// One batch invocation
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub inputs: Vec<PathBuf>,
    pub output_dir: PathBuf,
    /// Overrides the equalizer's default target for this job
    pub target: Option<NormalizationTarget>,
}

impl BatchJob {
    pub fn new(inputs: Vec<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            inputs,
            output_dir: output_dir.into(),
            target: None,
        }
    }

    pub fn with_target(mut self, target: NormalizationTarget) -> Self {
        self.target = Some(target);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EqualizerConfig {
    pub target: NormalizationTarget,
    /// Files processed concurrently
    pub workers: usize,
}

impl Default for EqualizerConfig {
    fn default() -> Self {
        Self {
            target: NormalizationTarget::default(),
            workers: default_workers(),
        }
    }
}

/// Available parallelism, falling back to a single worker
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

pub struct BatchEqualizer {
    tool: Arc<dyn LoudnessTool>,
    measurer: LoudnessMeasurer,
    normalizer: LoudnessNormalizer,
    config: EqualizerConfig,
}

impl BatchEqualizer {
    pub fn new(tool: Arc<dyn LoudnessTool>, config: EqualizerConfig) -> Self {
        let measurer = LoudnessMeasurer::new(Arc::clone(&tool));
        let normalizer = LoudnessNormalizer::with_measurer(measurer.clone(), Arc::clone(&tool));
        Self {
            tool,
            measurer,
            normalizer,
            config,
        }
    }

    pub fn config(&self) -> &EqualizerConfig {
        &self.config
    }

    pub fn tool(&self) -> &Arc<dyn LoudnessTool> {
        &self.tool
    }

    /// Whether the underlying tool can run at all
    pub async fn is_available(&self) -> bool {
        self.tool.is_available().await
    }

    /// Equalize `inputs` into `output_dir` with the default target
    pub async fn equalize_volumes(
        &self,
        inputs: &[PathBuf],
        output_dir: &Path,
    ) -> Result<BatchResult> {
        let job = BatchJob::new(inputs.to_vec(), output_dir);
        self.run(&job, &CancellationToken::new()).await
    }

    /// Run a batch job.
    ///
    /// Fails only for batch-level problems: an empty job
    /// ([`LoudnessError::Precondition`]) or an unusable tool
    /// ([`LoudnessError::ToolUnavailable`]). Both are checked before anything
    /// touches the output directory. Per-file errors end up in the result.
    pub async fn run(&self, job: &BatchJob, cancel: &CancellationToken) -> Result<BatchResult> {
        if job.inputs.is_empty() {
            return Err(LoudnessError::Precondition("No files supplied".to_string()));
        }

        if !self.tool.is_available().await {
            return Err(LoudnessError::ToolUnavailable(self.tool.name().to_string()));
        }

        tokio::fs::create_dir_all(&job.output_dir).await?;

        let target = job.target.unwrap_or(self.config.target);
        let workers = self.config.workers.max(1);

        tracing::info!(
            files = job.inputs.len(),
            workers,
            target_lufs = target.integrated_lufs,
            output_dir = %job.output_dir.display(),
            "Starting loudness equalization"
        );

        let collisions = output_collisions(&job.inputs, &job.output_dir).await;

        // Collected up front so the stream holds no closure over borrows;
        // otherwise rustc cannot prove the calling future `Send`.
        let pending: Vec<_> = job
            .inputs
            .iter()
            .enumerate()
            .map(|(index, input)| {
                let earlier = collisions.get(&index).map(PathBuf::as_path);
                self.process_file(input, &job.output_dir, &target, earlier, cancel)
            })
            .collect();

        let slots: Vec<Option<FileReport>> = stream::iter(pending)
            .buffered(workers)
            .collect()
            .await;

        let mut result = BatchResult::default();
        for report in slots.into_iter().flatten() {
            if let FileOutcome::Succeeded { output, .. } = &report.outcome {
                result.succeeded.push(output.clone());
            }
            result.reports.push(report);
        }

        tracing::info!(
            processed = result.processed_count(),
            failed = result.failures().count(),
            cancelled = result.cancelled_count(),
            skipped = job.inputs.len() - result.reports.len(),
            "Loudness equalization completed"
        );

        Ok(result)
    }

    /// Take one input through its pipeline. `None` means the input was skipped.
    ///
    /// `earlier` is the input that already owns this file's output path.
    async fn process_file(
        &self,
        input: &Path,
        output_dir: &Path,
        target: &NormalizationTarget,
        earlier: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Option<FileReport> {
        if !tokio::fs::try_exists(input).await.unwrap_or(false) {
            tracing::debug!(input = %input.display(), "Input does not exist, skipping");
            return None;
        }

        let file_name = file_label(input);

        let report = |outcome: FileOutcome| FileReport {
            input: input.to_path_buf(),
            file_name: file_name.clone(),
            outcome,
        };

        let Some(output) = output_path_for(input, output_dir) else {
            let outcome = failure(&file_name, FileStage::Measuring, "input has no file name");
            return Some(report(outcome));
        };

        if let Some(earlier) = earlier {
            let message = format!(
                "output {} collides with {}",
                file_label(&output),
                earlier.display()
            );
            return Some(report(failure(&file_name, FileStage::Measuring, message)));
        }

        if cancel.is_cancelled() {
            tracing::info!(file = %file_name, "Batch cancelled, not starting file");
            return Some(report(FileOutcome::Cancelled));
        }

        let measured = match self.measurer.measure(input).await {
            Ok(measured) => measured,
            Err(e) => return Some(report(failure(&file_name, FileStage::Measuring, e))),
        };

        if let Err(e) = self.normalizer.apply(input, &output, target, &measured).await {
            return Some(report(failure(&file_name, FileStage::Normalizing, e)));
        }

        tracing::info!(
            file = %file_name,
            measured_lufs = measured.integrated(),
            output = %output.display(),
            "Successfully processed"
        );
        Some(report(FileOutcome::Succeeded { output, measured }))
    }
}

/// Inputs whose output path is already claimed by an earlier existing input,
/// keyed by position and mapped to that earlier input
async fn output_collisions(inputs: &[PathBuf], output_dir: &Path) -> HashMap<usize, PathBuf> {
    let mut owners: HashMap<PathBuf, &Path> = HashMap::new();
    let mut collisions = HashMap::new();

    for (index, input) in inputs.iter().enumerate() {
        if !tokio::fs::try_exists(input).await.unwrap_or(false) {
            continue;
        }
        let Some(output) = output_path_for(input, output_dir) else {
            continue;
        };
        match owners.entry(output) {
            Entry::Occupied(owner) => {
                collisions.insert(index, owner.get().to_path_buf());
            }
            Entry::Vacant(slot) => {
                slot.insert(input);
            }
        }
    }

    collisions
}

fn failure(file_name: &str, stage: FileStage, error: impl ToString) -> FileOutcome {
    let message = error.to_string();
    tracing::warn!(file = %file_name, ?stage, error = %message, "Error processing file");
    FileOutcome::Failed { stage, message }
}

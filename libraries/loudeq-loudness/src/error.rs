//! Error types for loudness equalization

use thiserror::Error;

/// Result type for loudness operations
pub type Result<T> = std::result::Result<T, LoudnessError>;

/// Errors that can occur while measuring or normalizing audio files
#[derive(Error, Debug)]
pub enum LoudnessError {
    /// The external loudness tool cannot be executed at all
    #[error("{0} is not available. Please install {0} to process audio files.")]
    ToolUnavailable(String),

    /// The analysis pass failed for one file
    #[error("Error analyzing loudness for {file}: {reason}")]
    Analysis { file: String, reason: String },

    /// The write pass (or its measurement) failed for one file
    #[error("Error normalizing {file}: {reason}")]
    Normalization { file: String, reason: String },

    /// The batch itself is unusable (e.g. no files supplied)
    #[error("Invalid batch: {0}")]
    Precondition(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoudnessError {
    pub fn analysis(file: impl Into<String>, reason: impl ToString) -> Self {
        Self::Analysis {
            file: file.into(),
            reason: reason.to_string(),
        }
    }

    pub fn normalization(file: impl Into<String>, reason: impl ToString) -> Self {
        Self::Normalization {
            file: file.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error fails a whole batch instead of a single file
    pub fn is_batch_fatal(&self) -> bool {
        matches!(self, Self::ToolUnavailable(_) | Self::Precondition(_))
    }
}

/// Errors produced while extracting the measurement block from diagnostic text
#[derive(Error, Debug)]
pub enum ParseError {
    /// No line opening a measurement block was found
    #[error("no measurement data found")]
    NoMeasurementData,

    /// A block was opened but its terminator never appeared
    #[error("measurement block opened on line {0} is never closed")]
    UnterminatedBlock(usize),

    /// Scanning hit the configured line cap
    #[error("diagnostic output exceeds {0} lines")]
    LineLimitExceeded(usize),

    /// Scanning hit the configured byte cap
    #[error("diagnostic output exceeds {0} bytes")]
    ByteLimitExceeded(usize),

    /// The block is not valid JSON
    #[error("invalid measurement data: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// A measurement field is neither a string nor a number
    #[error("measurement field `{0}` has an unexpected type")]
    InvalidField(&'static str),

    /// The diagnostic stream could not be read
    #[error("failed to read diagnostic output: {0}")]
    Io(#[from] std::io::Error),
}

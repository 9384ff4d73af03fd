//! Loudness statistics and the loudnorm measurement parser
//!
//! ffmpeg's `loudnorm` filter reports its first-pass measurements as a JSON
//! object printed on stderr, interleaved with ordinary log lines:
//!
//! ```text
//! [Parsed_loudnorm_0 @ 0x55d0c8a4c2c0]
//! {
//!     "input_i" : "-27.61",
//!     "input_tp" : "-4.47",
//!     "input_lra" : "18.06",
//!     "input_thresh" : "-39.20",
//!     ...
//! }
//! ```
//!
//! [`parse_measurement`] pulls that block out of the raw text. The measured
//! values are kept as the exact strings the tool printed so the second pass
//! receives them without any float round-trip.

use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Default cap on the number of diagnostic lines scanned for a measurement block
pub const DEFAULT_MAX_DIAGNOSTIC_LINES: usize = 50_000;

/// Default cap on the number of diagnostic bytes scanned for a measurement block
pub const DEFAULT_MAX_DIAGNOSTIC_BYTES: usize = 8 * 1024 * 1024;

/// Loudness measurements of one source file, as reported by the analysis pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoudnessStatistics {
    /// Integrated loudness (LUFS), `input_i`
    integrated: String,
    /// True peak (dBTP), `input_tp`
    true_peak: String,
    /// Loudness range (LU), `input_lra`
    loudness_range: String,
    /// Gating threshold (LUFS), `input_thresh`
    threshold: String,
    /// Informational: normalization type the tool would have used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    normalization_type: Option<String>,
    /// Informational: offset gain suggested by the tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_offset: Option<String>,
}

impl LoudnessStatistics {
    pub fn new(
        integrated: impl Into<String>,
        true_peak: impl Into<String>,
        loudness_range: impl Into<String>,
        threshold: impl Into<String>,
    ) -> Self {
        Self {
            integrated: integrated.into(),
            true_peak: true_peak.into(),
            loudness_range: loudness_range.into(),
            threshold: threshold.into(),
            normalization_type: None,
            target_offset: None,
        }
    }

    pub fn integrated(&self) -> &str {
        &self.integrated
    }

    pub fn true_peak(&self) -> &str {
        &self.true_peak
    }

    pub fn loudness_range(&self) -> &str {
        &self.loudness_range
    }

    pub fn threshold(&self) -> &str {
        &self.threshold
    }

    pub fn normalization_type(&self) -> Option<&str> {
        self.normalization_type.as_deref()
    }

    pub fn target_offset(&self) -> Option<&str> {
        self.target_offset.as_deref()
    }

    /// Integrated loudness as a number, if the tool printed a finite value
    pub fn integrated_lufs(&self) -> Option<f64> {
        self.integrated.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    }

    /// Build statistics from the decoded loudnorm JSON object.
    ///
    /// A missing measurement falls back to `"0"`, which is what the tool
    /// itself treats as "not measured" for the `measured_*` options.
    fn from_fields(fields: &Map<String, Value>) -> Result<Self, ParseError> {
        Ok(Self {
            integrated: required_field(fields, "input_i")?,
            true_peak: required_field(fields, "input_tp")?,
            loudness_range: required_field(fields, "input_lra")?,
            threshold: required_field(fields, "input_thresh")?,
            normalization_type: optional_field(fields, "normalization_type")?,
            target_offset: optional_field(fields, "target_offset")?,
        })
    }
}

impl fmt::Display for LoudnessStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Loudness: {} LUFS, True Peak: {} dBTP, Range: {} LU, Threshold: {} LUFS",
            self.integrated, self.true_peak, self.loudness_range, self.threshold
        )
    }
}

fn field_text(name: &'static str, value: &Value) -> Result<String, ParseError> {
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        // `arbitrary_precision` keeps the digits exactly as printed
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(ParseError::InvalidField(name)),
    }
}

fn required_field(fields: &Map<String, Value>, name: &'static str) -> Result<String, ParseError> {
    match fields.get(name) {
        Some(value) => field_text(name, value),
        None => {
            tracing::warn!(field = name, "Measurement field missing, defaulting to 0");
            Ok("0".to_string())
        }
    }
}

fn optional_field(
    fields: &Map<String, Value>,
    name: &'static str,
) -> Result<Option<String>, ParseError> {
    fields.get(name).map(|v| field_text(name, v)).transpose()
}

/// Bounds on how much diagnostic text the parser is willing to scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanLimits {
    pub max_lines: usize,
    pub max_bytes: usize,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            max_lines: DEFAULT_MAX_DIAGNOSTIC_LINES,
            max_bytes: DEFAULT_MAX_DIAGNOSTIC_BYTES,
        }
    }
}

/// Extract loudness statistics from the analysis pass's diagnostic output.
///
/// The block starts at the first line whose trimmed text begins with `{` and
/// ends at the first following line whose trimmed text is exactly `}`. Lines
/// before and after the block are ignored. Both caps apply to everything
/// scanned up to and including the terminator.
pub fn parse_measurement(
    diagnostics: &str,
    limits: &ScanLimits,
) -> Result<LoudnessStatistics, ParseError> {
    let block = extract_block(diagnostics, limits)?;
    let fields: Map<String, Value> = serde_json::from_str(&block)?;
    LoudnessStatistics::from_fields(&fields)
}

fn extract_block(diagnostics: &str, limits: &ScanLimits) -> Result<String, ParseError> {
    let mut scanned_bytes = 0usize;
    let mut block: Option<(usize, Vec<&str>)> = None;

    for (index, line) in diagnostics.lines().enumerate() {
        if index >= limits.max_lines {
            return Err(ParseError::LineLimitExceeded(limits.max_lines));
        }
        scanned_bytes += line.len() + 1;
        if scanned_bytes > limits.max_bytes {
            return Err(ParseError::ByteLimitExceeded(limits.max_bytes));
        }

        let trimmed = line.trim();
        match block.as_mut() {
            None => {
                if trimmed.starts_with('{') {
                    block = Some((index + 1, vec![line]));
                }
            }
            Some((_, lines)) => {
                lines.push(line);
                if trimmed == "}" {
                    return Ok(lines.join("\n"));
                }
            }
        }
    }

    match block {
        Some((start_line, _)) => Err(ParseError::UnterminatedBlock(start_line)),
        None => Err(ParseError::NoMeasurementData),
    }
}

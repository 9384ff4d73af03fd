//! Normalization targets and loudnorm filter directives

use crate::analyzer::LoudnessStatistics;
use serde::{Deserialize, Serialize};
use std::fmt;

/// EBU R128 broadcast reference level (-23 LUFS)
pub const EBU_R128_BROADCAST_LUFS: f64 = -23.0;

/// Maximum true peak of normalized output (dBTP)
pub const TARGET_TRUE_PEAK_DBTP: f64 = -1.5;

/// Loudness range of normalized output (LU)
pub const TARGET_LOUDNESS_RANGE_LU: f64 = 11.0;

/// Sample rate forced on every normalized file
pub const OUTPUT_SAMPLE_RATE_HZ: u32 = 44_100;

/// Audio bitrate forced on every normalized file
pub const OUTPUT_BITRATE_KBPS: u32 = 320;

/// Lowest integrated loudness the loudnorm filter accepts
pub const MIN_TARGET_LUFS: f64 = -70.0;

/// Highest integrated loudness the loudnorm filter accepts
pub const MAX_TARGET_LUFS: f64 = -5.0;

/// Loudness levels a normalized file should end up at
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizationTarget {
    /// Integrated loudness (LUFS)
    pub integrated_lufs: f64,
    /// True peak ceiling (dBTP)
    pub true_peak_dbtp: f64,
    /// Loudness range (LU)
    pub loudness_range_lu: f64,
}

impl Default for NormalizationTarget {
    fn default() -> Self {
        Self {
            integrated_lufs: EBU_R128_BROADCAST_LUFS,
            true_peak_dbtp: TARGET_TRUE_PEAK_DBTP,
            loudness_range_lu: TARGET_LOUDNESS_RANGE_LU,
        }
    }
}

impl NormalizationTarget {
    /// Default target with a different integrated loudness
    pub fn with_integrated_lufs(integrated_lufs: f64) -> Self {
        Self {
            integrated_lufs,
            ..Self::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        (MIN_TARGET_LUFS..=MAX_TARGET_LUFS).contains(&self.integrated_lufs)
    }
}

/// Filter expression for the measurement-only first pass
pub fn analysis_filter(target_lufs: f64) -> String {
    format!("loudnorm=I={}:print_format=json", target_lufs)
}

/// Everything the write pass needs: the target levels, the first-pass
/// measurements of the same file, and the forced output format.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearDirective<'a> {
    pub target: NormalizationTarget,
    pub measured: &'a LoudnessStatistics,
    pub sample_rate_hz: u32,
    pub bitrate_kbps: u32,
}

impl<'a> LinearDirective<'a> {
    pub fn new(target: NormalizationTarget, measured: &'a LoudnessStatistics) -> Self {
        Self {
            target,
            measured,
            sample_rate_hz: OUTPUT_SAMPLE_RATE_HZ,
            bitrate_kbps: OUTPUT_BITRATE_KBPS,
        }
    }

    /// The loudnorm filter expression in linear mode
    pub fn filter(&self) -> String {
        self.to_string()
    }

    /// Bitrate argument in ffmpeg notation, e.g. `320k`
    pub fn bitrate(&self) -> String {
        format!("{}k", self.bitrate_kbps)
    }
}

impl fmt::Display for LinearDirective<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "loudnorm=I={}:TP={}:LRA={}:measured_I={}:measured_LRA={}:measured_TP={}:measured_thresh={}:linear=true",
            self.target.integrated_lufs,
            self.target.true_peak_dbtp,
            self.target.loudness_range_lu,
            self.measured.integrated(),
            self.measured.loudness_range(),
            self.measured.true_peak(),
            self.measured.threshold(),
        )
    }
}

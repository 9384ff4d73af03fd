//! ffmpeg-backed loudness tool
//!
//! Runs `ffmpeg` as a subprocess for both loudnorm passes and `ffprobe` for
//! basic file information.
//!
//! stderr is read while the process runs. The analysis pass keeps at most
//! [`ScanLimits`] worth of it and kills ffmpeg once either cap is passed. The
//! write pass only keeps a short tail for its error message.

use crate::{
    analyzer::{parse_measurement, LoudnessStatistics, ScanLimits},
    error::{LoudnessError, ParseError, Result},
    file_label,
    target::{analysis_filter, LinearDirective},
    tool::LoudnessTool,
};
use async_trait::async_trait;
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};

/// Most diagnostic text carried into an error message
pub const ERROR_TAIL_BYTES: usize = 4 * 1024;

#[derive(Debug, Clone)]
pub struct FfmpegTool {
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
    limits: ScanLimits,
}

impl FfmpegTool {
    /// Create a tool for the given ffmpeg executable.
    ///
    /// `ffprobe` is looked up next to it (or on `PATH` when `ffmpeg_path` is a
    /// bare command name).
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        let ffmpeg_path = ffmpeg_path.into();
        let ffprobe_path = match ffmpeg_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.join("ffprobe"),
            _ => PathBuf::from("ffprobe"),
        };
        Self {
            ffmpeg_path,
            ffprobe_path,
            limits: ScanLimits::default(),
        }
    }

    pub fn with_ffprobe_path(mut self, ffprobe_path: impl Into<PathBuf>) -> Self {
        self.ffprobe_path = ffprobe_path.into();
        self
    }

    pub fn with_limits(mut self, limits: ScanLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg_path
    }

    pub fn ffprobe_path(&self) -> &Path {
        &self.ffprobe_path
    }

    pub fn limits(&self) -> &ScanLimits {
        &self.limits
    }

    /// Arguments for the measurement pass
    pub fn analysis_args(input: &Path, target_lufs: f64) -> Vec<OsString> {
        vec![
            "-hide_banner".into(),
            "-nostats".into(),
            "-i".into(),
            input.into(),
            "-af".into(),
            analysis_filter(target_lufs).into(),
            "-f".into(),
            "null".into(),
            "-".into(),
        ]
    }

    /// Arguments for the linear-mode write pass
    pub fn write_args(
        input: &Path,
        output: &Path,
        directive: &LinearDirective<'_>,
    ) -> Vec<OsString> {
        vec![
            "-hide_banner".into(),
            "-nostats".into(),
            "-i".into(),
            input.into(),
            "-af".into(),
            directive.filter().into(),
            "-ar".into(),
            directive.sample_rate_hz.to_string().into(),
            "-b:a".into(),
            directive.bitrate().into(),
            output.into(),
            "-y".into(),
        ]
    }

    /// Probe an audio file to get container and stream information
    pub async fn probe_file(&self, input: &Path) -> Result<AudioFileInfo> {
        let label = file_label(input);
        let output = Command::new(&self.ffprobe_path)
            .arg("-v")
            .arg("quiet")
            .arg("-print_format")
            .arg("json")
            .arg("-show_format")
            .arg("-show_streams")
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| LoudnessError::analysis(&label, format!("failed to run ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(LoudnessError::analysis(&label, "Could not analyze file"));
        }

        let json_output = String::from_utf8_lossy(&output.stdout);
        let probe_data: serde_json::Value = serde_json::from_str(&json_output).map_err(|e| {
            LoudnessError::analysis(&label, format!("Failed to parse ffprobe output: {}", e))
        })?;

        Ok(AudioFileInfo::from_probe(&probe_data))
    }

    /// Start ffmpeg with stderr piped; stdout is discarded
    fn spawn_ffmpeg(&self, args: Vec<OsString>) -> std::io::Result<(Child, ChildStderr)> {
        tracing::debug!(
            ffmpeg = %self.ffmpeg_path.display(),
            args = ?args,
            "Running ffmpeg"
        );
        let mut child = Command::new(&self.ffmpeg_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("ffmpeg stderr was not captured"))?;
        Ok((child, stderr))
    }
}

#[async_trait]
impl LoudnessTool for FfmpegTool {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn is_available(&self) -> bool {
        let status = Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;

        match status {
            Ok(status) => status.success(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                tracing::warn!(
                    ffmpeg = %self.ffmpeg_path.display(),
                    error = %e,
                    "ffmpeg availability probe failed"
                );
                false
            }
        }
    }

    async fn analyze(&self, input: &Path, target_lufs: f64) -> Result<LoudnessStatistics> {
        let label = file_label(input);
        let (mut child, stderr) = self
            .spawn_ffmpeg(Self::analysis_args(input, target_lufs))
            .map_err(|e| LoudnessError::analysis(&label, format!("failed to run ffmpeg: {}", e)))?;

        // ffmpeg reports the measurement on stderr, same channel as its warnings
        let diagnostics = match collect_diagnostics(stderr, &self.limits).await {
            Ok(diagnostics) => diagnostics,
            Err(e) => {
                if let Err(kill_error) = child.kill().await {
                    tracing::debug!(file = %label, error = %kill_error, "Failed to stop ffmpeg");
                }
                return Err(LoudnessError::analysis(&label, e));
            }
        };

        let status = child.wait().await.map_err(|e| {
            LoudnessError::analysis(&label, format!("failed to wait for ffmpeg: {}", e))
        })?;

        if !status.success() {
            return Err(LoudnessError::analysis(
                &label,
                format!(
                    "ffmpeg exited with {}: {}",
                    status,
                    tail(&diagnostics, ERROR_TAIL_BYTES)
                ),
            ));
        }

        parse_measurement(&diagnostics, &self.limits)
            .map_err(|e| LoudnessError::analysis(&label, e))
    }

    async fn write(
        &self,
        input: &Path,
        output_path: &Path,
        directive: &LinearDirective<'_>,
    ) -> Result<()> {
        let label = file_label(input);
        let (mut child, stderr) = self
            .spawn_ffmpeg(Self::write_args(input, output_path, directive))
            .map_err(|e| {
                LoudnessError::normalization(&label, format!("failed to run ffmpeg: {}", e))
            })?;

        let diagnostics = read_tail(stderr, ERROR_TAIL_BYTES).await.map_err(|e| {
            LoudnessError::normalization(&label, format!("failed to read ffmpeg output: {}", e))
        })?;

        let status = child.wait().await.map_err(|e| {
            LoudnessError::normalization(&label, format!("failed to wait for ffmpeg: {}", e))
        })?;

        if !status.success() {
            return Err(LoudnessError::normalization(
                &label,
                format!("ffmpeg error: {}", diagnostics),
            ));
        }

        Ok(())
    }
}

/// Read a diagnostic stream to its end, failing as soon as it passes either
/// cap. At most `max_bytes + 1` bytes are ever held.
async fn collect_diagnostics<R>(
    reader: R,
    limits: &ScanLimits,
) -> std::result::Result<String, ParseError>
where
    R: AsyncRead + Unpin,
{
    let cap = limits.max_bytes.saturating_add(1);
    let mut reader = BufReader::new(reader.take(cap as u64));
    let mut collected = Vec::new();
    let mut lines = 0usize;

    loop {
        let read = reader.read_until(b'\n', &mut collected).await?;
        if read == 0 {
            break;
        }
        lines += 1;
        if lines > limits.max_lines {
            return Err(ParseError::LineLimitExceeded(limits.max_lines));
        }
        if collected.len() > limits.max_bytes {
            return Err(ParseError::ByteLimitExceeded(limits.max_bytes));
        }
    }

    Ok(String::from_utf8_lossy(&collected).into_owned())
}

/// Read a diagnostic stream to its end, keeping only its last `max_bytes`
async fn read_tail<R>(mut reader: R, max_bytes: usize) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut kept = Vec::new();
    let mut chunk = [0u8; 8192];

    loop {
        let read = reader.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        kept.extend_from_slice(&chunk[..read]);
        if kept.len() > max_bytes * 2 {
            kept.drain(..kept.len() - max_bytes);
        }
    }

    Ok(tail(&String::from_utf8_lossy(&kept), max_bytes).to_string())
}

/// The last `max_bytes` of `text`, starting at a line break when one falls
/// inside the kept part
fn tail(text: &str, max_bytes: usize) -> &str {
    let text = text.trim();
    if text.len() <= max_bytes {
        return text;
    }

    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    let kept = &text[start..];
    match kept.find('\n') {
        Some(newline) if newline + 1 < kept.len() => kept[newline + 1..].trim_start(),
        _ => kept,
    }
}

/// Basic information about an audio file, as reported by ffprobe
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioFileInfo {
    pub format: String,
    pub codec: Option<String>,
    pub duration_ms: u64,
    pub bitrate: Option<u64>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
}

impl AudioFileInfo {
    fn from_probe(probe_data: &serde_json::Value) -> Self {
        let format = probe_data
            .get("format")
            .and_then(|f| f.get("format_name"))
            .and_then(|n| n.as_str())
            .unwrap_or("unknown")
            .to_string();

        let duration_secs = probe_data
            .get("format")
            .and_then(|f| f.get("duration"))
            .and_then(|d| d.as_str())
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(0.0);

        let bitrate = probe_data
            .get("format")
            .and_then(|f| f.get("bit_rate"))
            .and_then(|b| b.as_str())
            .and_then(|s| s.parse::<u64>().ok());

        // First audio stream, falling back to the first stream of any kind
        let streams = probe_data.get("streams").and_then(|s| s.as_array());
        let stream = streams.and_then(|arr| {
            arr.iter()
                .find(|s| s.get("codec_type").and_then(|t| t.as_str()) == Some("audio"))
                .or_else(|| arr.first())
        });

        let codec = stream
            .and_then(|s| s.get("codec_name"))
            .and_then(|c| c.as_str())
            .map(str::to_string);

        let sample_rate = stream
            .and_then(|s| s.get("sample_rate"))
            .and_then(|sr| sr.as_str())
            .and_then(|s| s.parse::<u32>().ok());

        let channels = stream
            .and_then(|s| s.get("channels"))
            .and_then(serde_json::Value::as_u64)
            .map(|c| c as u32);

        Self {
            format,
            codec,
            duration_ms: (duration_secs * 1000.0).round() as u64,
            bitrate,
            sample_rate,
            channels,
        }
    }
}

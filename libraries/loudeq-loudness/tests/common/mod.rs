/// Shared test fixtures: a scripted loudness tool and file helpers
use async_trait::async_trait;
use loudeq_loudness::{
    CancellationToken, LinearDirective, LoudnessError, LoudnessStatistics, LoudnessTool, Result,
};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A loudness tool that answers from a script instead of running ffmpeg.
///
/// Files are addressed by file name. Successful writes copy the input to the
/// output path so callers can check which outputs exist.
#[derive(Default)]
pub struct ScriptedTool {
    pub unavailable: bool,
    pub analysis_failures: HashMap<String, String>,
    pub write_failures: HashMap<String, String>,
    pub delays: HashMap<String, Duration>,
    pub cancel_on_write: Option<(String, CancellationToken)>,
    pub calls: Mutex<Vec<String>>,
    pub directives: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub probes: AtomicUsize,
}

impl ScriptedTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn fail_analysis(mut self, file: &str, diagnostics: &str) -> Self {
        self.analysis_failures
            .insert(file.to_string(), diagnostics.to_string());
        self
    }

    pub fn fail_write(mut self, file: &str, diagnostics: &str) -> Self {
        self.write_failures
            .insert(file.to_string(), diagnostics.to_string());
        self
    }

    pub fn delay(mut self, file: &str, delay: Duration) -> Self {
        self.delays.insert(file.to_string(), delay);
        self
    }

    pub fn cancel_on_write(mut self, file: &str, token: CancellationToken) -> Self {
        self.cancel_on_write = Some((file.to_string(), token));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn touched_files(&self) -> HashSet<String> {
        self.calls()
            .iter()
            .filter_map(|c| c.split_once(':').map(|(_, f)| f.to_string()))
            .collect()
    }

    pub fn directives(&self) -> Vec<String> {
        self.directives.lock().unwrap().clone()
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

fn name_of(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

/// Statistics the scripted tool reports for every file it can measure
pub fn canned_statistics() -> LoudnessStatistics {
    LoudnessStatistics::new("-27.61", "-4.47", "18.06", "-39.20")
}

#[async_trait]
impl LoudnessTool for ScriptedTool {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn is_available(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        !self.unavailable
    }

    async fn analyze(&self, input: &Path, _target_lufs: f64) -> Result<LoudnessStatistics> {
        let name = name_of(input);
        self.calls.lock().unwrap().push(format!("analyze:{}", name));
        self.enter();
        if let Some(delay) = self.delays.get(&name) {
            tokio::time::sleep(*delay).await;
        }
        self.leave();

        match self.analysis_failures.get(&name) {
            Some(reason) => Err(LoudnessError::analysis(name, reason)),
            None => Ok(canned_statistics()),
        }
    }

    async fn write(
        &self,
        input: &Path,
        output: &Path,
        directive: &LinearDirective<'_>,
    ) -> Result<()> {
        let name = name_of(input);
        self.calls.lock().unwrap().push(format!("write:{}", name));
        self.directives.lock().unwrap().push(directive.filter());

        if let Some((file, token)) = &self.cancel_on_write {
            if *file == name {
                token.cancel();
            }
        }

        match self.write_failures.get(&name) {
            Some(stderr) => Err(LoudnessError::normalization(
                name,
                format!("ffmpeg error: {}", stderr),
            )),
            None => {
                std::fs::copy(input, output)?;
                Ok(())
            }
        }
    }
}

/// Create `names` as small files inside `dir`, returning their paths in order
pub fn create_inputs(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|name| {
            let path = dir.join(name);
            std::fs::write(&path, format!("fake audio for {}", name)).unwrap();
            path
        })
        .collect()
}

/// Write a mono 16-bit PCM WAV file containing a 1 kHz sine tone
pub fn create_sine_wav(path: &Path, amplitude: f32, duration_secs: u32) -> hound::Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 44100,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    let num_samples = spec.sample_rate * duration_secs;
    for i in 0..num_samples {
        let t = i as f32 / spec.sample_rate as f32;
        let sample = amplitude * (2.0 * std::f32::consts::PI * 1000.0 * t).sin();
        writer.write_sample((sample * f32::from(i16::MAX)) as i16)?;
    }
    writer.finalize()
}

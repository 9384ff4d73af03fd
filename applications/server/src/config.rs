/// Server configuration
use crate::error::{Result, ServerError};
use loudeq_loudness::{
    default_workers, EqualizerConfig, FfmpegTool, NormalizationTarget, ScanLimits,
    DEFAULT_MAX_DIAGNOSTIC_BYTES, DEFAULT_MAX_DIAGNOSTIC_LINES, EBU_R128_BROADCAST_LUFS,
    MAX_TARGET_LUFS, MIN_TARGET_LUFS,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_server")]
    pub server: ServerSettings,

    #[serde(default = "default_storage")]
    pub storage: StorageSettings,

    #[serde(default = "default_equalizer")]
    pub equalizer: EqualizerSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Upper bound on a whole upload request body
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageSettings {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Finished jobs kept on disk; older ones are pruned
    #[serde(default = "default_max_jobs")]
    pub max_jobs: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EqualizerSettings {
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Defaults to an ffprobe next to `ffmpeg_path`
    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,

    #[serde(default = "default_target_lufs")]
    pub target_lufs: f64,

    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_max_diagnostic_lines")]
    pub max_diagnostic_lines: usize,

    #[serde(default = "default_max_diagnostic_bytes")]
    pub max_diagnostic_bytes: usize,

    /// Lowercase extensions accepted for upload, without the dot
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl EqualizerSettings {
    /// Build the ffmpeg adapter these settings describe
    pub fn tool(&self) -> FfmpegTool {
        let tool = FfmpegTool::new(&self.ffmpeg_path).with_limits(ScanLimits {
            max_lines: self.max_diagnostic_lines,
            max_bytes: self.max_diagnostic_bytes,
        });
        match &self.ffprobe_path {
            Some(path) => tool.with_ffprobe_path(path),
            None => tool,
        }
    }

    pub fn equalizer_config(&self) -> EqualizerConfig {
        EqualizerConfig {
            target: NormalizationTarget::with_integrated_lufs(self.target_lufs),
            workers: self.workers,
        }
    }

    /// Whether `file_name` carries one of the allowed extensions
    pub fn accepts(&self, file_name: &str) -> bool {
        Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                self.allowed_extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}

impl ServerConfig {
    /// Load configuration from file and environment.
    ///
    /// An explicit `path` must exist; otherwise `config.toml` in the working
    /// directory is used when present. `LOUDEQ_`-prefixed variables override
    /// both, e.g. `LOUDEQ_EQUALIZER__WORKERS=4`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        match path {
            Some(path) => {
                settings = settings.add_source(config::File::from(path.to_path_buf()));
            }
            None => {
                let default_path = PathBuf::from("config.toml");
                if default_path.exists() {
                    settings = settings.add_source(config::File::from(default_path));
                }
            }
        }

        settings = settings.add_source(
            config::Environment::with_prefix("LOUDEQ")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("server.cors_origins")
                .with_list_parse_key("equalizer.allowed_extensions")
                .try_parsing(true),
        );

        let config = settings
            .build()
            .map_err(|e| ServerError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let equalizer = &self.equalizer;

        if equalizer.workers == 0 {
            return Err(ServerError::Config(
                "equalizer.workers must be at least 1".to_string(),
            ));
        }

        if equalizer.max_diagnostic_lines == 0 || equalizer.max_diagnostic_bytes == 0 {
            return Err(ServerError::Config(
                "diagnostic scan limits must be non-zero".to_string(),
            ));
        }

        if equalizer.allowed_extensions.is_empty() {
            return Err(ServerError::Config(
                "equalizer.allowed_extensions must not be empty".to_string(),
            ));
        }

        if !(MIN_TARGET_LUFS..=MAX_TARGET_LUFS).contains(&equalizer.target_lufs) {
            return Err(ServerError::Config(format!(
                "equalizer.target_lufs {} is outside {}..={} LUFS",
                equalizer.target_lufs, MIN_TARGET_LUFS, MAX_TARGET_LUFS
            )));
        }

        if self.storage.max_jobs == 0 {
            return Err(ServerError::Config(
                "storage.max_jobs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

// Default values
fn default_server() -> ServerSettings {
    ServerSettings {
        host: default_host(),
        port: default_port(),
        cors_origins: default_cors_origins(),
        max_upload_bytes: default_max_upload_bytes(),
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_max_upload_bytes() -> usize {
    512 * 1024 * 1024
}

fn default_storage() -> StorageSettings {
    StorageSettings {
        data_dir: default_data_dir(),
        max_jobs: default_max_jobs(),
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_max_jobs() -> usize {
    50
}

fn default_equalizer() -> EqualizerSettings {
    EqualizerSettings {
        ffmpeg_path: default_ffmpeg_path(),
        ffprobe_path: None,
        target_lufs: default_target_lufs(),
        workers: default_workers(),
        max_diagnostic_lines: default_max_diagnostic_lines(),
        max_diagnostic_bytes: default_max_diagnostic_bytes(),
        allowed_extensions: default_allowed_extensions(),
    }
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_target_lufs() -> f64 {
    EBU_R128_BROADCAST_LUFS
}

fn default_max_diagnostic_lines() -> usize {
    DEFAULT_MAX_DIAGNOSTIC_LINES
}

fn default_max_diagnostic_bytes() -> usize {
    DEFAULT_MAX_DIAGNOSTIC_BYTES
}

fn default_allowed_extensions() -> Vec<String> {
    vec!["mp3".to_string()]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            storage: default_storage(),
            equalizer: default_equalizer(),
        }
    }
}

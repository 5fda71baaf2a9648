//! Settings
//!
//! Loads pipeline and benchmark settings from YAML. Every field has a
//! default, so a config file only needs the values it changes.
//!
//! # Example YAML Format
//!
//! ```yaml
//! benchmark_dir: benchmarks
//! uploads_dir: static/uploads
//! model: small
//! language: null        # auto-detect
//! sample_interval_ms: 250
//! transcriber:
//!   command: whisper_timestamped {audio} --model {model} {language_flag} --output_dir {output_dir}
//!   output_file: "{output_dir}/{audio_name}.words.json"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::monitoring::SamplerConfig;

/// Default speech-to-text invocation; placeholders are filled per run.
pub const DEFAULT_TRANSCRIBE_COMMAND: &str = "whisper_timestamped {audio} --model {model} \
     {language_flag} --vad {vad} --accurate --output_format json --output_dir {output_dir}";

/// Where the default transcriber leaves its word-level JSON.
pub const DEFAULT_TRANSCRIPT_OUTPUT: &str = "{output_dir}/{audio_name}.words.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// How the speech-to-text program is invoked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriberSettings {
    /// Shell command template.
    ///
    /// Supported placeholders: `{audio}`, `{audio_name}`, `{model}`,
    /// `{language_flag}`, `{vad}`, `{output_dir}`
    pub command: String,
    /// Path template of the JSON transcript the command writes
    pub output_file: String,
}

impl Default for TranscriberSettings {
    fn default() -> Self {
        Self {
            command: DEFAULT_TRANSCRIBE_COMMAND.to_string(),
            output_file: DEFAULT_TRANSCRIPT_OUTPUT.to_string(),
        }
    }
}

/// Top-level application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory receiving benchmark records
    pub benchmark_dir: PathBuf,
    /// Directory holding one sub-directory per processed video
    pub uploads_dir: PathBuf,
    /// Speech-to-text model size (tiny, base, small, medium, large)
    pub model: String,
    /// Language hint; `None` lets the model detect it
    pub language: Option<String>,
    /// Voice activity detection for tighter word timestamps
    pub vad: bool,
    /// Also download the video stream, not just audio
    pub download_video: bool,
    pub sample_interval_ms: u64,
    pub cpu_window_ms: u64,
    /// Video downloader program
    pub downloader: String,
    pub transcriber: TranscriberSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            benchmark_dir: PathBuf::from("benchmarks"),
            uploads_dir: PathBuf::from("static").join("uploads"),
            model: "base".to_string(),
            language: Some("en".to_string()),
            vad: true,
            download_video: true,
            sample_interval_ms: 500,
            cpu_window_ms: 100,
            downloader: "yt-dlp".to_string(),
            transcriber: TranscriberSettings::default(),
        }
    }
}

impl Settings {
    /// Loads settings from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("Loading settings from: {}", path.display());

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        debug!("Settings YAML loaded ({} bytes)", content.len());
        Self::from_yaml(&content)
    }

    /// Parses and validates settings from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_yaml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "sample_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model must not be empty".to_string()));
        }
        if !self.transcriber.command.contains("{audio}") {
            return Err(ConfigError::Invalid(
                "transcriber.command must reference {audio}".to_string(),
            ));
        }
        Ok(())
    }

    /// Sampler timing derived from these settings.
    pub fn sampler_config(&self) -> SamplerConfig {
        SamplerConfig {
            interval: Duration::from_millis(self.sample_interval_ms),
            cpu_window: Duration::from_millis(self.cpu_window_ms),
        }
    }

    /// Name under which transcription runs are benchmarked.
    pub fn benchmark_name(&self) -> String {
        format!("whisper.transcribe.{}", self.model)
    }
}

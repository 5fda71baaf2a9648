//! Speech-to-Text Engines
//!
//! The engine itself is an external program. [`CommandTranscriber`] fills
//! a command template, runs it through `bash`, and reads back the JSON
//! transcript the program wrote.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::debug;

use super::model::Transcript;
use super::{run_command, PipelineError};
use crate::config::TranscriberSettings;

/// Turns an audio file into a timestamped transcript.
pub trait Transcriber {
    fn transcribe(&self, audio: &Path, language: Option<&str>) -> Result<Transcript, PipelineError>;
}

/// Runs a configurable speech-to-text command.
#[derive(Debug, Clone)]
pub struct CommandTranscriber {
    settings: TranscriberSettings,
    model: String,
    vad: bool,
}

impl CommandTranscriber {
    pub fn new(settings: TranscriberSettings, model: impl Into<String>, vad: bool) -> Self {
        Self {
            settings,
            model: model.into(),
            vad,
        }
    }

    /// Builds the shell command for one audio file.
    pub fn build_command(&self, audio: &Path, language: Option<&str>) -> String {
        let output_dir = output_dir_of(audio);
        let language_flag = language
            .map(|lang| format!("--language {}", shell_quote(lang)))
            .unwrap_or_default();

        self.settings
            .command
            .replace("{audio}", &shell_quote(&audio.to_string_lossy()))
            .replace("{audio_name}", &shell_quote(&file_name_of(audio)))
            .replace("{model}", &shell_quote(&self.model))
            .replace("{language_flag}", &language_flag)
            .replace("{vad}", if self.vad { "True" } else { "False" })
            .replace("{output_dir}", &shell_quote(&output_dir.to_string_lossy()))
    }

    /// Path of the transcript the command is expected to produce.
    pub fn output_path(&self, audio: &Path) -> PathBuf {
        let output_dir = output_dir_of(audio);
        PathBuf::from(
            self.settings
                .output_file
                .replace("{output_dir}", &output_dir.to_string_lossy())
                .replace("{audio_name}", &file_name_of(audio)),
        )
    }
}

impl Transcriber for CommandTranscriber {
    fn transcribe(&self, audio: &Path, language: Option<&str>) -> Result<Transcript, PipelineError> {
        if !audio.exists() {
            return Err(PipelineError::Transcription(format!(
                "audio file not found: {}",
                audio.display()
            )));
        }

        let script = self.build_command(audio, language);
        debug!("Transcription command: {}", script);

        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(&script);
        run_command(&mut cmd, "bash")?;

        let output = self.output_path(audio);
        let content = fs::read_to_string(&output).map_err(|e| {
            PipelineError::Transcription(format!(
                "transcript not produced at {}: {}",
                output.display(),
                e
            ))
        })?;

        Ok(serde_json::from_str(&content)?)
    }
}

fn output_dir_of(audio: &Path) -> PathBuf {
    match audio.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn file_name_of(audio: &Path) -> String {
    audio
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Quotes a value for safe interpolation into a `bash -c` script.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

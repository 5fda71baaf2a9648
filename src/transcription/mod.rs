//! Transcription Pipeline Module
//!
//! Downloads a video, extracts its audio and produces a word-level
//! timestamped transcript, benchmarking the speech-to-text step.
//!
//! # Structure
//!
//! - [`source`]: video metadata and stream downloads
//! - [`transcriber`]: speech-to-text engine invocation
//! - [`archive`]: per-video directories and stored transcripts
//! - [`service`]: the end-to-end pipeline
//! - [`model`]: transcript data structures

pub mod archive;
pub mod model;
pub mod service;
pub mod source;
pub mod transcriber;

use std::process::Command;

use log::error;
use thiserror::Error;

use crate::error::BenchmarkError;

pub use archive::TranscriptArchive;
pub use model::{Segment, Transcript, Word};
pub use service::{ProcessedVideo, TranscriptionService};
pub use source::{StreamKind, VideoSource, YtDlp};
pub use transcriber::{CommandTranscriber, Transcriber};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No video URL provided")]
    MissingUrl,
    #[error("'{0}' not found - is it installed and on PATH?")]
    ToolNotFound(String),
    #[error("'{program}' failed with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("Download failed: {0}")]
    Download(String),
    #[error("Transcription failed: {0}")]
    Transcription(String),
    #[error("Transcript not found: {0}")]
    TranscriptNotFound(String),
    #[error("Invalid video id: {0}")]
    InvalidVideoId(String),
    #[error("Benchmark error: {0}")]
    Benchmark(#[from] BenchmarkError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Runs an external program and returns its stdout.
///
/// A missing binary maps to [`PipelineError::ToolNotFound`]; a non-zero
/// exit to [`PipelineError::CommandFailed`] carrying stderr.
pub(crate) fn run_command(cmd: &mut Command, program: &str) -> Result<String, PipelineError> {
    let output = match cmd.output() {
        Ok(output) => output,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(PipelineError::ToolNotFound(program.to_string()))
        }
        Err(e) => return Err(e.into()),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        error!("'{}' failed with {}", program, output.status);
        if !stderr.is_empty() {
            error!("stderr:\n{}", stderr);
        }
        return Err(PipelineError::CommandFailed {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr,
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

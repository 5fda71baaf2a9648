//! Transcription Service
//!
//! End-to-end pipeline: video URL in, stored timestamped transcript out.
//! Only the speech-to-text call is benchmarked; downloads are not.

use std::path::PathBuf;

use log::info;
use serde::Serialize;
use uuid::Uuid;

use super::archive::TranscriptArchive;
use super::model::Transcript;
use super::source::{StreamKind, VideoSource, YtDlp};
use super::transcriber::{CommandTranscriber, Transcriber};
use super::PipelineError;
use crate::benchmark::BenchmarkRunner;
use crate::config::Settings;
use crate::error::RunError;

const VIDEO_FILE: &str = "video.mp4";
const AUDIO_FILE: &str = "audio.mp4";

/// Result of processing one video.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedVideo {
    pub video_id: Uuid,
    pub video_title: String,
    pub video_path: Option<PathBuf>,
    pub audio_path: PathBuf,
    pub transcript_path: PathBuf,
    pub word_count: usize,
}

/// Runs the download and transcription pipeline.
///
/// # Example
///
/// ```rust,no_run
/// use whisperbench::config::Settings;
/// use whisperbench::transcription::TranscriptionService;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut service = TranscriptionService::from_settings(Settings::default())?;
///     let processed = service.process("https://www.youtube.com/watch?v=jNQXAC9IVRw")?;
///     println!("Transcript: {}", processed.transcript_path.display());
///     Ok(())
/// }
/// ```
pub struct TranscriptionService<S, T> {
    settings: Settings,
    source: S,
    transcriber: T,
    runner: BenchmarkRunner,
    archive: TranscriptArchive,
}

impl TranscriptionService<YtDlp, CommandTranscriber> {
    /// Builds the default pipeline (`yt-dlp` + command transcriber).
    pub fn from_settings(settings: Settings) -> Result<Self, PipelineError> {
        let runner =
            BenchmarkRunner::with_config(&settings.benchmark_dir, settings.sampler_config())?;
        let source = YtDlp::new(settings.downloader.clone());
        let transcriber = CommandTranscriber::new(
            settings.transcriber.clone(),
            settings.model.clone(),
            settings.vad,
        );
        Ok(Self::new(settings, source, transcriber, runner))
    }
}

impl<S: VideoSource, T: Transcriber> TranscriptionService<S, T> {
    pub fn new(settings: Settings, source: S, transcriber: T, runner: BenchmarkRunner) -> Self {
        let archive = TranscriptArchive::new(settings.uploads_dir.clone());
        Self {
            settings,
            source,
            transcriber,
            runner,
            archive,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn archive(&self) -> &TranscriptArchive {
        &self.archive
    }

    pub fn runner(&self) -> &BenchmarkRunner {
        &self.runner
    }

    /// Downloads `url`, transcribes its audio and stores the transcript.
    pub fn process(&mut self, url: &str) -> Result<ProcessedVideo, PipelineError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(PipelineError::MissingUrl);
        }

        let (video_id, dir) = self.archive.create_entry()?;
        info!("Processing {} as {}", url, video_id);

        let video_title = self.source.title(url)?;
        info!("Title: {}", video_title);

        let video_path = if self.settings.download_video {
            Some(self.source.download(url, StreamKind::Video, &dir, VIDEO_FILE)?)
        } else {
            None
        };

        let audio_path = self.source.download(url, StreamKind::Audio, &dir, AUDIO_FILE)?;

        let transcript = self.transcribe(&audio_path)?;
        let transcript_path = self.archive.save(&video_id, &transcript)?;

        Ok(ProcessedVideo {
            video_id,
            video_title,
            video_path,
            audio_path,
            transcript_path,
            word_count: transcript.word_count(),
        })
    }

    /// Loads a previously stored transcript.
    pub fn load_transcript(&self, video_id: &str) -> Result<Transcript, PipelineError> {
        self.archive.load(video_id)
    }

    fn transcribe(&mut self, audio: &std::path::Path) -> Result<Transcript, PipelineError> {
        let name = self.settings.benchmark_name();
        let language = self.settings.language.as_deref();
        let transcriber = &self.transcriber;

        self.runner
            .run_named(&name, || transcriber.transcribe(audio, language))
            .map_err(|e| match e {
                RunError::Operation(e) => e,
                RunError::Persist(e) => PipelineError::Benchmark(e),
            })
    }
}

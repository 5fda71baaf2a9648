//! Video Sources
//!
//! Fetches video metadata and media streams. The default implementation
//! drives the `yt-dlp` command-line downloader.

use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info};

use super::{run_command, PipelineError};

/// Which stream of a video to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Highest resolution progressive mp4 (audio + video)
    Video,
    /// Audio only
    Audio,
}

impl StreamKind {
    /// `yt-dlp` format selector for this stream.
    fn format_selector(self) -> &'static str {
        match self {
            StreamKind::Video => "best[ext=mp4]/best",
            StreamKind::Audio => "bestaudio[ext=m4a]/bestaudio",
        }
    }
}

/// Provider of video metadata and downloadable streams.
pub trait VideoSource {
    fn title(&self, url: &str) -> Result<String, PipelineError>;

    /// Downloads one stream to `destination/filename` and returns the path.
    fn download(
        &self,
        url: &str,
        kind: StreamKind,
        destination: &Path,
        filename: &str,
    ) -> Result<PathBuf, PipelineError>;
}

/// [`VideoSource`] backed by `yt-dlp`.
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: String,
}

impl YtDlp {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

impl VideoSource for YtDlp {
    fn title(&self, url: &str) -> Result<String, PipelineError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(["--no-playlist", "--skip-download", "--print", "title", url]);

        let stdout = run_command(&mut cmd, &self.program)?;
        let title = stdout.lines().next().unwrap_or("").trim().to_string();

        if title.is_empty() {
            return Err(PipelineError::Download(format!("no title reported for {}", url)));
        }

        debug!("Video title: {}", title);
        Ok(title)
    }

    fn download(
        &self,
        url: &str,
        kind: StreamKind,
        destination: &Path,
        filename: &str,
    ) -> Result<PathBuf, PipelineError> {
        let target = destination.join(filename);
        info!("Downloading {:?} stream to {}", kind, target.display());

        let mut cmd = Command::new(&self.program);
        cmd.args(["--no-playlist", "--no-progress", "-f", kind.format_selector(), "-o"])
            .arg(&target)
            .arg(url);

        run_command(&mut cmd, &self.program)?;

        if !target.exists() {
            return Err(PipelineError::Download(format!(
                "{} reported success but {} was not created",
                self.program,
                target.display()
            )));
        }

        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_format_selectors() {
        assert!(StreamKind::Video.format_selector().contains("mp4"));
        assert!(StreamKind::Audio.format_selector().starts_with("bestaudio"));
    }

    #[test]
    fn test_missing_downloader() {
        let source = YtDlp::new("no-such-downloader-for-whisperbench");
        let result = source.title("https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert!(matches!(result, Err(PipelineError::ToolNotFound(_))));
    }

    #[test]
    fn test_missing_downloader_on_download() {
        let temp = tempdir().unwrap();
        let source = YtDlp::new("no-such-downloader-for-whisperbench");
        let result = source.download("https://example.com/v", StreamKind::Audio, temp.path(), "audio.mp4");
        assert!(matches!(result, Err(PipelineError::ToolNotFound(_))));
    }

    #[test]
    fn test_default_program() {
        assert_eq!(YtDlp::default().program(), "yt-dlp");
    }
}

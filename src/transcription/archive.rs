//! Processed Video Archive
//!
//! Each processed video gets its own directory, named by a UUID, under the
//! uploads directory:
//!
//! ```text
//! <uploads>/<video_id>/video.mp4
//! <uploads>/<video_id>/audio.mp4
//! <uploads>/<video_id>/transcript.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use uuid::Uuid;

use super::model::Transcript;
use super::PipelineError;

pub const TRANSCRIPT_FILE: &str = "transcript.json";

#[derive(Debug, Clone)]
pub struct TranscriptArchive {
    uploads_dir: PathBuf,
}

impl TranscriptArchive {
    pub fn new(uploads_dir: impl Into<PathBuf>) -> Self {
        Self {
            uploads_dir: uploads_dir.into(),
        }
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    /// Allocates a fresh id and creates its directory.
    pub fn create_entry(&self) -> Result<(Uuid, PathBuf), PipelineError> {
        let id = Uuid::new_v4();
        let dir = self.entry_dir(&id);
        fs::create_dir_all(&dir)?;
        Ok((id, dir))
    }

    pub fn entry_dir(&self, id: &Uuid) -> PathBuf {
        self.uploads_dir.join(id.to_string())
    }

    pub fn transcript_path(&self, id: &Uuid) -> PathBuf {
        self.entry_dir(id).join(TRANSCRIPT_FILE)
    }

    pub fn save(&self, id: &Uuid, transcript: &Transcript) -> Result<PathBuf, PipelineError> {
        let path = self.transcript_path(id);
        fs::write(&path, serde_json::to_string_pretty(transcript)?)?;
        info!("Transcript saved to: {}", path.display());
        Ok(path)
    }

    /// Loads a stored transcript.
    ///
    /// Only UUIDs are accepted as ids, so lookups cannot leave the uploads
    /// directory.
    pub fn load(&self, video_id: &str) -> Result<Transcript, PipelineError> {
        let id = Uuid::parse_str(video_id)
            .map_err(|_| PipelineError::InvalidVideoId(video_id.to_string()))?;

        let path = self.transcript_path(&id);
        if !path.exists() {
            return Err(PipelineError::TranscriptNotFound(video_id.to_string()));
        }

        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

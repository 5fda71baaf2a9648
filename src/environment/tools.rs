//! External Tool Detection
//!
//! The pipeline relies on programs it does not bundle: FFmpeg for audio
//! decoding, a downloader and a speech-to-text CLI.

use std::process::{Command, Stdio};

use log::{debug, info, warn};
use thiserror::Error;

/// Install hints shown when FFmpeg is missing.
const FFMPEG_HINTS: &[&str] = &[
    "Ubuntu/Debian: sudo apt-get install ffmpeg",
    "MacOS: brew install ffmpeg",
    "Windows: Download from https://www.ffmpeg.org/download.html",
];

/// One or more required programs could not be run.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("required tools not installed: {}", .0.join(", "))]
pub struct MissingTools(pub Vec<String>);

/// Returns true if `program` runs and exits successfully when asked for
/// its version.
///
/// FFmpeg-style `-version` is tried first, then `--version`.
pub fn check_tool(program: &str) -> bool {
    ["-version", "--version"].iter().any(|flag| {
        let status = Command::new(program)
            .arg(flag)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) => status.success(),
            Err(e) => {
                debug!("'{} {}' could not be run: {}", program, flag, e);
                false
            }
        }
    })
}

/// Checks every program and fails with the full list of missing ones.
pub fn require_tools(programs: &[&str]) -> Result<(), MissingTools> {
    let mut missing = Vec::new();

    for program in programs {
        if check_tool(program) {
            info!("✓ {} is installed", program);
            continue;
        }

        warn!("✗ {} is not installed", program);
        if *program == "ffmpeg" {
            warn!("Please install FFmpeg before running this command:");
            for hint in FFMPEG_HINTS {
                warn!("- {}", hint);
            }
        }
        missing.push(program.to_string());
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(MissingTools(missing))
    }
}

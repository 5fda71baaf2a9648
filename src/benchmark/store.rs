//! Benchmark Result Persistence
//!
//! Every record is written twice: to its own timestamped file and into a
//! cumulative log holding the whole history as one JSON list.
//!
//! The cumulative log is rewritten in full on each save. There is no
//! locking; concurrent writers race and the last one wins.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::{debug, info, warn};
use serde_json::Value;

use super::record::MetricsRecord;
use crate::error::BenchmarkError;

/// Prefix of per-run result files.
pub const RUN_FILE_PREFIX: &str = "whisper_benchmark_";

/// File name of the cumulative log.
pub const CUMULATIVE_LOG_FILE: &str = "whisper_benchmarks.json";

/// Writes metrics records under a single output directory.
#[derive(Debug, Clone)]
pub struct ResultStore {
    output_dir: PathBuf,
}

impl ResultStore {
    /// Opens a store, creating the output directory and its parents.
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self, BenchmarkError> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    /// Opens a store for reading only. Nothing is created on disk; a
    /// missing directory simply has an empty history.
    pub fn open(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn cumulative_log_path(&self) -> PathBuf {
        self.output_dir.join(CUMULATIVE_LOG_FILE)
    }

    /// Persists a record and returns the path of its per-run file.
    ///
    /// Per-run files are named with second resolution; two saves within
    /// the same second share a file and the later one wins.
    pub fn save(&self, record: &MetricsRecord) -> Result<PathBuf, BenchmarkError> {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let run_path = self
            .output_dir
            .join(format!("{}{}.json", RUN_FILE_PREFIX, timestamp));

        fs::write(&run_path, serde_json::to_string_pretty(record)?)?;
        info!("Benchmark results saved to: {}", run_path.display());

        let mut history = self.load_log()?;
        history.push(serde_json::to_value(record)?);

        let log_path = self.cumulative_log_path();
        fs::write(&log_path, serde_json::to_string_pretty(&history)?)?;
        info!(
            "Cumulative log updated: {} ({} records)",
            log_path.display(),
            history.len()
        );

        Ok(run_path)
    }

    /// Returns every record in the cumulative log that parses as a
    /// [`MetricsRecord`]. A missing or corrupt log yields an empty list.
    pub fn history(&self) -> Result<Vec<MetricsRecord>, BenchmarkError> {
        let entries = self.load_log()?;
        let total = entries.len();

        let records: Vec<MetricsRecord> = entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect();

        if records.len() < total {
            debug!(
                "Skipped {} of {} entries in {} that are not benchmark records",
                total - records.len(),
                total,
                self.cumulative_log_path().display()
            );
        }
        Ok(records)
    }

    /// Loads the raw cumulative log, treating corruption as an empty history.
    fn load_log(&self) -> Result<Vec<Value>, BenchmarkError> {
        let path = self.cumulative_log_path();

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<Vec<Value>>(&bytes) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                warn!(
                    "Cumulative log {} is not a valid record list ({}); starting a new history",
                    path.display(),
                    e
                );
                Ok(Vec::new())
            }
        }
    }
}

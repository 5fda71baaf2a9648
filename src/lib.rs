//! WhisperBench - Benchmarked Video Transcription
//!
//! Downloads a video, extracts its audio and produces a word-level
//! timestamped transcript, while recording CPU/GPU utilization for the
//! speech-to-text step.
//!
//! # Architecture
//!
//! The library is organized into these modules:
//!
//! - [`benchmark`]: Runs an operation under measurement and persists the results
//! - [`monitoring`]: Background CPU/GPU sampling
//! - [`transcription`]: Download and speech-to-text pipeline
//! - [`environment`]: Detection of required external tools
//! - [`config`]: YAML settings
//!
//! # Example
//!
//! ```rust,no_run
//! use whisperbench::BenchmarkRunner;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut runner = BenchmarkRunner::new("benchmarks")?;
//!
//!     // Any fallible call can be measured; its result comes back unchanged.
//!     let bytes = runner.run_named("read_audio", || std::fs::read("audio.mp4"))?;
//!     println!("{} bytes", bytes.len());
//!     Ok(())
//! }
//! ```

pub mod benchmark;
pub mod config;
pub mod environment;
pub mod error;
pub mod monitoring;
pub mod transcription;

// Re-export commonly used types
pub use benchmark::{BenchmarkRunner, MetricsRecord, ResultStore};
pub use config::Settings;
pub use error::{BenchmarkError, RunError};
pub use monitoring::{ResourceSampler, SamplerConfig};
pub use transcription::{PipelineError, TranscriptionService};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "WhisperBench";

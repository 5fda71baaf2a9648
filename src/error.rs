//! Error Types
//!
//! Errors raised by the benchmarking core. Failures of the operation being
//! measured are never converted into these; they travel through
//! [`RunError::Operation`] untouched.

use thiserror::Error;

/// Errors produced by the sampler, runner and result store.
#[derive(Debug, Error)]
pub enum BenchmarkError {
    /// No usable CPU utilization backend on this system.
    #[error("CPU monitoring is not available on this system: {0}")]
    CpuUnavailable(String),

    /// `start()` was called on a sampler that already has a worker.
    #[error("resource sampler is already running")]
    SamplerAlreadyRunning,

    /// The sampling worker panicked before it could hand back its samples.
    #[error("resource sampler thread panicked")]
    SamplerPanicked,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Outcome of a failed [`BenchmarkRunner`](crate::benchmark::BenchmarkRunner) run.
///
/// `Operation` carries the wrapped operation's own error exactly as it was
/// returned. `Persist` is only produced when the operation succeeded but its
/// metrics record could not be written.
#[derive(Debug, Error)]
pub enum RunError<E> {
    #[error("{0}")]
    Operation(E),
    #[error("failed to persist benchmark record: {0}")]
    Persist(#[source] BenchmarkError),
}

impl<E> RunError<E> {
    /// Returns the wrapped operation's error, if that is what failed.
    pub fn into_operation(self) -> Option<E> {
        match self {
            RunError::Operation(e) => Some(e),
            RunError::Persist(_) => None,
        }
    }

    pub fn is_operation(&self) -> bool {
        matches!(self, RunError::Operation(_))
    }
}

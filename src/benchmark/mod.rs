//! Benchmarking Module
//!
//! Measures a single long-running call and keeps a persistent history of
//! the measurements.
//!
//! # Architecture
//!
//! - [`runner`]: wraps an operation with sampling, timing and persistence
//! - [`record`]: the per-invocation metrics record and its summaries
//! - [`store`]: per-run files plus the cumulative JSON log

pub mod record;
pub mod runner;
pub mod store;

pub use record::{CpuSummary, GpuDeviceSummary, MetricsRecord};
pub use runner::BenchmarkRunner;
pub use store::ResultStore;

//! Resource Monitoring Module
//!
//! Provides utilities for sampling system resource usage while a
//! benchmarked operation runs.
//!
//! # Components
//!
//! - [`ResourceSampler`]: background CPU/GPU polling thread
//! - [`GpuReader`]: best-effort GPU backend (`nvidia-smi` or a no-op stub)

pub mod gpu;
pub mod resource;

pub use gpu::{detect_gpu_reader, GpuError, GpuReader, GpuSnapshot, NoGpu, NvidiaSmi};
pub use resource::{CpuReader, ResourceSampler, SamplerConfig, Samples};

//! Resource Usage Sampling
//!
//! Polls system-wide CPU utilization and (when available) GPU utilization
//! on a background thread while a long-running operation executes.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, warn};
use sysinfo::System;

use super::gpu::{detect_gpu_reader, GpuReader, GpuSnapshot};
use crate::error::BenchmarkError;

/// Default pause between sampling ticks.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// Default blocking window used to measure CPU utilization each tick.
pub const DEFAULT_CPU_WINDOW: Duration = Duration::from_millis(100);

/// Timing parameters for a [`ResourceSampler`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerConfig {
    /// Pause between the end of one tick and the start of the next
    pub interval: Duration,
    /// How long each CPU reading blocks to measure utilization
    pub cpu_window: Duration,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SAMPLE_INTERVAL,
            cpu_window: DEFAULT_CPU_WINDOW,
        }
    }
}

/// Time series collected by one sampling run.
///
/// `cpu[i]` and `gpu[i]` always belong to the same tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Samples {
    pub cpu: Vec<f64>,
    pub gpu: Vec<Vec<GpuSnapshot>>,
}

impl Samples {
    pub fn push(&mut self, cpu: f64, gpu: Vec<GpuSnapshot>) {
        self.cpu.push(cpu);
        self.gpu.push(gpu);
    }

    /// Number of ticks recorded.
    pub fn ticks(&self) -> usize {
        self.cpu.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cpu.is_empty()
    }
}

/// System-wide CPU utilization reader backed by `sysinfo`.
pub struct CpuReader {
    system: System,
    window: Duration,
}

impl CpuReader {
    /// Creates a reader, failing if the platform exposes no CPU statistics.
    pub fn new(window: Duration) -> Result<Self, BenchmarkError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(BenchmarkError::CpuUnavailable(format!(
                "unsupported platform '{}'",
                std::env::consts::OS
            )));
        }

        let mut system = System::new();
        system.refresh_cpu();

        if system.cpus().is_empty() {
            return Err(BenchmarkError::CpuUnavailable(
                "no CPUs reported by the system".to_string(),
            ));
        }

        Ok(Self { system, window })
    }

    /// Measures utilization over the configured window, blocking for its
    /// duration. Always returns a value in `0.0..=100.0`.
    pub fn read(&mut self) -> f64 {
        self.system.refresh_cpu();
        thread::sleep(self.window);
        self.system.refresh_cpu();

        let usage = f64::from(self.system.global_cpu_info().cpu_usage());
        if usage.is_finite() {
            usage.clamp(0.0, 100.0)
        } else {
            0.0
        }
    }
}

struct Worker {
    stop: Sender<()>,
    handle: JoinHandle<(CpuReader, Samples)>,
}

/// Background CPU/GPU sampler.
///
/// The worker thread owns its sample buffers for the whole run and hands
/// them back on [`stop_and_join`](Self::stop_and_join), so the caller never
/// observes a partially written series.
///
/// # Example
///
/// ```rust,ignore
/// use whisperbench::monitoring::{ResourceSampler, SamplerConfig};
///
/// let mut sampler = ResourceSampler::new(SamplerConfig::default())?;
/// sampler.start()?;
/// long_running_work();
/// let samples = sampler.stop_and_join()?;
/// println!("{} ticks", samples.ticks());
/// ```
pub struct ResourceSampler {
    config: SamplerConfig,
    cpu: Option<CpuReader>,
    gpu: Arc<dyn GpuReader>,
    worker: Option<Worker>,
}

impl ResourceSampler {
    /// Creates a sampler, detecting the GPU backend once.
    ///
    /// Fails only if CPU monitoring is unavailable.
    pub fn new(config: SamplerConfig) -> Result<Self, BenchmarkError> {
        Self::with_gpu_reader(config, detect_gpu_reader(config.interval))
    }

    /// Creates a sampler with an explicit GPU reader.
    pub fn with_gpu_reader(
        config: SamplerConfig,
        gpu: Arc<dyn GpuReader>,
    ) -> Result<Self, BenchmarkError> {
        let cpu = CpuReader::new(config.cpu_window)?;

        Ok(Self {
            config,
            cpu: Some(cpu),
            gpu,
            worker: None,
        })
    }

    pub fn config(&self) -> SamplerConfig {
        self.config
    }

    /// Number of GPU devices this sampler will query each tick.
    pub fn gpu_device_count(&self) -> usize {
        self.gpu.device_count()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Spawns the sampling thread and returns immediately.
    pub fn start(&mut self) -> Result<(), BenchmarkError> {
        if self.worker.is_some() {
            return Err(BenchmarkError::SamplerAlreadyRunning);
        }

        // The reader is lost if a previous worker panicked.
        let cpu = match self.cpu.take() {
            Some(cpu) => cpu,
            None => CpuReader::new(self.config.cpu_window)?,
        };
        let gpu = Arc::clone(&self.gpu);
        let interval = self.config.interval;
        let (stop_tx, stop_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("resource-sampler".to_string())
            .spawn(move || sample_loop(cpu, gpu, interval, stop_rx))?;

        self.worker = Some(Worker {
            stop: stop_tx,
            handle,
        });
        debug!("Resource sampler started (interval: {:?})", interval);
        Ok(())
    }

    /// Signals the worker to stop after its current tick and waits for it
    /// to exit. No sample is taken after this returns.
    ///
    /// Returns empty samples if the sampler was not running.
    pub fn stop_and_join(&mut self) -> Result<Samples, BenchmarkError> {
        let Some(worker) = self.worker.take() else {
            return Ok(Samples::default());
        };

        // A send error means the worker already exited; join still applies.
        let _ = worker.stop.send(());

        let (cpu, samples) = worker
            .handle
            .join()
            .map_err(|_| BenchmarkError::SamplerPanicked)?;

        self.cpu = Some(cpu);
        debug!("Resource sampler stopped after {} tick(s)", samples.ticks());
        Ok(samples)
    }
}

impl Drop for ResourceSampler {
    fn drop(&mut self) {
        if self.worker.is_some() {
            if let Err(e) = self.stop_and_join() {
                warn!("Resource sampler did not shut down cleanly: {}", e);
            }
        }
    }
}

fn sample_loop(
    mut cpu: CpuReader,
    gpu: Arc<dyn GpuReader>,
    interval: Duration,
    stop: Receiver<()>,
) -> (CpuReader, Samples) {
    let mut samples = Samples::default();

    loop {
        match stop.try_recv() {
            Err(TryRecvError::Empty) => {}
            Ok(()) | Err(TryRecvError::Disconnected) => break,
        }

        let cpu_usage = cpu.read();
        let gpu_usage = gpu.read();
        samples.push(cpu_usage, gpu_usage);

        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    (cpu, samples)
}

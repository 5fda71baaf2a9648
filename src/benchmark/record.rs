//! Metrics Record
//!
//! The structured result of one benchmarked invocation: timing, the raw
//! resource time series and the summaries derived from it.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::monitoring::{GpuSnapshot, Samples};

/// Average and peak CPU utilization over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuSummary {
    pub avg: f64,
    pub max: f64,
}

impl CpuSummary {
    /// Summarizes CPU readings. Both fields are zero when there are none.
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let sum: f64 = samples.iter().sum();
        let max = samples.iter().copied().fold(f64::MIN, f64::max);

        Self {
            avg: sum / samples.len() as f64,
            max,
        }
    }
}

/// Aggregated readings for one GPU device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuDeviceSummary {
    pub compute_util_avg: f64,
    pub compute_util_max: f64,
    pub memory_util_avg: f64,
    pub memory_util_max: f64,
    pub memory_used_avg: f64,
    /// Capacity from the first reading of this device
    pub memory_total: u64,
}

#[derive(Default)]
struct DeviceAccumulator {
    count: usize,
    compute_sum: f64,
    compute_max: f64,
    memory_util_sum: f64,
    memory_util_max: f64,
    memory_used_sum: f64,
    memory_total: Option<u64>,
}

impl DeviceAccumulator {
    fn add(&mut self, snap: &GpuSnapshot) {
        if self.count == 0 {
            self.compute_max = snap.compute_util_pct;
            self.memory_util_max = snap.memory_util_pct;
        }
        self.count += 1;
        self.compute_sum += snap.compute_util_pct;
        self.compute_max = self.compute_max.max(snap.compute_util_pct);
        self.memory_util_sum += snap.memory_util_pct;
        self.memory_util_max = self.memory_util_max.max(snap.memory_util_pct);
        self.memory_used_sum += snap.memory_used_bytes as f64;
        self.memory_total.get_or_insert(snap.memory_total_bytes);
    }

    fn finish(self) -> GpuDeviceSummary {
        let n = self.count as f64;
        GpuDeviceSummary {
            compute_util_avg: self.compute_sum / n,
            compute_util_max: self.compute_max,
            memory_util_avg: self.memory_util_sum / n,
            memory_util_max: self.memory_util_max,
            memory_used_avg: self.memory_used_sum / n,
            memory_total: self.memory_total.unwrap_or(0),
        }
    }
}

/// Key used for a device in [`MetricsRecord::gpu_summary`].
pub fn gpu_key(device_index: u32) -> String {
    format!("gpu_{}", device_index)
}

/// Groups every per-tick snapshot by device and aggregates each device.
///
/// Returns `None` when no tick reported any device.
pub fn summarize_gpu(readings: &[Vec<GpuSnapshot>]) -> Option<BTreeMap<String, GpuDeviceSummary>> {
    let mut devices: BTreeMap<u32, DeviceAccumulator> = BTreeMap::new();

    for snap in readings.iter().flatten() {
        devices.entry(snap.device_index).or_default().add(snap);
    }

    if devices.is_empty() {
        return None;
    }

    Some(
        devices
            .into_iter()
            .map(|(index, acc)| (gpu_key(index), acc.finish()))
            .collect(),
    )
}

/// One benchmarked invocation.
///
/// Created when the run starts, filled in by the runner once the operation
/// returns, then handed to the store and never modified again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub operation_name: String,
    pub started_at: DateTime<Local>,
    #[serde(default)]
    pub cpu_samples: Vec<f64>,
    #[serde(default)]
    pub gpu_samples: Vec<Vec<GpuSnapshot>>,
    #[serde(default)]
    pub execution_time_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub cpu_summary: CpuSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_summary: Option<BTreeMap<String, GpuDeviceSummary>>,
}

impl MetricsRecord {
    /// Creates an empty record stamped with the current time.
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            started_at: Local::now(),
            cpu_samples: Vec::new(),
            gpu_samples: Vec::new(),
            execution_time_seconds: 0.0,
            error: None,
            cpu_summary: CpuSummary::default(),
            gpu_summary: None,
        }
    }

    /// Attaches the collected samples and outcome, computing summaries.
    pub fn finalize(&mut self, samples: Samples, elapsed: Duration, error: Option<String>) {
        self.cpu_summary = CpuSummary::from_samples(&samples.cpu);
        self.gpu_summary = summarize_gpu(&samples.gpu);
        self.cpu_samples = samples.cpu;
        self.gpu_samples = samples.gpu;
        self.execution_time_seconds = elapsed.as_secs_f64();
        self.error = error;
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

//! GPU Utilization Readers
//!
//! GPU monitoring is best-effort. The backend is probed once, and the
//! result is either a live [`NvidiaSmi`] reader or the [`NoGpu`] stub, both
//! behind the same [`GpuReader`] interface.

use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Program queried for NVIDIA device statistics.
const NVIDIA_SMI: &str = "nvidia-smi";

/// Fields requested from `nvidia-smi`, in column order.
const QUERY_FIELDS: &str = "index,utilization.gpu,utilization.memory,memory.used,memory.total";

const BYTES_PER_MIB: u64 = 1024 * 1024;

/// Longest a single `nvidia-smi` call may run before it is killed.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_millis(500);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Error, Debug)]
pub enum GpuError {
    #[error("nvidia-smi not found - is the NVIDIA driver installed?")]
    NotFound,
    #[error("Failed to execute nvidia-smi: {0}")]
    ExecutionFailed(#[from] std::io::Error),
    #[error("nvidia-smi exited with status {0}")]
    QueryFailed(String),
    #[error("Unexpected nvidia-smi output: {0}")]
    Parse(String),
    #[error("nvidia-smi did not answer within {0:?}")]
    Timeout(Duration),
}

/// Utilization of a single device at one sampling tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuSnapshot {
    pub device_index: u32,
    /// Compute utilization percentage (0-100)
    pub compute_util_pct: f64,
    /// Memory controller utilization percentage (0-100)
    pub memory_util_pct: f64,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
}

/// Source of per-tick GPU readings.
pub trait GpuReader: Send + Sync {
    /// Number of devices discovered when the reader was created.
    fn device_count(&self) -> usize;

    /// Reads every device. Returns an empty list on any failure.
    fn read(&self) -> Vec<GpuSnapshot>;
}

/// Stub used when no GPU backend could be initialized.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoGpu;

impl GpuReader for NoGpu {
    fn device_count(&self) -> usize {
        0
    }

    fn read(&self) -> Vec<GpuSnapshot> {
        Vec::new()
    }
}

/// Reads NVIDIA devices through the `nvidia-smi` query interface.
#[derive(Debug)]
pub struct NvidiaSmi {
    program: String,
    device_count: usize,
    timeout: Duration,
}

impl NvidiaSmi {
    /// Probes for devices using the default `nvidia-smi` binary.
    pub fn probe() -> Result<Self, GpuError> {
        Self::probe_with(NVIDIA_SMI, DEFAULT_QUERY_TIMEOUT)
    }

    /// Probes for devices using a specific `nvidia-smi` binary.
    ///
    /// Every call to the program, the probe included, is killed after
    /// `timeout`. Fails if the program is missing, errors, hangs, or
    /// reports no devices.
    pub fn probe_with(program: &str, timeout: Duration) -> Result<Self, GpuError> {
        let stdout = run_query(program, &["--list-gpus"], timeout)?;
        let device_count = stdout.lines().filter(|l| !l.trim().is_empty()).count();

        if device_count == 0 {
            return Err(GpuError::Parse("no devices listed".to_string()));
        }

        Ok(Self {
            program: program.to_string(),
            device_count,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn query(&self) -> Result<Vec<GpuSnapshot>, GpuError> {
        let query = format!("--query-gpu={}", QUERY_FIELDS);
        let stdout = run_query(
            &self.program,
            &[query.as_str(), "--format=csv,noheader,nounits"],
            self.timeout,
        )?;
        parse_query_output(&stdout)
    }
}

impl GpuReader for NvidiaSmi {
    fn device_count(&self) -> usize {
        self.device_count
    }

    fn read(&self) -> Vec<GpuSnapshot> {
        match self.query() {
            Ok(snapshots) => snapshots,
            Err(e) => {
                debug!("GPU read failed, recording empty tick: {}", e);
                Vec::new()
            }
        }
    }
}

/// Detects the GPU backend once and returns the reader to use for the
/// lifetime of a sampler.
///
/// `timeout` bounds each query, so one tick can never stall for longer
/// than that on the GPU side.
pub fn detect_gpu_reader(timeout: Duration) -> Arc<dyn GpuReader> {
    match NvidiaSmi::probe_with(NVIDIA_SMI, timeout) {
        Ok(reader) => {
            info!("GPU monitoring enabled ({} device(s))", reader.device_count());
            Arc::new(reader)
        }
        Err(e) => {
            warn!("GPU monitoring disabled: {}", e);
            Arc::new(NoGpu)
        }
    }
}

fn run_query(program: &str, args: &[&str], timeout: Duration) -> Result<String, GpuError> {
    let spawned = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(GpuError::NotFound),
        Err(e) => return Err(GpuError::ExecutionFailed(e)),
    };

    let deadline = Instant::now() + timeout;
    while child.try_wait()?.is_none() {
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(GpuError::Timeout(timeout));
        }
        thread::sleep(POLL_INTERVAL);
    }

    let output = child.wait_with_output()?;
    if !output.status.success() {
        return Err(GpuError::QueryFailed(output.status.to_string()));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parses `--format=csv,noheader,nounits` output for [`QUERY_FIELDS`].
///
/// Memory columns are reported in MiB and converted to bytes.
pub fn parse_query_output(text: &str) -> Result<Vec<GpuSnapshot>, GpuError> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(parse_line)
        .collect()
}

fn parse_line(line: &str) -> Result<GpuSnapshot, GpuError> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();

    let [index, gpu_util, mem_util, mem_used, mem_total] = fields.as_slice() else {
        return Err(GpuError::Parse(format!("expected 5 columns in '{}'", line)));
    };

    Ok(GpuSnapshot {
        device_index: parse_field(index, line)?,
        compute_util_pct: parse_field(gpu_util, line)?,
        memory_util_pct: parse_field(mem_util, line)?,
        memory_used_bytes: parse_field::<u64>(mem_used, line)? * BYTES_PER_MIB,
        memory_total_bytes: parse_field::<u64>(mem_total, line)? * BYTES_PER_MIB,
    })
}

fn parse_field<T: std::str::FromStr>(value: &str, line: &str) -> Result<T, GpuError> {
    value
        .parse()
        .map_err(|_| GpuError::Parse(format!("invalid value '{}' in '{}'", value, line)))
}

/// Writes an executable stand-in for `nvidia-smi` that lists one device
/// and runs `query_body` for any other invocation.
#[cfg(all(test, unix))]
pub(crate) fn write_fake_smi(dir: &std::path::Path, query_body: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-nvidia-smi");
    let script = format!(
        "#!/bin/sh\nif [ \"$1\" = \"--list-gpus\" ]; then\n  echo 'GPU 0: Fake GPU (UUID: GPU-0000)'\n  exit 0\nfi\n{}\n",
        query_body
    );
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_two_devices() {
        let out = "0, 45, 12, 2048, 8192\n1, 90, 60, 6144, 16384\n";
        let snaps = parse_query_output(out).unwrap();

        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].device_index, 0);
        assert_eq!(snaps[0].compute_util_pct, 45.0);
        assert_eq!(snaps[0].memory_util_pct, 12.0);
        assert_eq!(snaps[0].memory_used_bytes, 2048 * BYTES_PER_MIB);
        assert_eq!(snaps[1].memory_total_bytes, 16384 * BYTES_PER_MIB);
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_query_output("").unwrap().is_empty());
        assert!(parse_query_output("\n  \n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_not_available_field() {
        let out = "0, [N/A], 12, 2048, 8192";
        assert!(matches!(parse_query_output(out), Err(GpuError::Parse(_))));
    }

    #[test]
    fn test_parse_wrong_column_count() {
        let out = "0, 45, 12";
        assert!(matches!(parse_query_output(out), Err(GpuError::Parse(_))));
    }

    #[test]
    fn test_no_gpu_stub() {
        let reader = NoGpu;
        assert_eq!(reader.device_count(), 0);
        assert!(reader.read().is_empty());
    }

    #[test]
    fn test_probe_missing_program() {
        let result =
            NvidiaSmi::probe_with("definitely-not-a-real-nvidia-smi", DEFAULT_QUERY_TIMEOUT);
        assert!(matches!(result, Err(GpuError::NotFound)));
    }

    #[cfg(unix)]
    fn fake_reader(query_body: &str, timeout: Duration) -> (tempfile::TempDir, NvidiaSmi) {
        let temp = tempfile::tempdir().unwrap();
        let program = write_fake_smi(temp.path(), query_body);
        let reader = NvidiaSmi::probe_with(program.to_str().unwrap(), timeout).unwrap();
        (temp, reader)
    }

    #[cfg(unix)]
    #[test]
    fn test_read_parses_fake_query() {
        let (_temp, reader) = fake_reader("echo '0, 45, 12, 2048, 8192'", DEFAULT_QUERY_TIMEOUT);
        assert_eq!(reader.device_count(), 1);

        let snaps = reader.read();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].compute_util_pct, 45.0);
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_query_is_empty_tick() {
        let (_temp, reader) = fake_reader("exit 3", DEFAULT_QUERY_TIMEOUT);
        assert!(matches!(reader.query(), Err(GpuError::QueryFailed(_))));
        assert_eq!(reader.read(), vec![]);
    }

    #[cfg(unix)]
    #[test]
    fn test_not_available_field_is_empty_tick() {
        let (_temp, reader) = fake_reader("echo '0, [N/A], 12, 2048, 8192'", DEFAULT_QUERY_TIMEOUT);
        assert!(matches!(reader.query(), Err(GpuError::Parse(_))));
        assert!(reader.read().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_query_is_killed_at_timeout() {
        let timeout = Duration::from_millis(200);
        let (_temp, reader) = fake_reader("exec sleep 5", timeout);
        assert_eq!(reader.timeout(), timeout);

        let start = Instant::now();
        assert!(matches!(reader.query(), Err(GpuError::Timeout(_))));
        assert!(reader.read().is_empty());

        // Two timed-out calls, well short of one full sleep.
        assert!(start.elapsed() < Duration::from_secs(2), "took {:?}", start.elapsed());
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_probe_times_out() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("hung-smi");
        std::fs::write(&path, "#!/bin/sh\nexec sleep 5\n").unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let start = Instant::now();
        let result = NvidiaSmi::probe_with(path.to_str().unwrap(), Duration::from_millis(150));
        assert!(matches!(result, Err(GpuError::Timeout(_))));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_detect_always_returns_reader() {
        let reader = detect_gpu_reader(DEFAULT_QUERY_TIMEOUT);
        if reader.device_count() == 0 {
            assert!(reader.read().is_empty());
        }
    }
}

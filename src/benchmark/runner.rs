//! Benchmark Runner
//!
//! Runs an operation under resource sampling and persists one
//! [`MetricsRecord`] per invocation, whether the operation succeeds,
//! returns an error, or panics.

use std::any::Any;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use log::{error, info, warn};

use super::record::MetricsRecord;
use super::store::ResultStore;
use crate::error::{BenchmarkError, RunError};
use crate::monitoring::{GpuReader, ResourceSampler, SamplerConfig, Samples};

/// Wraps operations with timing, resource sampling and result persistence.
///
/// The operation runs on the caller's thread. Its result or error is
/// returned unchanged; the metrics record is a side effect visible only in
/// the store's output directory.
///
/// # Example
///
/// ```rust,no_run
/// use whisperbench::benchmark::BenchmarkRunner;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut runner = BenchmarkRunner::new("benchmarks")?;
///     let words = runner.run_named("count_words", || {
///         Ok::<_, std::io::Error>(std::fs::read_to_string("notes.txt")?.split_whitespace().count())
///     })?;
///     println!("{} words", words);
///     Ok(())
/// }
/// ```
pub struct BenchmarkRunner {
    sampler: ResourceSampler,
    store: ResultStore,
}

impl BenchmarkRunner {
    /// Creates a runner with default sampling that saves into `output_dir`.
    pub fn new(output_dir: impl AsRef<Path>) -> Result<Self, BenchmarkError> {
        Self::with_config(output_dir, SamplerConfig::default())
    }

    /// Creates a runner with custom sampler timing.
    pub fn with_config(
        output_dir: impl AsRef<Path>,
        config: SamplerConfig,
    ) -> Result<Self, BenchmarkError> {
        let sampler = ResourceSampler::new(config)?;
        let store = ResultStore::new(output_dir.as_ref())?;
        Ok(Self::from_parts(sampler, store))
    }

    /// Creates a runner with an explicit GPU reader.
    pub fn with_gpu_reader(
        output_dir: impl AsRef<Path>,
        config: SamplerConfig,
        gpu: Arc<dyn GpuReader>,
    ) -> Result<Self, BenchmarkError> {
        let sampler = ResourceSampler::with_gpu_reader(config, gpu)?;
        let store = ResultStore::new(output_dir.as_ref())?;
        Ok(Self::from_parts(sampler, store))
    }

    pub fn from_parts(sampler: ResourceSampler, store: ResultStore) -> Self {
        Self { sampler, store }
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Runs `op`, naming the record after the operation's type.
    pub fn run<F, T, E>(&mut self, op: F) -> Result<T, RunError<E>>
    where
        F: FnOnce() -> Result<T, E>,
        E: Display,
    {
        let name = operation_name::<F>();
        self.run_named(&name, op)
    }

    /// Runs `op` under measurement and records the result as `name`.
    ///
    /// * `Ok(value)` - the operation's value, after its record was saved
    /// * `Err(RunError::Operation(e))` - the operation's own error
    /// * `Err(RunError::Persist(e))` - the operation succeeded but saving failed
    ///
    /// A panic inside `op` is recorded and then resumed.
    pub fn run_named<F, T, E>(&mut self, name: &str, op: F) -> Result<T, RunError<E>>
    where
        F: FnOnce() -> Result<T, E>,
        E: Display,
    {
        let mut record = MetricsRecord::new(name);

        if let Err(e) = self.sampler.start() {
            warn!("Resource sampling unavailable for '{}': {}", name, e);
        }

        let start = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(op));
        let elapsed = start.elapsed();

        let samples = self.collect_samples(name);

        match outcome {
            Ok(Ok(value)) => {
                record.finalize(samples, elapsed, None);
                info!(
                    "'{}' completed in {:.2}s (CPU avg {:.1}%, max {:.1}%)",
                    name,
                    record.execution_time_seconds,
                    record.cpu_summary.avg,
                    record.cpu_summary.max
                );
                self.store.save(&record).map_err(RunError::Persist)?;
                Ok(value)
            }
            Ok(Err(e)) => {
                let description = e.to_string();
                warn!("'{}' failed after {:.2?}: {}", name, elapsed, description);
                record.finalize(samples, elapsed, Some(description));
                self.save_after_failure(&record);
                Err(RunError::Operation(e))
            }
            Err(payload) => {
                let description = format!("panicked: {}", panic_message(payload.as_ref()));
                warn!("'{}' {} after {:.2?}", name, description, elapsed);
                record.finalize(samples, elapsed, Some(description));
                self.save_after_failure(&record);
                panic::resume_unwind(payload)
            }
        }
    }

    fn collect_samples(&mut self, name: &str) -> Samples {
        match self.sampler.stop_and_join() {
            Ok(samples) => samples,
            Err(e) => {
                warn!("Discarding resource samples for '{}': {}", name, e);
                Samples::default()
            }
        }
    }

    /// The operation's failure takes precedence over a persistence error.
    fn save_after_failure(&self, record: &MetricsRecord) {
        if let Err(e) = self.store.save(record) {
            error!(
                "Failed to persist benchmark record for '{}': {}",
                record.operation_name, e
            );
        }
    }
}

/// Derives a record name from the operation's type, dropping closure
/// markers so `my_mod::work::{{closure}}` becomes `my_mod::work`.
pub fn operation_name<F>() -> String {
    let mut name = std::any::type_name::<F>();
    while let Some(stripped) = name.strip_suffix("::{{closure}}") {
        name = stripped;
    }
    name.to_string()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::store::{CUMULATIVE_LOG_FILE, RUN_FILE_PREFIX};
    use crate::monitoring::{GpuSnapshot, NoGpu};
    use std::convert::Infallible;
    use std::fs;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;
    use tempfile::tempdir;

    #[derive(Debug, PartialEq)]
    struct TranscribeError(String);

    impl Display for TranscribeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "transcription failed: {}", self.0)
        }
    }

    /// Replays a fixed script of readings, then reports nothing.
    struct ScriptedGpu {
        ticks: Mutex<Vec<Vec<GpuSnapshot>>>,
    }

    impl ScriptedGpu {
        fn new(mut ticks: Vec<Vec<GpuSnapshot>>) -> Self {
            ticks.reverse();
            Self {
                ticks: Mutex::new(ticks),
            }
        }
    }

    impl GpuReader for ScriptedGpu {
        fn device_count(&self) -> usize {
            2
        }

        fn read(&self) -> Vec<GpuSnapshot> {
            self.ticks.lock().unwrap().pop().unwrap_or_default()
        }
    }

    fn snap(index: u32, compute: f64, total: u64) -> GpuSnapshot {
        GpuSnapshot {
            device_index: index,
            compute_util_pct: compute,
            memory_util_pct: compute / 2.0,
            memory_used_bytes: 1000,
            memory_total_bytes: total,
        }
    }

    fn runner_in(dir: &Path) -> BenchmarkRunner {
        BenchmarkRunner::with_gpu_reader(dir, SamplerConfig::default(), Arc::new(NoGpu)).unwrap()
    }

    fn log_entries(dir: &Path) -> Vec<serde_json::Value> {
        let content = fs::read_to_string(dir.join(CUMULATIVE_LOG_FILE)).unwrap();
        serde_json::from_str(&content).unwrap()
    }

    fn run_file_count(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .starts_with(RUN_FILE_PREFIX)
            })
            .count()
    }

    #[test]
    fn test_success_returns_value_unchanged() {
        let temp = tempdir().unwrap();
        let mut runner = runner_in(temp.path());

        let result = runner.run_named("add", || Ok::<_, Infallible>(2 + 2));
        assert_eq!(result.unwrap(), 4);

        let entries = log_entries(temp.path());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["operation_name"], "add");
        assert!(entries[0].get("error").is_none());
        assert_eq!(run_file_count(temp.path()), 1);
    }

    #[test]
    fn test_sleep_scenario() {
        let temp = tempdir().unwrap();
        let mut runner = runner_in(temp.path());

        let before = Instant::now();
        runner
            .run_named("op", || {
                thread::sleep(Duration::from_millis(1200));
                Ok::<_, Infallible>(())
            })
            .unwrap();
        let wall = before.elapsed().as_secs_f64();

        let history = runner.store().history().unwrap();
        let record = &history[0];
        assert!(
            (2..=3).contains(&record.cpu_samples.len()),
            "got {} samples",
            record.cpu_samples.len()
        );
        assert_eq!(record.cpu_samples.len(), record.gpu_samples.len());
        assert!((record.execution_time_seconds - 1.2).abs() < 0.2);
        assert!(record.execution_time_seconds <= wall);
        assert!(record.gpu_summary.is_none());
    }

    #[test]
    fn test_error_is_returned_and_recorded() {
        let temp = tempdir().unwrap();
        let mut runner = runner_in(temp.path());

        let result: Result<(), _> = runner.run_named("transcribe", || {
            Err(TranscribeError("model missing".to_string()))
        });

        let err = result.unwrap_err().into_operation().unwrap();
        assert_eq!(err, TranscribeError("model missing".to_string()));

        let history = runner.store().history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(
            history[0].error.as_deref(),
            Some("transcription failed: model missing")
        );
        assert!(history[0].execution_time_seconds >= 0.0);
        assert_eq!(run_file_count(temp.path()), 1);
    }

    #[test]
    fn test_panic_is_recorded_and_resumed() {
        let temp = tempdir().unwrap();
        let dir = temp.path().to_path_buf();

        let caught = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut runner = runner_in(&dir);
            let _ = runner.run_named("explode", || -> Result<(), Infallible> {
                panic!("decoder crashed")
            });
        }));

        let payload = caught.unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "decoder crashed");

        let entries = log_entries(&dir);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["error"], "panicked: decoder crashed");
    }

    #[test]
    fn test_gpu_summary_from_scripted_ticks() {
        let temp = tempdir().unwrap();
        let gpu = ScriptedGpu::new(vec![
            vec![snap(0, 10.0, 4096), snap(1, 80.0, 8192)],
            vec![snap(0, 20.0, 4096), snap(1, 60.0, 8192)],
            vec![snap(0, 30.0, 4096), snap(1, 40.0, 8192)],
        ]);
        let config = SamplerConfig {
            interval: Duration::from_millis(20),
            cpu_window: Duration::from_millis(10),
        };
        let mut runner = BenchmarkRunner::with_gpu_reader(temp.path(), config, Arc::new(gpu)).unwrap();

        runner
            .run_named("gpu", || {
                thread::sleep(Duration::from_millis(300));
                Ok::<_, Infallible>(())
            })
            .unwrap();

        let history = runner.store().history().unwrap();
        let record = &history[0];
        let summary = record.gpu_summary.as_ref().unwrap();
        assert!((summary["gpu_0"].compute_util_avg - 20.0).abs() < 1e-9);
        assert_eq!(summary["gpu_0"].compute_util_max, 30.0);
        assert_eq!(summary["gpu_1"].memory_total, 8192);
        // Ticks after the script ran out are empty but still recorded.
        assert!(record.gpu_samples.len() > 3);
        assert_eq!(record.gpu_samples.len(), record.cpu_samples.len());
    }

    #[test]
    fn test_two_runs_two_log_entries() {
        let temp = tempdir().unwrap();
        let mut runner = runner_in(temp.path());

        runner.run_named("first", || Ok::<_, Infallible>(())).unwrap();
        let _ = runner.run_named("second", || Err::<(), _>("nope"));

        let names: Vec<String> = runner
            .store()
            .history()
            .unwrap()
            .into_iter()
            .map(|r| r.operation_name)
            .collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_persist_failure_surfaces_after_success() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join("out");
        let mut runner = runner_in(&dir);
        fs::remove_dir_all(&dir).unwrap();

        let result = runner.run_named("op", || Ok::<_, Infallible>(1));
        assert!(matches!(result, Err(RunError::Persist(BenchmarkError::Io(_)))));
    }

    #[test]
    fn test_operation_error_wins_over_persist_failure() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join("out");
        let mut runner = runner_in(&dir);
        fs::remove_dir_all(&dir).unwrap();

        let result: Result<(), _> = runner.run_named("op", || Err("original"));
        assert!(matches!(result, Err(RunError::Operation("original"))));
    }

    fn transcribe_stub() -> Result<u8, Infallible> {
        Ok(7)
    }

    #[test]
    fn test_default_name_from_function() {
        let temp = tempdir().unwrap();
        let mut runner = runner_in(temp.path());

        assert_eq!(runner.run(transcribe_stub).unwrap(), 7);

        let history = runner.store().history().unwrap();
        assert!(history[0].operation_name.ends_with("transcribe_stub"));
    }

    #[test]
    fn test_operation_name_strips_closure_suffix() {
        fn make() -> impl FnOnce() -> Result<(), Infallible> {
            || Ok(())
        }
        let name = operation_name_of(make());
        assert!(!name.ends_with("{{closure}}"));
        assert!(name.contains("make"));
    }

    fn operation_name_of<F>(_: F) -> String {
        operation_name::<F>()
    }

    #[cfg(unix)]
    fn fake_smi_runner(dir: &Path, query_body: &str, timeout: Duration) -> BenchmarkRunner {
        use crate::monitoring::gpu::write_fake_smi;
        use crate::monitoring::NvidiaSmi;

        let program = write_fake_smi(dir, query_body);
        let gpu = NvidiaSmi::probe_with(program.to_str().unwrap(), timeout).unwrap();
        BenchmarkRunner::with_gpu_reader(dir.join("out"), SamplerConfig::default(), Arc::new(gpu))
            .unwrap()
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_gpu_query_does_not_hold_caller() {
        let temp = tempdir().unwrap();
        let mut runner = fake_smi_runner(temp.path(), "exec sleep 4", Duration::from_millis(500));

        let before = Instant::now();
        runner
            .run_named("short", || {
                thread::sleep(Duration::from_millis(200));
                Ok::<_, Infallible>(())
            })
            .unwrap();
        let wall = before.elapsed();

        assert!(wall < Duration::from_millis(1500), "caller held for {:?}", wall);
        let history = runner.store().history().unwrap();
        assert_eq!(history[0].gpu_samples.len(), history[0].cpu_samples.len());
        assert!(history[0].gpu_summary.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_gpu_query_records_empty_ticks() {
        let temp = tempdir().unwrap();
        let mut runner =
            fake_smi_runner(temp.path(), "exit 9", crate::monitoring::gpu::DEFAULT_QUERY_TIMEOUT);

        runner
            .run_named("cpu_only", || {
                thread::sleep(Duration::from_millis(700));
                Ok::<_, Infallible>(())
            })
            .unwrap();

        let history = runner.store().history().unwrap();
        let record = &history[0];
        assert!(!record.cpu_samples.is_empty());
        assert_eq!(record.gpu_samples.len(), record.cpu_samples.len());
        assert!(record.gpu_samples.iter().all(Vec::is_empty));
        assert!(record.gpu_summary.is_none());
    }

    #[test]
    fn test_panic_message_variants() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");

        let other: Box<dyn Any + Send> = Box::new(42_u32);
        assert_eq!(panic_message(other.as_ref()), "unknown panic payload");
    }
}

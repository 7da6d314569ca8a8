use crate::backend::BackendFactory;
use crate::sink::TelemetrySink;
use dyno_core::prelude::{DelegatedShutdownListener, ShutdownHandle};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    Idle,
    Sampling,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Time between the starts of two sampling ticks
    pub interval: Duration,
    /// The `nvidia-smi` binary used when NVML is unavailable
    pub smi_binary: PathBuf,
    /// Bound on a single `nvidia-smi` invocation
    pub smi_timeout: Duration,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            smi_binary: PathBuf::from("nvidia-smi"),
            smi_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug)]
struct Shared {
    state: RwLock<SamplerState>,
    backend: RwLock<Option<&'static str>>,
    samples_written: AtomicU64,
}

/// Background thread appending device telemetry to a sink for the duration of a run.
///
/// The sampler owns its cancellation token. Nothing the orchestrator does other than
/// [TelemetrySampler::stop] affects it.
pub struct TelemetrySampler {
    sink_path: PathBuf,
    interval: Duration,
    shared: Arc<Shared>,
    shutdown: ShutdownHandle,
    handle: Option<JoinHandle<()>>,
}

impl TelemetrySampler {
    pub fn new(sink_path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            sink_path: sink_path.into(),
            interval,
            shared: Arc::new(Shared {
                state: RwLock::new(SamplerState::Idle),
                backend: RwLock::new(None),
                samples_written: AtomicU64::new(0),
            }),
            shutdown: ShutdownHandle::new(),
            handle: None,
        }
    }

    /// Start sampling on a dedicated thread. The backend is built by `factory` on that thread.
    pub fn start(&mut self, factory: BackendFactory) -> anyhow::Result<()> {
        if *self.shared.state.read() != SamplerState::Idle {
            anyhow::bail!("Telemetry sampler has already been started");
        }

        let sink_path = self.sink_path.clone();
        let interval = self.interval;
        let shared = self.shared.clone();
        let listener = self.shutdown.new_listener();

        *self.shared.state.write() = SamplerState::Sampling;
        let spawned = std::thread::Builder::new()
            .name("telemetry".to_string())
            .spawn(move || {
                sample_loop(&sink_path, interval, factory, listener, &shared);
                *shared.state.write() = SamplerState::Stopped;
            });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                *self.shared.state.write() = SamplerState::Stopped;
                Err(anyhow::anyhow!("Failed to start telemetry thread: {e}"))
            }
        }
    }

    /// Signal the sampler and wait for it to flush its sink and release the backend.
    pub fn stop(&mut self) {
        self.shutdown.shutdown();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Telemetry thread panicked");
            }
        }
        *self.shared.state.write() = SamplerState::Stopped;
    }

    pub fn state(&self) -> SamplerState {
        *self.shared.state.read()
    }

    /// Name of the backend in use, once the sampler thread has chosen one.
    pub fn backend(&self) -> Option<&'static str> {
        *self.shared.backend.read()
    }

    pub fn samples_written(&self) -> u64 {
        self.shared.samples_written.load(Ordering::Acquire)
    }

    pub fn sink_path(&self) -> &Path {
        &self.sink_path
    }
}

impl Drop for TelemetrySampler {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}

fn sample_loop(
    sink_path: &Path,
    interval: Duration,
    factory: BackendFactory,
    mut listener: DelegatedShutdownListener,
    shared: &Shared,
) {
    let mut backend = factory();
    *shared.backend.write() = Some(backend.name());

    let mut sink = match TelemetrySink::open(sink_path, backend.header()) {
        Ok(sink) => sink,
        Err(e) => {
            log::error!("Telemetry disabled for this run: {e}");
            return;
        }
    };
    log::info!("Writing telemetry to {}", sink.path().display());

    loop {
        if listener.should_shutdown() {
            break;
        }

        let tick = Instant::now();
        match backend.sample() {
            Ok(samples) => match sink.append(&samples) {
                Ok(()) => {
                    shared
                        .samples_written
                        .fetch_add(samples.len() as u64, Ordering::AcqRel);
                }
                Err(e) => log::warn!("{e}"),
            },
            Err(e) => log::warn!("Telemetry tick from {} failed: {e}", backend.name()),
        }

        if listener.sleep(interval.saturating_sub(tick.elapsed())) {
            break;
        }
    }

    if let Err(e) = sink.flush() {
        log::warn!("{e}");
    }
    log::debug!("Releasing telemetry backend {}", backend.name());
    drop(backend);
    log::info!(
        "Telemetry stopped after {} sample(s)",
        shared.samples_written.load(Ordering::Acquire)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TelemetryBackend;
    use crate::sample::{TelemetrySample, FALLBACK_HEADER, PRIMARY_HEADER};
    use dyno_core::prelude::{BenchError, BenchResult};

    struct CountingBackend {
        ticks: u32,
        fail_every_other: bool,
    }

    impl TelemetryBackend for CountingBackend {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn header(&self) -> &'static [&'static str] {
            &PRIMARY_HEADER
        }

        fn sample(&mut self) -> BenchResult<Vec<TelemetrySample>> {
            self.ticks += 1;
            if self.fail_every_other && self.ticks % 2 == 0 {
                return Err(BenchError::PartialMetric {
                    metric: "everything",
                    device: 0,
                    cause: "flaky".to_string(),
                });
            }

            Ok(vec![TelemetrySample {
                util_gpu_pct: Some(self.ticks as f64),
                temp_c: Some(50.0),
                power_w: Some(100.0),
                ..TelemetrySample::now(0)
            }])
        }
    }

    fn counting(fail_every_other: bool) -> BackendFactory {
        Box::new(move || {
            Box::new(CountingBackend {
                ticks: 0,
                fail_every_other,
            })
        })
    }

    fn read_rows(path: &Path) -> (Vec<String>, Vec<csv::StringRecord>) {
        let mut reader = csv::Reader::from_path(path).unwrap();
        let header = reader
            .headers()
            .unwrap()
            .iter()
            .map(str::to_string)
            .collect();
        let rows = reader.records().collect::<Result<Vec<_>, _>>().unwrap();
        (header, rows)
    }

    #[test]
    fn samples_until_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gpu_usage_run.csv");

        let mut sampler = TelemetrySampler::new(&path, Duration::from_millis(20));
        assert_eq!(sampler.state(), SamplerState::Idle);

        sampler.start(counting(false)).unwrap();
        assert_eq!(sampler.state(), SamplerState::Sampling);
        std::thread::sleep(Duration::from_millis(200));

        let stopping = Instant::now();
        sampler.stop();
        assert!(stopping.elapsed() < Duration::from_secs(1));
        assert_eq!(sampler.state(), SamplerState::Stopped);
        assert_eq!(sampler.backend(), Some("counting"));

        let (header, rows) = read_rows(&path);
        assert_eq!(header, PRIMARY_HEADER.to_vec());
        assert!(!rows.is_empty());
        assert_eq!(rows.len() as u64, sampler.samples_written());

        let ticks = rows
            .iter()
            .map(|r| r[2].parse::<f64>().unwrap())
            .collect::<Vec<_>>();
        assert!(ticks.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn no_samples_after_stop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gpu_usage_run.csv");

        let mut sampler = TelemetrySampler::new(&path, Duration::from_millis(10));
        sampler.start(counting(false)).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        sampler.stop();

        let (_, before) = read_rows(&path);
        std::thread::sleep(Duration::from_millis(50));
        let (_, after) = read_rows(&path);
        assert_eq!(before.len(), after.len());
    }

    #[test]
    fn failed_ticks_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gpu_usage_run.csv");

        let mut sampler = TelemetrySampler::new(&path, Duration::from_millis(10));
        sampler.start(counting(true)).unwrap();
        std::thread::sleep(Duration::from_millis(150));
        sampler.stop();

        let (_, rows) = read_rows(&path);
        assert!(!rows.is_empty());
        assert!(rows.iter().all(|r| r[2].parse::<f64>().unwrap() % 2.0 == 1.0));
    }

    #[test]
    fn fallback_header_comes_from_backend() {
        struct Fallback;
        impl TelemetryBackend for Fallback {
            fn name(&self) -> &'static str {
                "fallback"
            }
            fn header(&self) -> &'static [&'static str] {
                &FALLBACK_HEADER
            }
            fn sample(&mut self) -> BenchResult<Vec<TelemetrySample>> {
                Ok(vec![TelemetrySample::now(0)])
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gpu_usage_run.csv");

        let mut sampler = TelemetrySampler::new(&path, Duration::from_millis(10));
        sampler.start(Box::new(|| Box::new(Fallback))).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        sampler.stop();

        let (header, rows) = read_rows(&path);
        assert_eq!(header, FALLBACK_HEADER.to_vec());
        assert!(rows.iter().all(|r| r.len() == FALLBACK_HEADER.len()));
    }

    #[test]
    fn unwritable_sink_stops_the_sampler() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("gpu_usage_run.csv");

        let mut sampler = TelemetrySampler::new(&path, Duration::from_millis(10));
        sampler.start(counting(false)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while sampler.state() != SamplerState::Stopped && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(sampler.state(), SamplerState::Stopped);
        sampler.stop();
        assert_eq!(sampler.samples_written(), 0);
    }

    #[test]
    fn cannot_start_twice() {
        let dir = tempfile::tempdir().unwrap();
        let mut sampler =
            TelemetrySampler::new(dir.path().join("gpu_usage_run.csv"), Duration::from_millis(10));

        sampler.start(counting(false)).unwrap();
        assert!(sampler.start(counting(false)).is_err());
        sampler.stop();
    }
}

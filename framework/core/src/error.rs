use std::path::PathBuf;
use std::time::Duration;

/// Failures shared by the orchestration, telemetry and aggregation layers.
///
/// Only [BenchError::NoData] is meant to surface to the operator as a failed report. Everything
/// else is logged and contained within the phase that produced it.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    /// An external command exceeded its time bound and was killed.
    #[error("`{command}` did not respond within {timeout:?}")]
    ProcessTimeout { command: String, timeout: Duration },

    /// An external command ran but reported failure.
    #[error("`{command}` failed with {status}: {stderr}")]
    ProcessFailure {
        command: String,
        status: String,
        stderr: String,
    },

    /// An external command could not be started at all.
    #[error("Failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A telemetry backend could not be initialised.
    #[error("Telemetry backend `{backend}` is unavailable: {cause}")]
    BackendUnavailable {
        backend: &'static str,
        cause: String,
    },

    /// A single telemetry metric could not be read.
    #[error("Metric `{metric}` is unreadable on device {device}: {cause}")]
    PartialMetric {
        metric: &'static str,
        device: u32,
        cause: String,
    },

    /// A sink file could not be read or parsed during aggregation.
    #[error("Sink {} is unreadable: {cause}", .path.display())]
    DataCorruption { path: PathBuf, cause: String },

    /// There are no result sinks to aggregate.
    #[error("No benchmark result sinks found in {}", .dir.display())]
    NoData { dir: PathBuf },
}

pub type BenchResult<T> = Result<T, BenchError>;

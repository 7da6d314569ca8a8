use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Directory under the output root holding result sinks and payloads.
pub const RESULTS_DIR: &str = "results";
/// Directory under the output root holding telemetry sinks.
pub const TELEMETRY_DIR: &str = "telemetry";
/// Directory under the output root holding per-run log files.
pub const LOGS_DIR: &str = "logs";
/// Manifest file under the output root, one JSON line per finished run.
pub const RUN_SUMMARY_FILE: &str = "run_summary.jsonl";

pub const RESULT_SINK_PREFIX: &str = "benchmark_results_";
pub const TELEMETRY_SINK_PREFIX: &str = "gpu_usage_";
pub const PAYLOAD_PREFIX: &str = "benchmark_payload_";
pub const LOG_PREFIX: &str = "log_";

/// Identity of a benchmark run, derived from its start time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub const FORMAT: &'static str = "%Y%m%d_%H%M%S";

    pub fn from_start_time<Tz: TimeZone>(started_at: &DateTime<Tz>) -> Self
    where
        Tz::Offset: Display,
    {
        Self(started_at.format(Self::FORMAT).to_string())
    }

    pub fn now() -> Self {
        Self::from_start_time(&Local::now())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn result_sink_name(&self) -> String {
        format!("{RESULT_SINK_PREFIX}{}.csv", self.0)
    }

    pub fn telemetry_sink_name(&self) -> String {
        telemetry_sink_name_for(&self.0)
    }

    pub fn payload_name(&self) -> String {
        format!("{PAYLOAD_PREFIX}{}.json", self.0)
    }

    pub fn log_file_name(&self) -> String {
        format!("{LOG_PREFIX}{}.txt", self.0)
    }
}

impl From<String> for RunId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Display for RunId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extract the run fragment from a result sink file name.
///
/// The fragment is opaque, so sinks written with an older timestamp layout still pair with their
/// telemetry.
pub fn run_fragment(result_sink_name: &str) -> Option<&str> {
    result_sink_name
        .strip_prefix(RESULT_SINK_PREFIX)?
        .strip_suffix(".csv")
        .filter(|fragment| !fragment.is_empty())
}

/// Name of the telemetry sink that belongs to the run with this fragment.
pub fn telemetry_sink_name_for(fragment: &str) -> String {
    format!("{TELEMETRY_SINK_PREFIX}{fragment}.csv")
}

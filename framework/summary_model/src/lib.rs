use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::path::Path;

mod naming;
mod payload;
mod record;

pub use naming::*;
pub use payload::{AggregatePayload, ModelSummary, TelemetryAggregate};
pub use record::{
    format_timestamp, ResultRecord, ERROR_SENTINEL, RECORD_TIMESTAMP_FORMAT, RESULT_HEADER,
    TIMEOUT_SENTINEL,
};

/// Summary of a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// The unique run id
    pub run_id: RunId,
    /// The model runtime endpoint the run was pointed at
    pub host: String,
    /// The models selected for the run, in the order they were processed
    pub models: Vec<String>,
    /// The time the run started
    ///
    /// This is a Unix timestamp in seconds.
    pub started_at: i64,
    /// The time the run finished, as a Unix timestamp in seconds
    pub finished_at: i64,
    /// Whether the operator aborted the run before every model was processed
    pub aborted: bool,
    /// File name of the result sink, relative to the results directory
    pub result_sink: String,
    /// File name of the telemetry sink, relative to the telemetry directory
    pub telemetry_sink: String,
    /// Name of the telemetry backend that produced the samples, if the sampler got that far
    pub telemetry_backend: Option<String>,
    /// What happened to each model
    pub outcomes: Vec<ModelOutcomeSummary>,
    /// The version of Dyno that was used for this run
    pub dyno_version: String,
}

/// Per-model entry of a [RunSummary]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelOutcomeSummary {
    pub model: String,
    /// The last lifecycle phase the model reached
    pub phase: String,
    pub ping_attempts: u32,
    pub tests_run: usize,
    pub tests_timed_out: usize,
    pub tests_errored: usize,
    /// How teardown ended, if the model got as far as being stopped
    pub stop: Option<String>,
}

impl RunSummary {
    /// Create a new run summary
    pub fn new(run_id: RunId, host: String, models: Vec<String>, started_at: i64) -> Self {
        Self {
            result_sink: run_id.result_sink_name(),
            telemetry_sink: run_id.telemetry_sink_name(),
            run_id,
            host,
            models,
            started_at,
            finished_at: started_at,
            aborted: false,
            telemetry_backend: None,
            outcomes: Vec::new(),
            dyno_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn add_outcome(&mut self, outcome: ModelOutcomeSummary) {
        self.outcomes.push(outcome);
    }

    pub fn finish(&mut self, finished_at: i64, aborted: bool) {
        self.finished_at = finished_at;
        self.aborted = aborted;
    }
}

/// Append the run summary to a file
///
/// The summary will be serialized to JSON and output as a single line followed by a newline. The
/// recommended file extension is `.jsonl`.
pub fn append_run_summary(run_summary: &RunSummary, path: &Path) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    let mut line = serde_json::to_vec(run_summary)?;
    line.push(b'\n');
    file.write_all(&line)?;
    Ok(())
}

/// Load run summaries from a file
///
/// The file should contain one JSON object per line. This is the format produced by
/// [append_run_summary].
pub fn load_summary_runs(path: &Path) -> anyhow::Result<Vec<RunSummary>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut runs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let run: RunSummary = serde_json::from_str(&line)?;
        runs.push(run);
    }
    Ok(runs)
}

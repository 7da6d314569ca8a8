use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Output recorded for a test whose process was killed at its timeout.
pub const TIMEOUT_SENTINEL: &str = "TIMEOUT";
/// Output recorded for a test whose process could not be started.
pub const ERROR_SENTINEL: &str = "ERROR";

/// Column layout of a result sink.
pub const RESULT_HEADER: [&str; 6] = [
    "timestamp",
    "model",
    "test_case",
    "duration_s",
    "output_chars",
    "output",
];

/// Timestamp layout used in result and telemetry sinks.
pub const RECORD_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

pub fn format_timestamp(at: &DateTime<Local>) -> String {
    at.format(RECORD_TIMESTAMP_FORMAT).to_string()
}

/// One row of a result sink: a single (model, test case) attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// When the test started
    pub timestamp: String,
    pub model: String,
    pub test_case: String,
    /// Wall-clock duration of the test, in seconds
    pub duration_s: f64,
    /// Size of the full output in characters, before clipping
    pub output_chars: usize,
    /// The output clipped to the character budget, or a sentinel
    pub output: String,
}

impl ResultRecord {
    /// A test that ran to completion, with any exit code.
    pub fn completed(
        started_at: &DateTime<Local>,
        model: &str,
        test_case: &str,
        duration: Duration,
        output: &str,
        char_budget: usize,
    ) -> Self {
        Self {
            timestamp: format_timestamp(started_at),
            model: model.to_string(),
            test_case: test_case.to_string(),
            duration_s: duration.as_secs_f64(),
            output_chars: output.chars().count(),
            output: output.chars().take(char_budget).collect(),
        }
    }

    /// A test that was killed at its timeout.
    pub fn timed_out(
        started_at: &DateTime<Local>,
        model: &str,
        test_case: &str,
        duration: Duration,
    ) -> Self {
        Self::sentinel(started_at, model, test_case, duration, TIMEOUT_SENTINEL)
    }

    /// A test that never got as far as running.
    pub fn errored(
        started_at: &DateTime<Local>,
        model: &str,
        test_case: &str,
        duration: Duration,
    ) -> Self {
        Self::sentinel(started_at, model, test_case, duration, ERROR_SENTINEL)
    }

    fn sentinel(
        started_at: &DateTime<Local>,
        model: &str,
        test_case: &str,
        duration: Duration,
        sentinel: &str,
    ) -> Self {
        Self {
            timestamp: format_timestamp(started_at),
            model: model.to_string(),
            test_case: test_case.to_string(),
            duration_s: duration.as_secs_f64(),
            output_chars: 0,
            output: sentinel.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.output_chars == 0 && self.output == TIMEOUT_SENTINEL
    }

    pub fn is_error(&self) -> bool {
        self.output_chars == 0 && self.output == ERROR_SENTINEL
    }
}

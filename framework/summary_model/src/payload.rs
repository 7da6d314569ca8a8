use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Summary telemetry for one run.
///
/// Each field is `None` when no matching column was found or the column held no numeric values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryAggregate {
    pub avg_util: Option<f64>,
    pub max_temp: Option<f64>,
    pub avg_power: Option<f64>,
}

/// Statistics for one (run, test case, model) triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub model: String,
    /// Mean duration in seconds
    pub duration_s: f64,
    /// Earliest record timestamp
    pub start_time: Option<String>,
    /// Number of records
    pub count: u64,
    /// Telemetry of the run this entry belongs to
    pub telemetry: Option<TelemetryAggregate>,
}

/// The report consumed by the dashboard renderer.
///
/// `runs` is keyed by result sink file name, then by test case. `telemetry` has one entry per run
/// key in `runs`, `None` when the run had no readable telemetry sink.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatePayload {
    pub runs: BTreeMap<String, BTreeMap<String, Vec<ModelSummary>>>,
    pub telemetry: BTreeMap<String, Option<TelemetryAggregate>>,
}

impl AggregatePayload {
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Look up the summary of `model` on `test_case` within `run`.
    pub fn model_summary(&self, run: &str, test_case: &str, model: &str) -> Option<&ModelSummary> {
        self.runs
            .get(run)?
            .get(test_case)?
            .iter()
            .find(|summary| summary.model == model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn serializes_to_nested_shape() {
        let mut payload = AggregatePayload::default();
        payload.runs.entry("benchmark_results_1.csv".to_string()).or_default().insert(
            "t1.txt".to_string(),
            vec![ModelSummary {
                model: "m1".to_string(),
                duration_s: 2.0,
                start_time: Some("2025-01-01T10:00:00.000000".to_string()),
                count: 1,
                telemetry: None,
            }],
        );
        payload
            .telemetry
            .insert("benchmark_results_1.csv".to_string(), None);

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "runs": {
                    "benchmark_results_1.csv": {
                        "t1.txt": [{
                            "model": "m1",
                            "duration_s": 2.0,
                            "start_time": "2025-01-01T10:00:00.000000",
                            "count": 1,
                            "telemetry": null
                        }]
                    }
                },
                "telemetry": { "benchmark_results_1.csv": null }
            })
        );
    }

    #[test]
    fn finds_model_summary() {
        let mut payload = AggregatePayload::default();
        payload
            .runs
            .entry("r".to_string())
            .or_default()
            .insert(
                "t".to_string(),
                vec![ModelSummary {
                    model: "m".to_string(),
                    duration_s: 1.5,
                    start_time: None,
                    count: 2,
                    telemetry: Some(TelemetryAggregate::default()),
                }],
            );

        assert_eq!(payload.model_summary("r", "t", "m").map(|s| s.count), Some(2));
        assert!(payload.model_summary("r", "t", "other").is_none());
        assert!(payload.model_summary("x", "t", "m").is_none());
    }
}

use anyhow::Context;
use dyno_core::prelude::{BenchError, BenchResult};
use dyno_summary_model::{AggregatePayload, ModelSummary, TelemetryAggregate};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

mod analyze;
mod columns;
mod discover;
mod frame;
mod table;

pub use table::{print_run_summary, run_summary_table};

/// Build the dashboard payload from every result sink in `results_dir` and the telemetry sinks
/// recorded alongside them in `telemetry_dir`.
///
/// Unreadable sinks are skipped with a warning. Fails with [BenchError::NoData] only when there is
/// no result sink at all. The payload depends on nothing but the sink contents.
pub fn build_payload(results_dir: &Path, telemetry_dir: &Path) -> BenchResult<AggregatePayload> {
    let runs = discover::discover_runs(results_dir, telemetry_dir);
    if runs.is_empty() {
        return Err(BenchError::NoData {
            dir: results_dir.to_path_buf(),
        });
    }

    let mut payload = AggregatePayload::default();
    for run in runs {
        let groups = match frame::load_csv(&run.results).and_then(analyze::summarise_results) {
            Ok(groups) => groups,
            Err(e) => {
                log::warn!(
                    "{}",
                    BenchError::DataCorruption {
                        path: run.results.clone(),
                        cause: format!("{e:#}"),
                    }
                );
                continue;
            }
        };

        let telemetry = run.telemetry.as_deref().and_then(try_aggregate_telemetry);

        let mut tests = BTreeMap::<String, Vec<ModelSummary>>::new();
        for group in groups {
            tests.entry(group.test_case).or_default().push(ModelSummary {
                model: group.model,
                duration_s: group.duration_s,
                start_time: group.start_time,
                count: group.count,
                telemetry: telemetry.clone(),
            });
        }

        log::debug!("Aggregated {} test case(s) for {}", tests.len(), run.run_key);
        payload.telemetry.insert(run.run_key.clone(), telemetry);
        payload.runs.insert(run.run_key, tests);
    }

    Ok(payload)
}

/// Aggregate a telemetry sink, or `None` if it cannot be read.
fn try_aggregate_telemetry(path: &Path) -> Option<TelemetryAggregate> {
    match frame::load_csv(path).and_then(|frame| analyze::telemetry_aggregate(&frame)) {
        Ok(aggregate) => Some(aggregate),
        Err(e) => {
            log::warn!(
                "{}",
                BenchError::DataCorruption {
                    path: path.to_path_buf(),
                    cause: format!("{e:#}"),
                }
            );
            None
        }
    }
}

/// Write the payload as pretty printed JSON, replacing any existing file.
pub fn write_payload(payload: &AggregatePayload, path: &Path) -> anyhow::Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create payload file {}", path.display()))?;
    serde_json::to_writer_pretty(file, payload)
        .with_context(|| format!("Failed to write payload to {}", path.display()))?;

    Ok(())
}

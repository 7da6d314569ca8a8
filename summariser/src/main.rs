use anyhow::Context;
use chrono::Utc;
use dyno_summary_model::{RESULTS_DIR, TELEMETRY_DIR};
use log::debug;
use std::path::PathBuf;

/// Environment variable name to set a custom results directory
const RESULTS_DIR_ENV: &str = "DYNO_RESULTS_DIR";
/// Environment variable name to set a custom telemetry directory
const TELEMETRY_DIR_ENV: &str = "DYNO_TELEMETRY_DIR";

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let results_dir = std::env::var(RESULTS_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(RESULTS_DIR));
    let telemetry_dir = std::env::var(TELEMETRY_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(TELEMETRY_DIR));
    debug!(
        "Summarising results from {} with telemetry from {}",
        results_dir.display(),
        telemetry_dir.display()
    );

    let payload = dyno_summariser::build_payload(&results_dir, &telemetry_dir)
        .context("Failed to build report")?;

    for run_key in payload.runs.keys() {
        dyno_summariser::print_run_summary(&payload, run_key);
    }

    let report = PathBuf::from(format!(
        "summariser-report-{}.json",
        Utc::now().format("%Y-%m-%dT%H.%M.%S%.fZ")
    ));
    dyno_summariser::write_payload(&payload, &report)?;
    log::info!("Report written to {}", report.display());

    Ok(())
}

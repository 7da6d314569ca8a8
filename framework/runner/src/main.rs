use anyhow::Context;
use chrono::Local;
use clap::Parser;
use dyno_runner::prelude::{init_logging, run, DynoCli};
use dyno_summary_model::{RunId, LOGS_DIR};

fn main() -> anyhow::Result<()> {
    let cli = DynoCli::parse();

    let started_at = Local::now();
    let run_id = RunId::from_start_time(&started_at);

    let logs_dir = cli.output_dir.join(LOGS_DIR);
    std::fs::create_dir_all(&logs_dir)
        .with_context(|| format!("Failed to create directory {}", logs_dir.display()))?;
    init_logging(Some(&logs_dir.join(run_id.log_file_name())))?;

    let report = run(cli, started_at)?;

    if report.summary.aborted {
        log::warn!("Run {run_id} was aborted before every model was processed");
    } else {
        log::info!("Run {run_id} complete");
    }

    Ok(())
}

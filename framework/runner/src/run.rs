use anyhow::Context;
use chrono::{DateTime, Local};
use dyno_core::prelude::{CommandExecutor, ShutdownHandle};
use dyno_summariser::{build_payload, print_run_summary, write_payload};
use dyno_summary_model::{
    append_run_summary, RunId, RunSummary, RESULTS_DIR, RUN_SUMMARY_FILE, TELEMETRY_DIR,
};
use dyno_telemetry::{default_backend_factory, BackendFactory, TelemetrySampler};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cli::DynoCli;
use crate::config::BenchConfig;
use crate::lifecycle::{LifecycleConfig, ModelLifecycle, ModelOutcome};
use crate::model::{same_model, ModelUnderTest};
use crate::progress::model_progress;
use crate::recorder::CsvResultSink;
use crate::runtime::{ollama_path, InstalledModel, ModelRuntime, OllamaCli};
use crate::shutdown::start_shutdown_listener;
use crate::test_case::{load_test_cases, prompts_dir_for};

/// Everything a benchmark run needs to know up front.
#[derive(Debug, Clone)]
pub struct BenchmarkPlan {
    pub run_id: RunId,
    pub started_at: DateTime<Local>,
    pub host: String,
    pub models: Vec<String>,
    pub prompts_dir: PathBuf,
    /// Root for the `results` and `telemetry` directories and the run manifest
    pub output_dir: PathBuf,
    pub lifecycle: LifecycleConfig,
    pub telemetry_interval: Duration,
    /// Pause after a model has been stopped, before the next one starts
    pub cooldown: Duration,
    pub show_progress: bool,
    pub write_report: bool,
}

impl BenchmarkPlan {
    pub fn results_dir(&self) -> PathBuf {
        self.output_dir.join(RESULTS_DIR)
    }

    pub fn telemetry_dir(&self) -> PathBuf {
        self.output_dir.join(TELEMETRY_DIR)
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub summary: RunSummary,
    pub outcomes: Vec<ModelOutcome>,
    /// Where the aggregate payload was written, if it was built
    pub payload_path: Option<PathBuf>,
}

/// Run the benchmark described by the CLI, using `ollama` and the local accelerators.
pub fn run(cli: DynoCli, started_at: DateTime<Local>) -> anyhow::Result<RunReport> {
    let config = BenchConfig::load(cli.config.as_deref())?;
    let sampler_config = config.sampler_config()?;

    let executor = Arc::new(CommandExecutor::new().context("Failed to create Tokio runtime")?);
    let shutdown_handle = start_shutdown_listener(&executor);

    let binary = ollama_path(config.runtime.binary.as_deref())?;
    log::info!("Using ollama binary at {}", binary.display());

    let runtime = OllamaCli::new(
        executor.clone(),
        binary,
        cli.host.clone(),
        cli.run_as.clone().or_else(|| config.runtime.run_as.clone()),
        config.runtime_timeouts()?,
    );

    let plan = BenchmarkPlan {
        run_id: RunId::from_start_time(&started_at),
        started_at,
        host: cli.host,
        models: cli.models,
        prompts_dir: prompts_dir_for(&cli.prompts_dir, cli.language.as_deref()),
        output_dir: cli.output_dir,
        lifecycle: config.lifecycle_config()?,
        telemetry_interval: sampler_config.interval,
        cooldown: config.cooldown()?,
        show_progress: !cli.no_progress,
        write_report: !cli.no_report,
    };

    let backend = default_backend_factory(&sampler_config, executor);
    run_benchmark(&plan, &runtime, backend, &shutdown_handle)
}

/// Run every model of `plan` in order while sampling telemetry, then write the run manifest and
/// the aggregate payload.
///
/// Only failures to set up the run's sinks are errors. Per-model failures end up in the returned
/// outcomes, and a failed aggregation is logged.
pub fn run_benchmark(
    plan: &BenchmarkPlan,
    runtime: &dyn ModelRuntime,
    backend: BackendFactory,
    shutdown_handle: &ShutdownHandle,
) -> anyhow::Result<RunReport> {
    // Clones of this listener share whether the shutdown has been seen.
    let mut shutdown_listener = shutdown_handle.new_listener();

    let results_dir = plan.results_dir();
    let telemetry_dir = plan.telemetry_dir();
    for dir in [&results_dir, &telemetry_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    log::info!(
        "Starting run {} against {} with {} model(s)",
        plan.run_id,
        plan.host,
        plan.models.len()
    );

    let mut summary = RunSummary::new(
        plan.run_id.clone(),
        plan.host.clone(),
        plan.models.clone(),
        plan.started_at.timestamp(),
    );

    let mut sampler = TelemetrySampler::new(
        telemetry_dir.join(plan.run_id.telemetry_sink_name()),
        plan.telemetry_interval,
    );
    if let Err(e) = sampler.start(backend) {
        log::error!("Telemetry will not be recorded for this run: {e:#}");
    }

    let mut sink = CsvResultSink::open(&results_dir.join(plan.run_id.result_sink_name()))?;
    let test_cases = load_test_cases(&plan.prompts_dir)?;
    let models = models_under_test(runtime, &plan.models);

    let mut outcomes = Vec::with_capacity(models.len());
    for (index, model) in models.iter().enumerate() {
        if shutdown_listener.should_shutdown() {
            log::warn!("Shutdown requested, skipping the remaining models");
            break;
        }

        let progress = model_progress(
            index + 1,
            models.len(),
            &model.name,
            test_cases.len(),
            plan.show_progress,
        );
        let outcome = ModelLifecycle::new(
            runtime,
            &mut sink,
            &plan.lifecycle,
            shutdown_listener.clone(),
        )
        .with_progress(progress)
        .run(model, &test_cases);

        summary.add_outcome(outcome.summary());
        let cool_down = outcome.reached_stopping() && !outcome.aborted && index + 1 < models.len();
        outcomes.push(outcome);

        if cool_down {
            log::info!("Cooling down for {:?}", plan.cooldown);
            shutdown_listener.sleep(plan.cooldown);
        }
    }

    if let Err(e) = sink.close() {
        log::error!("{e:#}");
    }
    sampler.stop();
    log::info!(
        "Telemetry sampler wrote {} sample(s) using {}",
        sampler.samples_written(),
        sampler.backend().unwrap_or("no backend")
    );

    summary.telemetry_backend = sampler.backend().map(str::to_string);
    summary.finish(Local::now().timestamp(), shutdown_listener.should_shutdown());
    if let Err(e) = append_run_summary(&summary, &plan.output_dir.join(RUN_SUMMARY_FILE)) {
        log::error!("Failed to write the run manifest: {e:#}");
    }

    let payload_path = if plan.write_report {
        write_report(&results_dir, &telemetry_dir, &plan.run_id)
    } else {
        None
    };

    Ok(RunReport {
        summary,
        outcomes,
        payload_path,
    })
}

/// Sizes come from the runtime's model listing when it is available.
fn models_under_test(runtime: &dyn ModelRuntime, names: &[String]) -> Vec<ModelUnderTest> {
    let installed: Vec<InstalledModel> = runtime.list_models().unwrap_or_else(|e| {
        log::warn!("Could not list installed models, using the default load estimate: {e}");
        Vec::new()
    });

    names
        .iter()
        .map(|name| {
            let size_bytes = installed
                .iter()
                .find(|m| same_model(&m.name, name))
                .and_then(|m| m.size_bytes);
            ModelUnderTest::new(name.as_str(), size_bytes)
        })
        .collect()
}

fn write_report(results_dir: &Path, telemetry_dir: &Path, run_id: &RunId) -> Option<PathBuf> {
    let payload = match build_payload(results_dir, telemetry_dir) {
        Ok(payload) => payload,
        Err(e) => {
            log::error!("Failed to aggregate results: {e}");
            return None;
        }
    };

    let path = results_dir.join(run_id.payload_name());
    if let Err(e) = write_payload(&payload, &path) {
        log::error!("Failed to write aggregate payload: {e:#}");
        return None;
    }

    print_run_summary(&payload, &run_id.result_sink_name());
    log::info!("Wrote aggregate payload to {}", path.display());

    Some(path)
}

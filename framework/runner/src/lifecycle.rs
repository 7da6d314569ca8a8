use anyhow::{bail, Context};
use chrono::Local;
use dyno_core::prelude::{DelegatedShutdownListener, ShutdownSignalError};
use dyno_summary_model::{ModelOutcomeSummary, ResultRecord};
use indicatif::ProgressBar;
use std::time::{Duration, Instant};

use crate::model::{same_model, ModelUnderTest};
use crate::recorder::RecordSink;
use crate::runtime::ModelRuntime;
use crate::test_case::TestCase;

/// Timing, retry and budget knobs for [ModelLifecycle].
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleConfig {
    /// Pull and ping attempts before the model is given up on
    pub ping_attempts: u32,
    /// Wait between two failed attempts
    pub ping_backoff: Duration,
    /// Added to the model's load estimate to bound the ping
    pub ping_margin: Duration,
    pub ping_prompt: String,
    /// Bound on a single test
    pub max_response: Duration,
    /// Output characters kept in a result record
    pub max_output_chars: usize,
    /// Pause between two tests
    pub test_pause: Duration,
    pub stop_polls: u32,
    pub stop_poll_interval: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            ping_attempts: 3,
            ping_backoff: Duration::from_secs(6),
            ping_margin: Duration::from_secs(30),
            ping_prompt: "Hello".to_string(),
            max_response: Duration::from_secs(180),
            max_output_chars: 5000,
            test_pause: Duration::from_secs(15),
            stop_polls: 6,
            stop_poll_interval: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum ModelPhase {
    #[display("pending")]
    Pending,
    #[display("pulling")]
    Pulling,
    #[display("verifying")]
    Verifying,
    #[display("testing")]
    Testing,
    #[display("stopping")]
    Stopping,
    #[display("done")]
    Done,
    #[display("failed")]
    Failed,
}

/// How teardown of a model ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum StopOutcome {
    /// The model disappeared from the active listing.
    #[display("confirmed")]
    Confirmed,
    /// Every successful listing still showed the model.
    #[display("still active")]
    StillActive,
    /// No listing succeeded, so it is not known whether the model is still loaded.
    #[display("unknown")]
    Unknown,
}

/// What happened to one model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutcome {
    pub model: String,
    pub phase: ModelPhase,
    pub ping_attempts: u32,
    pub tests_run: usize,
    pub tests_timed_out: usize,
    pub tests_errored: usize,
    pub stop: Option<StopOutcome>,
    /// Active model listings that failed while confirming the stop
    pub listing_failures: u32,
    pub aborted: bool,
}

impl ModelOutcome {
    fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            phase: ModelPhase::Pending,
            ping_attempts: 0,
            tests_run: 0,
            tests_timed_out: 0,
            tests_errored: 0,
            stop: None,
            listing_failures: 0,
            aborted: false,
        }
    }

    /// Whether the model was stopped, which is when the orchestrator cools down after it.
    pub fn reached_stopping(&self) -> bool {
        self.stop.is_some()
    }

    pub fn summary(&self) -> ModelOutcomeSummary {
        ModelOutcomeSummary {
            model: self.model.clone(),
            phase: self.phase.to_string(),
            ping_attempts: self.ping_attempts,
            tests_run: self.tests_run,
            tests_timed_out: self.tests_timed_out,
            tests_errored: self.tests_errored,
            stop: self.stop.map(|s| s.to_string()),
        }
    }
}

/// Drives one model through pull, warm-up, the test suite and teardown.
///
/// Nothing that goes wrong for the model escapes [ModelLifecycle::run]. Failures are logged as
/// `[model] phase: cause` and reflected in the returned [ModelOutcome].
pub struct ModelLifecycle<'a> {
    runtime: &'a dyn ModelRuntime,
    sink: &'a mut dyn RecordSink,
    config: &'a LifecycleConfig,
    shutdown_listener: DelegatedShutdownListener,
    progress: ProgressBar,
}

impl<'a> ModelLifecycle<'a> {
    pub fn new(
        runtime: &'a dyn ModelRuntime,
        sink: &'a mut dyn RecordSink,
        config: &'a LifecycleConfig,
        shutdown_listener: DelegatedShutdownListener,
    ) -> Self {
        Self {
            runtime,
            sink,
            config,
            shutdown_listener,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn run(&mut self, model: &ModelUnderTest, test_cases: &[TestCase]) -> ModelOutcome {
        let mut outcome = ModelOutcome::new(&model.name);

        if self.shutdown_listener.should_shutdown() {
            log::info!("[{}] {}: skipped by shutdown", model.name, outcome.phase);
            outcome.aborted = true;
            return outcome;
        }

        log::info!(
            "[{}] Starting, estimated load time {:?}",
            model.name,
            model.load_estimate
        );

        // Phase the model was loading in when a shutdown interrupted it
        let mut interrupted = None;
        match self.acquire(model, &mut outcome) {
            Ok(()) => {
                outcome.phase = ModelPhase::Testing;
                if let Err(e) = self.exercise(model, test_cases, &mut outcome) {
                    self.record_failure(model, &mut outcome, e);
                }
            }
            Err(e) if e.is::<ShutdownSignalError>() => {
                interrupted = Some(outcome.phase);
                self.record_failure(model, &mut outcome, e);
            }
            Err(e) => {
                log::error!("[{}] {}: {e:#}", model.name, outcome.phase);
                outcome.phase = ModelPhase::Failed;
                self.progress.abandon_with_message("failed");
                return outcome;
            }
        }

        self.retire(model, &mut outcome);
        match interrupted {
            Some(phase) => {
                outcome.phase = phase;
                self.progress.abandon_with_message("aborted");
            }
            None => {
                outcome.phase = ModelPhase::Done;
                self.progress.finish_with_message("done");
            }
        }

        log::info!(
            "[{}] Finished: {} test(s), {} timed out, {} errored, stop {}",
            model.name,
            outcome.tests_run,
            outcome.tests_timed_out,
            outcome.tests_errored,
            outcome
                .stop
                .map(|s| s.to_string())
                .unwrap_or_else(|| "skipped".to_string())
        );

        outcome
    }

    fn record_failure(
        &self,
        model: &ModelUnderTest,
        outcome: &mut ModelOutcome,
        error: anyhow::Error,
    ) {
        if error.is::<ShutdownSignalError>() {
            log::warn!("[{}] {}: {error}", model.name, outcome.phase);
            outcome.aborted = true;
        } else {
            log::error!("[{}] {}: {error:#}", model.name, outcome.phase);
        }
    }

    /// Pull and ping until both succeed or the attempts run out.
    fn acquire(&mut self, model: &ModelUnderTest, outcome: &mut ModelOutcome) -> anyhow::Result<()> {
        let attempts = self.config.ping_attempts;
        let ping_timeout = model.load_estimate + self.config.ping_margin;

        for attempt in 1..=attempts {
            outcome.ping_attempts = attempt;
            outcome.phase = ModelPhase::Pulling;
            self.progress
                .set_message(format!("loading, attempt {attempt}/{attempts}"));

            match self.try_acquire(model, ping_timeout, outcome) {
                Ok(()) => {
                    log::info!(
                        "[{}] {}: ready after {attempt} attempt(s)",
                        model.name,
                        outcome.phase
                    );
                    return Ok(());
                }
                Err(e) if e.is::<ShutdownSignalError>() => return Err(e),
                Err(e) => log::warn!(
                    "[{}] {}: attempt {attempt}/{attempts} failed: {e:#}",
                    model.name,
                    outcome.phase
                ),
            }

            if attempt < attempts && self.shutdown_listener.sleep(self.config.ping_backoff) {
                return Err(ShutdownSignalError::default().into());
            }
        }

        bail!("model did not become ready after {attempts} attempt(s)")
    }

    fn try_acquire(
        &mut self,
        model: &ModelUnderTest,
        ping_timeout: Duration,
        outcome: &mut ModelOutcome,
    ) -> anyhow::Result<()> {
        let pull = self.runtime.pull(&model.name, &mut self.shutdown_listener)?;
        if pull.cancelled() {
            return Err(ShutdownSignalError::default().into());
        }
        pull.into_result().context("pull failed")?;

        outcome.phase = ModelPhase::Verifying;
        let ping = self.runtime.run(
            &model.name,
            &self.config.ping_prompt,
            ping_timeout,
            &mut self.shutdown_listener,
        )?;
        if ping.cancelled() {
            return Err(ShutdownSignalError::default().into());
        }

        let ping = ping.into_result().context("ping failed")?;
        if ping.stdout.trim().is_empty() {
            bail!("ping returned an empty response");
        }

        Ok(())
    }

    /// Run every test case once, persisting one record per test.
    fn exercise(
        &mut self,
        model: &ModelUnderTest,
        test_cases: &[TestCase],
        outcome: &mut ModelOutcome,
    ) -> anyhow::Result<()> {
        if test_cases.is_empty() {
            bail!("no test cases to run");
        }

        self.progress.set_length(test_cases.len() as u64);
        self.progress.set_position(0);

        for (index, test_case) in test_cases.iter().enumerate() {
            if self.shutdown_listener.should_shutdown() {
                return Err(ShutdownSignalError::default().into());
            }

            self.progress.set_message(test_case.name.clone());
            let record = self.run_test(model, test_case)?;

            outcome.tests_run += 1;
            if record.is_timeout() {
                outcome.tests_timed_out += 1;
            } else if record.is_error() {
                outcome.tests_errored += 1;
            }

            if let Err(e) = self.sink.append(&record) {
                log::error!(
                    "[{}] {}: failed to record {}: {e:#}",
                    model.name,
                    outcome.phase,
                    test_case.name
                );
            }
            self.progress.inc(1);

            if index + 1 < test_cases.len() && self.shutdown_listener.sleep(self.config.test_pause)
            {
                return Err(ShutdownSignalError::default().into());
            }
        }

        Ok(())
    }

    /// Run a single test. Only a shutdown is an error, every other outcome is a record.
    fn run_test(
        &mut self,
        model: &ModelUnderTest,
        test_case: &TestCase,
    ) -> anyhow::Result<ResultRecord> {
        let started_at = Local::now();
        let started = Instant::now();

        let prompt = match test_case.read_prompt() {
            Ok(prompt) => prompt,
            Err(e) => {
                log::error!(
                    "[{}] testing: failed to read prompt {}: {e}",
                    model.name,
                    test_case.path.display()
                );
                return Ok(ResultRecord::errored(
                    &started_at,
                    &model.name,
                    &test_case.name,
                    started.elapsed(),
                ));
            }
        };

        let output = match self.runtime.run(
            &model.name,
            &prompt,
            self.config.max_response,
            &mut self.shutdown_listener,
        ) {
            Ok(output) => output,
            Err(e) => {
                log::error!("[{}] testing: {} could not run: {e}", model.name, test_case.name);
                return Ok(ResultRecord::errored(
                    &started_at,
                    &model.name,
                    &test_case.name,
                    started.elapsed(),
                ));
            }
        };

        if output.cancelled() {
            return Err(ShutdownSignalError::default().into());
        }

        if output.timed_out() {
            log::warn!(
                "[{}] testing: {} timed out after {:?}",
                model.name,
                test_case.name,
                output.elapsed
            );
            return Ok(ResultRecord::timed_out(
                &started_at,
                &model.name,
                &test_case.name,
                output.elapsed,
            ));
        }

        if !output.is_success() {
            log::warn!(
                "[{}] testing: {} finished with {}: {}",
                model.name,
                test_case.name,
                output.status,
                output.stderr.trim()
            );
        } else {
            log::info!(
                "[{}] testing: {} took {:.2}s",
                model.name,
                test_case.name,
                output.elapsed.as_secs_f64()
            );
        }

        Ok(ResultRecord::completed(
            &started_at,
            &model.name,
            &test_case.name,
            output.elapsed,
            output.stdout.trim(),
            self.config.max_output_chars,
        ))
    }

    /// Stop the model and poll the active listing until it is gone.
    fn retire(&mut self, model: &ModelUnderTest, outcome: &mut ModelOutcome) {
        outcome.phase = ModelPhase::Stopping;
        self.progress.set_message("stopping");

        if let Err(e) = self
            .runtime
            .stop(&model.name)
            .and_then(|output| output.into_result())
        {
            log::warn!("[{}] {}: stop failed: {e}", model.name, outcome.phase);
        }

        // After a shutdown the operator is waiting, so look only once.
        let polls = if outcome.aborted {
            1
        } else {
            self.config.stop_polls.max(1)
        };

        let mut listings = 0;
        for poll in 1..=polls {
            listings += 1;
            match self.runtime.list_active() {
                Ok(active) if !active.iter().any(|name| same_model(name, &model.name)) => {
                    log::info!("[{}] {}: confirmed after {poll} poll(s)", model.name, outcome.phase);
                    outcome.stop = Some(StopOutcome::Confirmed);
                    return;
                }
                Ok(_) => log::debug!("[{}] {}: still active", model.name, outcome.phase),
                Err(e) => {
                    outcome.listing_failures += 1;
                    log::warn!(
                        "[{}] {}: listing active models failed: {e}",
                        model.name,
                        outcome.phase
                    );
                }
            }

            if poll < polls && self.shutdown_listener.sleep(self.config.stop_poll_interval) {
                outcome.aborted = true;
                break;
            }
        }

        let stop = if outcome.listing_failures == listings {
            StopOutcome::Unknown
        } else {
            StopOutcome::StillActive
        };
        log::warn!(
            "[{}] {}: could not confirm the model stopped ({stop})",
            model.name,
            outcome.phase
        );
        outcome.stop = Some(stop);
    }
}

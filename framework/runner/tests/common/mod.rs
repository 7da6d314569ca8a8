#![allow(dead_code)]

use dyno_core::prelude::{
    BenchError, BenchResult, CommandOutput, DelegatedShutdownListener, ExitStatus, ShutdownHandle,
};
use dyno_runner::prelude::{InstalledModel, LifecycleConfig, ModelRuntime, TestCase};
use dyno_telemetry::{BackendFactory, TelemetryBackend, TelemetrySample, PRIMARY_HEADER};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const PING: &str = "Hello";

/// How the fake runtime answers a prompt.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Exit zero after two seconds with this output
    Output(String),
    /// Exit with this code and output
    Exit(i32, String),
    Timeout(Duration),
    /// The process cannot be started
    Unstartable,
    /// Trigger the shutdown handle while the prompt is running
    Abort,
}

/// A model runtime that answers from a script and records every call.
pub struct FakeRuntime {
    replies: HashMap<String, Reply>,
    ping_reply: String,
    pull_failures: Mutex<HashMap<String, u32>>,
    active: Mutex<Vec<String>>,
    stop_unloads: bool,
    listing_fails: bool,
    installed: Vec<InstalledModel>,
    shutdown_handle: Option<ShutdownHandle>,
    calls: Mutex<Vec<String>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            replies: HashMap::new(),
            ping_reply: "Hi there".to_string(),
            pull_failures: Mutex::new(HashMap::new()),
            active: Mutex::new(Vec::new()),
            stop_unloads: true,
            listing_fails: false,
            installed: Vec::new(),
            shutdown_handle: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(mut self, prompt: &str, reply: Reply) -> Self {
        self.replies.insert(prompt.to_string(), reply);
        self
    }

    pub fn ping_reply(mut self, reply: &str) -> Self {
        self.ping_reply = reply.to_string();
        self
    }

    /// Fail the next `times` pulls of `model`.
    pub fn failing_pull(self, model: &str, times: u32) -> Self {
        self.pull_failures.lock().insert(model.to_string(), times);
        self
    }

    pub fn stop_keeps_model_loaded(mut self) -> Self {
        self.stop_unloads = false;
        self
    }

    pub fn listing_fails(mut self) -> Self {
        self.listing_fails = true;
        self
    }

    pub fn installed(mut self, name: &str, size_bytes: u64) -> Self {
        self.installed.push(InstalledModel {
            name: name.to_string(),
            id: "0123456789ab".to_string(),
            size_bytes: Some(size_bytes),
        });
        self
    }

    pub fn aborting_with(mut self, shutdown_handle: ShutdownHandle) -> Self {
        self.shutdown_handle = Some(shutdown_handle);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

pub fn output(status: ExitStatus, stdout: &str, elapsed: Duration) -> CommandOutput {
    CommandOutput {
        command: "fake".to_string(),
        stdout: stdout.to_string(),
        stderr: String::new(),
        status,
        elapsed,
        timeout: None,
    }
}

impl ModelRuntime for FakeRuntime {
    fn pull(
        &self,
        model: &str,
        _shutdown_listener: &mut DelegatedShutdownListener,
    ) -> BenchResult<CommandOutput> {
        self.record(format!("pull {model}"));

        let mut failures = self.pull_failures.lock();
        match failures.get_mut(model) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                let mut failed = output(ExitStatus::Code(1), "", Duration::ZERO);
                failed.stderr = "pull model manifest: file does not exist".to_string();
                Ok(failed)
            }
            _ => Ok(output(ExitStatus::Code(0), "success", Duration::ZERO)),
        }
    }

    fn run(
        &self,
        model: &str,
        prompt: &str,
        _timeout: Duration,
        shutdown_listener: &mut DelegatedShutdownListener,
    ) -> BenchResult<CommandOutput> {
        self.record(format!("run {model}"));

        if prompt == PING {
            self.active.lock().push(model.to_string());
            return Ok(output(
                ExitStatus::Code(0),
                &self.ping_reply,
                Duration::from_millis(10),
            ));
        }

        let reply = self
            .replies
            .get(prompt)
            .cloned()
            .unwrap_or_else(|| Reply::Output("OK".to_string()));

        match reply {
            Reply::Output(stdout) => Ok(output(
                ExitStatus::Code(0),
                &stdout,
                Duration::from_secs(2),
            )),
            Reply::Exit(code, stdout) => Ok(output(
                ExitStatus::Code(code),
                &stdout,
                Duration::from_secs(1),
            )),
            Reply::Timeout(elapsed) => Ok(output(ExitStatus::TimedOut, "", elapsed)),
            Reply::Unstartable => Err(BenchError::Spawn {
                command: format!("ollama run {model}"),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            }),
            Reply::Abort => {
                if let Some(handle) = &self.shutdown_handle {
                    handle.shutdown();
                }
                let status = if shutdown_listener.should_shutdown() {
                    ExitStatus::Cancelled
                } else {
                    ExitStatus::Code(0)
                };
                Ok(output(status, "", Duration::from_millis(10)))
            }
        }
    }

    fn stop(&self, model: &str) -> BenchResult<CommandOutput> {
        self.record(format!("stop {model}"));
        if self.stop_unloads {
            self.active.lock().retain(|m| m != model);
        }
        Ok(output(ExitStatus::Code(0), "", Duration::ZERO))
    }

    fn list_active(&self) -> BenchResult<Vec<String>> {
        self.record("ps".to_string());
        if self.listing_fails {
            return Err(BenchError::ProcessFailure {
                command: "ollama ps".to_string(),
                status: "exit code 1".to_string(),
                stderr: "could not connect to ollama app".to_string(),
            });
        }

        // The runtime reports tagged names.
        Ok(self
            .active
            .lock()
            .iter()
            .map(|m| {
                if m.contains(':') {
                    m.clone()
                } else {
                    format!("{m}:latest")
                }
            })
            .collect())
    }

    fn list_models(&self) -> BenchResult<Vec<InstalledModel>> {
        self.record("list".to_string());
        Ok(self.installed.clone())
    }
}

/// Fast timings so a whole model runs in milliseconds.
pub fn fast_config() -> LifecycleConfig {
    LifecycleConfig {
        ping_attempts: 3,
        ping_backoff: Duration::from_millis(5),
        ping_margin: Duration::from_millis(5),
        ping_prompt: PING.to_string(),
        max_response: Duration::from_secs(1),
        max_output_chars: 5000,
        test_pause: Duration::from_millis(5),
        stop_polls: 3,
        stop_poll_interval: Duration::from_millis(5),
    }
}

/// Write prompt files and return them as test cases, in name order.
pub fn write_prompts(dir: &Path, prompts: &[(&str, &str)]) -> Vec<TestCase> {
    std::fs::create_dir_all(dir).unwrap();
    prompts
        .iter()
        .map(|(name, body)| {
            let path = dir.join(name);
            std::fs::write(&path, body).unwrap();
            TestCase {
                name: name.to_string(),
                path,
            }
        })
        .collect()
}

/// Reports one device at a steady 50% utilisation.
pub struct SteadyBackend;

impl TelemetryBackend for SteadyBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn header(&self) -> &'static [&'static str] {
        &PRIMARY_HEADER
    }

    fn sample(&mut self) -> BenchResult<Vec<TelemetrySample>> {
        Ok(vec![TelemetrySample {
            util_gpu_pct: Some(50.0),
            temp_c: Some(60.0),
            power_w: Some(100.0),
            ..TelemetrySample::now(0)
        }])
    }
}

pub fn steady_backend() -> BackendFactory {
    Box::new(|| Box::new(SteadyBackend) as Box<dyn TelemetryBackend>)
}

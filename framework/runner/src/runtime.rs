use anyhow::{bail, Context};
use dyno_core::prelude::{
    BenchResult, CommandExecutor, CommandOutput, CommandSpec, DelegatedShutdownListener,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::RuntimeTimeouts;

/// Environment variable to override the path to the `ollama` binary.
pub const DYNO_OLLAMA_PATH_ENV: &str = "DYNO_OLLAMA_PATH";

/// A model as reported by the runtime's model listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledModel {
    pub name: String,
    pub id: String,
    pub size_bytes: Option<u64>,
}

/// The operations the lifecycle controller needs from a model runtime.
///
/// Calls that may take a long time take a shutdown listener so the operator can abort them.
pub trait ModelRuntime {
    fn pull(
        &self,
        model: &str,
        shutdown_listener: &mut DelegatedShutdownListener,
    ) -> BenchResult<CommandOutput>;

    /// Run `model` with `prompt` on standard input, killing it after `timeout`.
    fn run(
        &self,
        model: &str,
        prompt: &str,
        timeout: Duration,
        shutdown_listener: &mut DelegatedShutdownListener,
    ) -> BenchResult<CommandOutput>;

    fn stop(&self, model: &str) -> BenchResult<CommandOutput>;

    /// Names of the models currently loaded.
    fn list_active(&self) -> BenchResult<Vec<String>>;

    /// Models installed on the runtime.
    fn list_models(&self) -> BenchResult<Vec<InstalledModel>>;
}

/// [ModelRuntime] backed by the `ollama` command line client.
pub struct OllamaCli {
    executor: Arc<CommandExecutor>,
    binary: PathBuf,
    host: String,
    run_as: Option<String>,
    timeouts: RuntimeTimeouts,
}

impl OllamaCli {
    pub fn new(
        executor: Arc<CommandExecutor>,
        binary: PathBuf,
        host: impl Into<String>,
        run_as: Option<String>,
        timeouts: RuntimeTimeouts,
    ) -> Self {
        Self {
            executor,
            binary,
            host: host.into(),
            run_as,
            timeouts,
        }
    }

    /// Build the `ollama` invocation bounded by `deadline`.
    ///
    /// Under `sudo` the executor can only kill the wrapper, which does not pass `SIGKILL` on, so
    /// the deadline is also enforced inside the wrapper with `timeout -s KILL`.
    fn command(&self, args: &[&str], deadline: Duration) -> CommandSpec {
        match &self.run_as {
            Some(user) => CommandSpec::new("sudo")
                .args(["-E", "-u", user.as_str(), "env"])
                .arg(format!("OLLAMA_HOST={}", self.host))
                .args(["timeout", "-s", "KILL"])
                .arg(format!("{}s", deadline.as_secs_f64()))
                .arg(self.binary.display().to_string())
                .args(args.iter().copied()),
            None => CommandSpec::new(&self.binary)
                .args(args.iter().copied())
                .env("OLLAMA_HOST", &self.host),
        }
    }
}

impl ModelRuntime for OllamaCli {
    fn pull(
        &self,
        model: &str,
        shutdown_listener: &mut DelegatedShutdownListener,
    ) -> BenchResult<CommandOutput> {
        self.executor.run_cancellable(
            &self.command(&["pull", model], self.timeouts.pull),
            Some(self.timeouts.pull),
            shutdown_listener,
        )
    }

    fn run(
        &self,
        model: &str,
        prompt: &str,
        timeout: Duration,
        shutdown_listener: &mut DelegatedShutdownListener,
    ) -> BenchResult<CommandOutput> {
        self.executor.run_cancellable(
            &self.command(&["run", model], timeout).stdin(prompt),
            Some(timeout),
            shutdown_listener,
        )
    }

    fn stop(&self, model: &str) -> BenchResult<CommandOutput> {
        self.executor.run(
            &self.command(&["stop", model], self.timeouts.stop),
            Some(self.timeouts.stop),
        )
    }

    fn list_active(&self) -> BenchResult<Vec<String>> {
        let output = self
            .executor
            .run(
                &self.command(&["ps"], self.timeouts.list),
                Some(self.timeouts.list),
            )?
            .into_result()?;
        Ok(parse_active_models(&output.stdout))
    }

    fn list_models(&self) -> BenchResult<Vec<InstalledModel>> {
        let output = self
            .executor
            .run(
                &self.command(&["list"], self.timeouts.list),
                Some(self.timeouts.list),
            )?
            .into_result()?;
        Ok(parse_model_list(&output.stdout))
    }
}

/// Parse the table printed by `ollama list`: `NAME ID SIZE MODIFIED`.
///
/// The size is optional, either as `4.7 GB` or `4.7GB`. Lines without a name and id are skipped.
pub fn parse_model_list(stdout: &str) -> Vec<InstalledModel> {
    table_rows(stdout)
        .filter_map(|columns| {
            let (name, id) = (columns.first()?, columns.get(1)?);
            let size_bytes = match (columns.get(2), columns.get(3)) {
                (Some(value), Some(unit)) if unit_multiplier(unit).is_some() => {
                    parse_size(value, unit)
                }
                (Some(token), _) => split_size_token(token),
                _ => None,
            };

            Some(InstalledModel {
                name: name.to_string(),
                id: id.to_string(),
                size_bytes,
            })
        })
        .collect()
}

/// Model names from the table printed by `ollama ps`.
pub fn parse_active_models(stdout: &str) -> Vec<String> {
    table_rows(stdout)
        .filter_map(|columns| columns.first().map(|name| name.to_string()))
        .collect()
}

fn table_rows(stdout: &str) -> impl Iterator<Item = Vec<&str>> {
    stdout
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>())
        .filter(|columns| !columns.is_empty() && columns[0] != "NAME")
}

fn unit_multiplier(unit: &str) -> Option<f64> {
    match unit.to_ascii_uppercase().as_str() {
        "B" => Some(1.0),
        "KB" => Some(1024.0),
        "MB" => Some(1024.0 * 1024.0),
        "GB" => Some(1024.0 * 1024.0 * 1024.0),
        "TB" => Some(1024.0 * 1024.0 * 1024.0 * 1024.0),
        _ => None,
    }
}

fn parse_size(value: &str, unit: &str) -> Option<u64> {
    let value = value.parse::<f64>().ok()?;
    let multiplier = unit_multiplier(unit)?;
    (value >= 0.0).then(|| (value * multiplier) as u64)
}

fn split_size_token(token: &str) -> Option<u64> {
    let split = token.find(|c: char| c.is_ascii_alphabetic())?;
    let (value, unit) = token.split_at(split);
    parse_size(value, unit)
}

/// Get the path to the `ollama` binary.
///
/// [DYNO_OLLAMA_PATH_ENV] takes precedence over the configured path. With neither set, the binary
/// is looked up on the user's `PATH`.
pub fn ollama_path(configured: Option<&Path>) -> anyhow::Result<PathBuf> {
    let from_env = std::env::var_os(DYNO_OLLAMA_PATH_ENV).map(PathBuf::from);
    resolve_ollama_path(from_env.as_deref().or(configured))
}

fn resolve_ollama_path(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    match explicit {
        Some(path) if path.as_os_str().is_empty() => {
            bail!("Path to the ollama binary is set to an empty string");
        }
        Some(path) if path.components().count() > 1 || path.is_absolute() => {
            if !path.exists() {
                bail!(
                    "Path to the ollama binary is set to '{}' but that path doesn't exist",
                    path.display()
                );
            }
            Ok(path.to_path_buf())
        }
        Some(name) => which::which(name).with_context(|| {
            format!("Binary '{}' not found in PATH", name.display())
        }),
        None => which::which("ollama").with_context(|| {
            format!(
                "Ollama binary not found in PATH. Please install ollama or set '{DYNO_OLLAMA_PATH_ENV}' to the correct path."
            )
        }),
    }
}

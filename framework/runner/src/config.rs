use anyhow::Context;
use dyno_telemetry::SamplerConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::lifecycle::LifecycleConfig;

/// Tunables for a benchmark run, loaded from an optional TOML file.
///
/// Every field has a default, so an empty file (or no file) is a valid configuration. Times are
/// given in seconds.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BenchConfig {
    pub runtime: RuntimeSettings,
    pub lifecycle: LifecycleSettings,
    pub telemetry: TelemetrySettings,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeSettings {
    /// Path to the `ollama` binary, looked up on `PATH` when unset
    pub binary: Option<PathBuf>,
    /// Service user to run `ollama` as, through `sudo`
    pub run_as: Option<String>,
    pub pull_timeout_s: f64,
    pub list_timeout_s: f64,
    pub stop_timeout_s: f64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            binary: None,
            run_as: None,
            pull_timeout_s: 300.0,
            list_timeout_s: 30.0,
            stop_timeout_s: 30.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LifecycleSettings {
    pub ping_attempts: u32,
    pub ping_backoff_s: f64,
    pub ping_margin_s: f64,
    pub ping_prompt: String,
    pub max_response_s: f64,
    pub max_output_chars: usize,
    pub test_pause_s: f64,
    pub stop_polls: u32,
    pub stop_poll_interval_s: f64,
    pub cooldown_s: f64,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            ping_attempts: 3,
            ping_backoff_s: 6.0,
            ping_margin_s: 30.0,
            ping_prompt: "Hello".to_string(),
            max_response_s: 180.0,
            max_output_chars: 5000,
            test_pause_s: 15.0,
            stop_polls: 6,
            stop_poll_interval_s: 3.0,
            cooldown_s: 15.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetrySettings {
    pub interval_s: f64,
    pub smi_binary: PathBuf,
    pub smi_timeout_s: f64,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            interval_s: 2.0,
            smi_binary: PathBuf::from("nvidia-smi"),
            smi_timeout_s: 10.0,
        }
    }
}

impl BenchConfig {
    /// Load the configuration from `path`, or the defaults if no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.lifecycle_config()?;
        config.cooldown()?;
        config.sampler_config()?;
        config.runtime_timeouts()?;
        Ok(config)
    }

    pub fn lifecycle_config(&self) -> anyhow::Result<LifecycleConfig> {
        let l = &self.lifecycle;
        if l.ping_attempts == 0 {
            anyhow::bail!("lifecycle.ping_attempts must be at least 1");
        }

        Ok(LifecycleConfig {
            ping_attempts: l.ping_attempts,
            ping_backoff: seconds("lifecycle.ping_backoff_s", l.ping_backoff_s)?,
            ping_margin: seconds("lifecycle.ping_margin_s", l.ping_margin_s)?,
            ping_prompt: l.ping_prompt.clone(),
            max_response: seconds("lifecycle.max_response_s", l.max_response_s)?,
            max_output_chars: l.max_output_chars,
            test_pause: seconds("lifecycle.test_pause_s", l.test_pause_s)?,
            stop_polls: l.stop_polls,
            stop_poll_interval: seconds("lifecycle.stop_poll_interval_s", l.stop_poll_interval_s)?,
        })
    }

    pub fn cooldown(&self) -> anyhow::Result<Duration> {
        seconds("lifecycle.cooldown_s", self.lifecycle.cooldown_s)
    }

    pub fn sampler_config(&self) -> anyhow::Result<SamplerConfig> {
        let t = &self.telemetry;
        let interval = seconds("telemetry.interval_s", t.interval_s)?;
        if interval.is_zero() {
            anyhow::bail!("telemetry.interval_s must be greater than zero");
        }

        Ok(SamplerConfig {
            interval,
            smi_binary: t.smi_binary.clone(),
            smi_timeout: seconds("telemetry.smi_timeout_s", t.smi_timeout_s)?,
        })
    }

    /// Pull, list and stop timeouts for the model runtime.
    pub fn runtime_timeouts(&self) -> anyhow::Result<RuntimeTimeouts> {
        let r = &self.runtime;
        Ok(RuntimeTimeouts {
            pull: seconds("runtime.pull_timeout_s", r.pull_timeout_s)?,
            list: seconds("runtime.list_timeout_s", r.list_timeout_s)?,
            stop: seconds("runtime.stop_timeout_s", r.stop_timeout_s)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeTimeouts {
    pub pull: Duration,
    pub list: Duration,
    pub stop: Duration,
}

fn seconds(name: &str, value: f64) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f64(value)
        .with_context(|| format!("{name} must be a non-negative number of seconds, got {value}"))
}

use crate::backend::TelemetryBackend;
use crate::sample::{TelemetrySample, FALLBACK_HEADER};
use dyno_core::prelude::{BenchResult, CommandExecutor, CommandSpec};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Fields requested from `nvidia-smi`, in [FALLBACK_HEADER] order after the timestamp.
const QUERY_FIELDS: [&str; 13] = [
    "index",
    "utilization.gpu",
    "utilization.memory",
    "memory.used",
    "memory.total",
    "memory.free",
    "temperature.gpu",
    "power.draw",
    "power.limit",
    "clocks.current.graphics",
    "clocks.current.memory",
    "clocks.current.sm",
    "fan.speed",
];

/// Telemetry scraped from `nvidia-smi` output.
pub struct SmiBackend {
    executor: Arc<CommandExecutor>,
    command: CommandSpec,
    timeout: Duration,
}

impl SmiBackend {
    pub const NAME: &'static str = "nvidia-smi";

    pub fn new(executor: Arc<CommandExecutor>, binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        let command = CommandSpec::new(binary)
            .arg(format!("--query-gpu={}", QUERY_FIELDS.join(",")))
            .arg("--format=csv,noheader,nounits");

        Self {
            executor,
            command,
            timeout,
        }
    }
}

impl TelemetryBackend for SmiBackend {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn header(&self) -> &'static [&'static str] {
        &FALLBACK_HEADER
    }

    fn sample(&mut self) -> BenchResult<Vec<TelemetrySample>> {
        let output = self
            .executor
            .run(&self.command, Some(self.timeout))?
            .into_result()?;

        Ok(parse_smi_output(&output.stdout))
    }
}

/// Parse `--format=csv,noheader,nounits` output, one sample per device line.
///
/// Lines that do not carry every queried field, or whose device index is unreadable, are skipped.
pub fn parse_smi_output(stdout: &str) -> Vec<TelemetrySample> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let fields = line.split(',').map(str::trim).collect::<Vec<_>>();
            if fields.len() < QUERY_FIELDS.len() {
                log::debug!("Ignoring short nvidia-smi line: {line}");
                return None;
            }

            let gpu_index = match fields[0].parse::<u32>() {
                Ok(index) => index,
                Err(_) => {
                    log::debug!("Ignoring nvidia-smi line without a device index: {line}");
                    return None;
                }
            };

            let value = |i: usize| parse_value(fields[i]);
            Some(TelemetrySample {
                util_gpu_pct: value(1),
                util_memory_pct: value(2),
                mem_used_mib: value(3),
                mem_total_mib: value(4),
                mem_free_mib: value(5),
                temp_c: value(6),
                power_w: value(7),
                power_limit_w: value(8),
                clock_core_mhz: value(9),
                clock_memory_mhz: value(10),
                clock_sm_mhz: value(11),
                fan_speed_pct: value(12),
                ..TelemetrySample::now(gpu_index)
            })
        })
        .collect()
}

/// `[N/A]`, `[Not Supported]` and anything else non-numeric become an empty field.
fn parse_value(field: &str) -> Option<f64> {
    field.parse::<f64>().ok().filter(|v| v.is_finite())
}

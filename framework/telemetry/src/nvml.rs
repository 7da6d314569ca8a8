use crate::backend::TelemetryBackend;
use crate::sample::{TelemetrySample, PRIMARY_HEADER};
use dyno_core::prelude::{BenchError, BenchResult};
use nvml_wrapper::enum_wrappers::device::{Clock, PcieUtilCounter, TemperatureSensor};
use nvml_wrapper::error::NvmlError;
use nvml_wrapper::{Device, Nvml};

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Telemetry read through the NVIDIA Management Library.
pub struct NvmlBackend {
    nvml: Nvml,
    device_count: u32,
}

impl NvmlBackend {
    pub const NAME: &'static str = "nvml";

    pub fn init() -> BenchResult<Self> {
        let unavailable = |e: NvmlError| BenchError::BackendUnavailable {
            backend: Self::NAME,
            cause: e.to_string(),
        };

        let nvml = Nvml::init().map_err(unavailable)?;
        let device_count = nvml.device_count().map_err(unavailable)?;
        log::debug!("NVML reports {device_count} device(s)");

        Ok(Self { nvml, device_count })
    }
}

impl TelemetryBackend for NvmlBackend {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn header(&self) -> &'static [&'static str] {
        &PRIMARY_HEADER
    }

    fn sample(&mut self) -> BenchResult<Vec<TelemetrySample>> {
        let mut samples = Vec::with_capacity(self.device_count as usize);
        for index in 0..self.device_count {
            match self.nvml.device_by_index(index) {
                Ok(device) => samples.push(read_device(&device, index)),
                Err(e) => log::warn!("Skipping GPU {index} this tick: {e}"),
            }
        }

        Ok(samples)
    }
}

/// Unwrap one metric reading, logging the failure as a partial metric.
fn metric<T>(device: u32, metric: &'static str, result: Result<T, NvmlError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            log::debug!(
                "{}",
                BenchError::PartialMetric {
                    metric,
                    device,
                    cause: e.to_string(),
                }
            );
            None
        }
    }
}

/// Failed readings are recorded as zero.
fn or_zero<T>(value: Option<T>, f: impl FnOnce(T) -> f64) -> Option<f64> {
    Some(value.map_or(0.0, f))
}

fn read_device(device: &Device, index: u32) -> TelemetrySample {
    let utilization = metric(index, "utilization", device.utilization_rates());
    let memory = metric(index, "memory", device.memory_info());
    let temperature = metric(index, "temperature", device.temperature(TemperatureSensor::Gpu));
    let power = metric(index, "power", device.power_usage());
    let power_limit = metric(index, "power_limit", device.power_management_limit());
    let clock_core = metric(index, "clock_core", device.clock_info(Clock::Graphics));
    let clock_memory = metric(index, "clock_memory", device.clock_info(Clock::Memory));
    let clock_sm = metric(index, "clock_sm", device.clock_info(Clock::SM));
    let fan_speed = metric(index, "fan_speed", device.fan_speed(0));
    let pcie_tx = metric(index, "pcie_tx", device.pcie_throughput(PcieUtilCounter::Send));
    let pcie_rx = metric(index, "pcie_rx", device.pcie_throughput(PcieUtilCounter::Receive));
    let encoder = metric(index, "encoder", device.encoder_utilization());
    let decoder = metric(index, "decoder", device.decoder_utilization());

    TelemetrySample {
        util_gpu_pct: or_zero(utilization.as_ref(), |u| u.gpu as f64),
        util_memory_pct: or_zero(utilization.as_ref(), |u| u.memory as f64),
        mem_used_mib: or_zero(memory.as_ref(), |m| m.used as f64 / BYTES_PER_MIB),
        mem_total_mib: or_zero(memory.as_ref(), |m| m.total as f64 / BYTES_PER_MIB),
        mem_free_mib: or_zero(memory.as_ref(), |m| m.free as f64 / BYTES_PER_MIB),
        temp_c: or_zero(temperature, f64::from),
        // milliwatts
        power_w: or_zero(power, |mw| mw as f64 / 1000.0),
        power_limit_w: or_zero(power_limit, |mw| mw as f64 / 1000.0),
        clock_core_mhz: or_zero(clock_core, f64::from),
        clock_memory_mhz: or_zero(clock_memory, f64::from),
        clock_sm_mhz: or_zero(clock_sm, f64::from),
        fan_speed_pct: or_zero(fan_speed, f64::from),
        // KB/s
        pcie_tx_mbps: or_zero(pcie_tx, |kb| kb as f64 / 1024.0),
        pcie_rx_mbps: or_zero(pcie_rx, |kb| kb as f64 / 1024.0),
        encoder_util_pct: or_zero(encoder, |e| e.utilization as f64),
        decoder_util_pct: or_zero(decoder, |d| d.utilization as f64),
        ..TelemetrySample::now(index)
    }
}

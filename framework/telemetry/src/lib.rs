mod backend;
mod nvml;
mod sample;
mod sampler;
mod sink;
mod smi;

use dyno_core::prelude::CommandExecutor;
use std::sync::Arc;

pub use backend::{choose_backend, BackendFactory, TelemetryBackend};
pub use nvml::NvmlBackend;
pub use sample::{TelemetrySample, FALLBACK_HEADER, PRIMARY_HEADER};
pub use sampler::{SamplerConfig, SamplerState, TelemetrySampler};
pub use sink::{SinkError, TelemetrySink};
pub use smi::{parse_smi_output, SmiBackend};

/// NVML when the driver library loads, `nvidia-smi` otherwise.
pub fn default_backend_factory(
    config: &SamplerConfig,
    executor: Arc<CommandExecutor>,
) -> BackendFactory {
    let smi_binary = config.smi_binary.clone();
    let smi_timeout = config.smi_timeout;

    Box::new(move || {
        choose_backend(
            || Ok(Box::new(NvmlBackend::init()?) as Box<dyn TelemetryBackend>),
            move || Box::new(SmiBackend::new(executor, smi_binary, smi_timeout)),
        )
    })
}

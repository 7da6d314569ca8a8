use chrono::Local;

/// Column layout written by the NVML backend.
pub const PRIMARY_HEADER: [&str; 18] = [
    "timestamp",
    "gpu_index",
    "util_gpu_pct",
    "util_memory_pct",
    "mem_used_MiB",
    "mem_total_MiB",
    "mem_free_MiB",
    "temp_C",
    "power_W",
    "power_limit_W",
    "clock_core_MHz",
    "clock_memory_MHz",
    "clock_sm_MHz",
    "fan_speed_pct",
    "pcie_tx_MBps",
    "pcie_rx_MBps",
    "encoder_util_pct",
    "decoder_util_pct",
];

/// Column layout written by the `nvidia-smi` backend.
///
/// Column order matches [PRIMARY_HEADER] for as far as it goes, so rows of both layouts come from
/// [TelemetrySample::to_record].
pub const FALLBACK_HEADER: [&str; 14] = [
    "timestamp",
    "gpu_index",
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

/// One device reading taken at one sampling tick.
///
/// A metric is `None` when the backend reported it as unavailable, which is written as an empty
/// field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySample {
    pub timestamp: String,
    pub gpu_index: u32,
    pub util_gpu_pct: Option<f64>,
    pub util_memory_pct: Option<f64>,
    pub mem_used_mib: Option<f64>,
    pub mem_total_mib: Option<f64>,
    pub mem_free_mib: Option<f64>,
    pub temp_c: Option<f64>,
    pub power_w: Option<f64>,
    pub power_limit_w: Option<f64>,
    pub clock_core_mhz: Option<f64>,
    pub clock_memory_mhz: Option<f64>,
    pub clock_sm_mhz: Option<f64>,
    pub fan_speed_pct: Option<f64>,
    pub pcie_tx_mbps: Option<f64>,
    pub pcie_rx_mbps: Option<f64>,
    pub encoder_util_pct: Option<f64>,
    pub decoder_util_pct: Option<f64>,
}

impl TelemetrySample {
    /// An empty sample for `gpu_index`, stamped with the current local time.
    pub fn now(gpu_index: u32) -> Self {
        Self {
            timestamp: dyno_summary_model::format_timestamp(&Local::now()),
            gpu_index,
            ..Default::default()
        }
    }

    /// Render the first `columns` fields of the sample as a CSV record.
    pub fn to_record(&self, columns: usize) -> Vec<String> {
        let metrics = [
            self.util_gpu_pct,
            self.util_memory_pct,
            self.mem_used_mib,
            self.mem_total_mib,
            self.mem_free_mib,
            self.temp_c,
            self.power_w,
            self.power_limit_w,
            self.clock_core_mhz,
            self.clock_memory_mhz,
            self.clock_sm_mhz,
            self.fan_speed_pct,
            self.pcie_tx_mbps,
            self.pcie_rx_mbps,
            self.encoder_util_pct,
            self.decoder_util_pct,
        ];

        [self.timestamp.clone(), self.gpu_index.to_string()]
            .into_iter()
            .chain(metrics.into_iter().map(|m| m.map(|v| v.to_string()).unwrap_or_default()))
            .take(columns)
            .collect()
    }
}

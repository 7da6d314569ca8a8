mod cli;
mod config;
mod init;
mod lifecycle;
mod model;
mod progress;
mod recorder;
mod run;
mod runtime;
mod shutdown;
mod test_case;

pub mod prelude {
    pub use crate::cli::DynoCli;
    pub use crate::config::{
        BenchConfig, LifecycleSettings, RuntimeSettings, RuntimeTimeouts, TelemetrySettings,
    };
    pub use crate::init::init_logging;
    pub use crate::lifecycle::{
        LifecycleConfig, ModelLifecycle, ModelOutcome, ModelPhase, StopOutcome,
    };
    pub use crate::model::{estimate_load_time, same_model, ModelUnderTest};
    pub use crate::progress::model_progress;
    pub use crate::recorder::{CsvResultSink, InMemoryResultSink, RecordSink};
    pub use crate::run::{run, run_benchmark, BenchmarkPlan, RunReport};
    pub use crate::runtime::{
        ollama_path, parse_active_models, parse_model_list, InstalledModel, ModelRuntime,
        OllamaCli, DYNO_OLLAMA_PATH_ENV,
    };
    pub use crate::test_case::{load_test_cases, prompts_dir_for, TestCase};
}

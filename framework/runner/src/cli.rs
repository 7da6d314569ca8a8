use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dyno", version, about, long_about = None)]
pub struct DynoCli {
    /// Address of the model runtime to benchmark, for example `127.0.0.1:11435`
    #[clap(long)]
    pub host: String,

    /// A model to benchmark. Models are processed in the order given.
    ///
    /// Specify multiple models by using the flag multiple times. For example `--model llama3 --model mistral:7b`.
    #[clap(short, long = "model", required = true)]
    pub models: Vec<String>,

    /// Directory containing the prompt files, one `*.txt` file per test case
    #[clap(long, default_value = "prompts")]
    pub prompts_dir: PathBuf,

    /// Use the prompts in the `<prompts-dir>/<language>` subdirectory, if it exists
    #[clap(long)]
    pub language: Option<String>,

    /// Directory under which the `results`, `telemetry` and `logs` directories are created
    #[clap(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// TOML file overriding the default timings, retries and budgets
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Run the model runtime client as this user, through `sudo`
    #[clap(long)]
    pub run_as: Option<String>,

    /// Do not show progress bars on the CLI.
    ///
    /// This is recommended for unattended runs where the progress bars are just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,

    /// Do not build the aggregate report at the end of the run
    #[clap(long, default_value = "false")]
    pub no_report: bool,
}

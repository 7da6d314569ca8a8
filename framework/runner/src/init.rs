use anyhow::Context;
use env_logger::{Builder, Env, Target, WriteStyle};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Initialise logging for the `dyno` binary.
///
/// Log lines go to stderr and, when `log_file` is given, to that file as well. `RUST_LOG` overrides
/// the default `info` filter.
pub fn init_logging(log_file: Option<&Path>) -> anyhow::Result<()> {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));

    if let Some(path) = log_file {
        let file = File::create(path)
            .with_context(|| format!("Failed to create log file {}", path.display()))?;
        builder
            .target(Target::Pipe(Box::new(TeeWriter { file })))
            .write_style(WriteStyle::Never);
    }

    builder.try_init().context("Logging was already initialised")
}

/// Copies everything written to stderr and a file.
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        std::io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stderr().flush()?;
        self.file.flush()
    }
}

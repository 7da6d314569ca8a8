use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{BenchError, BenchResult};
use crate::shutdown::DelegatedShutdownListener;

/// Description of an external command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: PathBuf,
    args: Vec<String>,
    env: Vec<(String, String)>,
    stdin: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child, on top of the inherited environment.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Deliver `input` to the child on its standard input, then close it.
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

/// Renders the command line for logs. Standard input is never included.
impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// How an external command finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The process exited with this code.
    Code(i32),
    /// The process was terminated by a signal and has no exit code.
    Signalled,
    /// The process did not finish within its timeout and was killed.
    TimedOut,
    /// The process was killed because a shutdown was requested.
    Cancelled,
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Code(code) => write!(f, "exit code {code}"),
            ExitStatus::Signalled => write!(f, "termination by signal"),
            ExitStatus::TimedOut => write!(f, "timeout"),
            ExitStatus::Cancelled => write!(f, "cancellation"),
        }
    }
}

/// Captured result of running a [CommandSpec].
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub status: ExitStatus,
    pub elapsed: Duration,
    pub timeout: Option<Duration>,
}

impl CommandOutput {
    pub fn is_success(&self) -> bool {
        self.status == ExitStatus::Code(0)
    }

    pub fn timed_out(&self) -> bool {
        self.status == ExitStatus::TimedOut
    }

    pub fn cancelled(&self) -> bool {
        self.status == ExitStatus::Cancelled
    }

    fn without_output(
        command: String,
        status: ExitStatus,
        started: Instant,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            command,
            stdout: String::new(),
            stderr: String::new(),
            status,
            elapsed: started.elapsed(),
            timeout,
        }
    }

    /// Convert a timeout or a non-zero exit into the matching [BenchError].
    pub fn into_result(self) -> BenchResult<Self> {
        match self.status {
            ExitStatus::Code(0) => Ok(self),
            ExitStatus::TimedOut => Err(BenchError::ProcessTimeout {
                command: self.command,
                timeout: self.timeout.unwrap_or(self.elapsed),
            }),
            status => Err(BenchError::ProcessFailure {
                command: self.command,
                status: status.to_string(),
                stderr: self.stderr.trim().to_string(),
            }),
        }
    }
}

/// Runs external commands on behalf of synchronous callers.
///
/// Owns the Tokio runtime that drives child processes, so it can be shared between the
/// orchestration thread and the telemetry thread.
#[derive(Debug)]
pub struct CommandExecutor {
    runtime: tokio::runtime::Runtime,
}

impl CommandExecutor {
    pub fn new() -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("dyno-executor")
            .enable_all()
            .build()?;

        Ok(Self { runtime })
    }

    /// Run `spec` to completion, blocking the calling thread.
    ///
    /// If `timeout` elapses first the child is killed and the output has [ExitStatus::TimedOut].
    /// Must not be called from within an async context.
    pub fn run(&self, spec: &CommandSpec, timeout: Option<Duration>) -> BenchResult<CommandOutput> {
        self.runtime.block_on(run_command(spec, timeout))
    }

    /// Like [CommandExecutor::run], but the child is also killed as soon as `shutdown_listener`
    /// observes a shutdown, in which case the output has [ExitStatus::Cancelled].
    pub fn run_cancellable(
        &self,
        spec: &CommandSpec,
        timeout: Option<Duration>,
        shutdown_listener: &mut DelegatedShutdownListener,
    ) -> BenchResult<CommandOutput> {
        let started = Instant::now();
        self.runtime.block_on(async {
            tokio::select! {
                output = run_command(spec, timeout) => output,
                _ = shutdown_listener.wait_for_shutdown() => {
                    log::debug!("`{spec}` cancelled by shutdown");
                    Ok(CommandOutput::without_output(
                        spec.to_string(),
                        ExitStatus::Cancelled,
                        started,
                        timeout,
                    ))
                }
            }
        })
    }

    /// Submit async code to be run in the background.
    pub fn spawn(&self, fut: impl Future<Output = ()> + Send + 'static) {
        self.runtime.spawn(fut);
    }
}

async fn run_command(spec: &CommandSpec, timeout: Option<Duration>) -> BenchResult<CommandOutput> {
    let command = spec.to_string();
    log::trace!("Executing: {command}");

    let started = Instant::now();
    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| BenchError::Spawn {
            command: command.clone(),
            source,
        })?;

    let stdin = child.stdin.take();
    let input = spec.stdin.clone();
    let feed = async move {
        if let (Some(mut stdin), Some(input)) = (stdin, input) {
            // The child may exit without reading everything, which closes the pipe under us.
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                log::debug!("Could not deliver the full input to the child: {e}");
            }
        }
    };
    let collect = async move {
        let ((), output) = tokio::join!(feed, child.wait_with_output());
        output
    };

    let output = match timeout {
        Some(limit) => match tokio::time::timeout(limit, collect).await {
            Ok(output) => output,
            Err(_) => {
                // Dropping `collect` dropped the child, which kills it.
                log::debug!("`{command}` timed out after {limit:?}");
                return Ok(CommandOutput::without_output(
                    command,
                    ExitStatus::TimedOut,
                    started,
                    timeout,
                ));
            }
        },
        None => collect.await,
    }
    .map_err(|source| BenchError::Spawn {
        command: command.clone(),
        source,
    })?;

    let status = match output.status.code() {
        Some(code) => ExitStatus::Code(code),
        None => ExitStatus::Signalled,
    };

    Ok(CommandOutput {
        command,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        status,
        elapsed: started.elapsed(),
        timeout,
    })
}

mod command;
mod error;
mod shutdown;

pub mod prelude {
    pub use crate::command::{CommandExecutor, CommandOutput, CommandSpec, ExitStatus};
    pub use crate::error::{BenchError, BenchResult};
    pub use crate::shutdown::{
        DelegatedShutdownListener, ShutdownHandle, ShutdownSignalError, SHUTDOWN_POLL_INTERVAL,
    };
}

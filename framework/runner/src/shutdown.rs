use dyno_core::prelude::{CommandExecutor, ShutdownHandle};
use tokio::signal;

/// Trigger the returned handle when the operator presses Ctrl-C.
pub(crate) fn start_shutdown_listener(executor: &CommandExecutor) -> ShutdownHandle {
    let handle = ShutdownHandle::default();

    let listener_handle = handle.clone();
    executor.spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                log::warn!("Received shutdown signal, finishing the current model and stopping");
                listener_handle.shutdown();
            }
            Err(e) => log::error!("Failed to listen for the shutdown signal: {e}"),
        }
    });

    handle
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::{Receiver, Sender};
use tokio::sync::Mutex;

/// The longest a [DelegatedShutdownListener::sleep] call goes without checking for a shutdown.
pub const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Sending side of a cancellation signal.
///
/// The owner calls [ShutdownHandle::shutdown] once; every listener created from the handle then
/// observes the signal. Dropping the last handle is treated as a shutdown by the listeners.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Sender<()>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            sender: tokio::sync::broadcast::channel(1).0,
        }
    }

    pub fn shutdown(&self) {
        if let Err(e) = self.sender.send(()) {
            // Will fail if nobody is listening for a shutdown signal, in which case the log message
            // can be ignored.
            log::warn!("Failed to send shutdown signal: {e:?}");
        }
    }

    pub fn new_listener(&self) -> DelegatedShutdownListener {
        DelegatedShutdownListener::new(self.sender.subscribe())
    }
}

#[derive(Clone, Debug)]
pub struct DelegatedShutdownListener {
    receiver: Arc<Mutex<Receiver<()>>>,
    triggered: Arc<AtomicBool>,
}

impl DelegatedShutdownListener {
    pub(crate) fn new(receiver: Receiver<()>) -> Self {
        Self {
            receiver: Arc::new(Mutex::new(receiver)),
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Point in time check if the shutdown signal has been received.
    ///
    /// Once this has returned true it keeps returning true, for this listener and its clones.
    pub fn should_shutdown(&mut self) -> bool {
        if self.triggered.load(Ordering::Acquire) {
            return true;
        }

        let received = match self.receiver.try_lock() {
            Ok(mut guard) => match guard.try_recv() {
                Ok(_) | Err(TryRecvError::Closed) | Err(TryRecvError::Lagged(_)) => true,
                Err(TryRecvError::Empty) => false,
            },
            Err(_) => false,
        };

        if received {
            self.triggered.store(true, Ordering::Release);
        }

        received
    }

    /// Wait asynchronously until the shutdown signal is received.
    pub async fn wait_for_shutdown(&mut self) {
        if self.triggered.load(Ordering::Acquire) {
            return;
        }

        // Ok, Closed and Lagged all mean the handle has signalled or gone away.
        let _ = self.receiver.lock().await.recv().await;
        self.triggered.store(true, Ordering::Release);
    }

    /// Block the calling thread for `duration`, waking up every [SHUTDOWN_POLL_INTERVAL] to check
    /// for the shutdown signal.
    ///
    /// Returns true if the sleep was cut short because a shutdown was requested.
    pub fn sleep(&mut self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.should_shutdown() {
                return true;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }

            std::thread::sleep(remaining.min(SHUTDOWN_POLL_INTERVAL));
        }
    }
}

#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct ShutdownSignalError {
    msg: String,
}

impl Default for ShutdownSignalError {
    fn default() -> Self {
        Self {
            msg: "Execution cancelled by shutdown signal".to_string(),
        }
    }
}

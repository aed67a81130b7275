//! Cooperative stop signal shared by every background task.
//!
//! Collectors never poll a global flag; they are handed a [`Shutdown`] and
//! race their sleeps against it.

use std::time::Duration;

use tokio::sync::watch;

/// Sending half. Dropping it also counts as a stop request.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Ask every attached [`Shutdown`] to stop.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Receiving half, cheap to clone.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Outcome of [`Shutdown::sleep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// The full duration elapsed.
    Elapsed,
    /// Shutdown was requested before the duration elapsed.
    Stopped,
}

impl Shutdown {
    /// Create a linked trigger/receiver pair.
    pub fn new() -> (ShutdownTrigger, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger { tx }, Shutdown { rx })
    }

    /// A signal that never fires, for one-shot runs and tests.
    pub fn never() -> Shutdown {
        let (tx, rx) = watch::channel(false);
        // Keep the sender alive for the life of the process.
        std::mem::forget(tx);
        Shutdown { rx }
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been requested.
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        // An error means the trigger was dropped, which also means stop.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// Sleep for `duration` unless shutdown is requested first.
    pub async fn sleep(&self, duration: Duration) -> Wake {
        if self.is_stopped() {
            return Wake::Stopped;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => Wake::Elapsed,
            _ = self.stopped() => Wake::Stopped,
        }
    }
}

//! Cooperative shutdown signal built on `tokio::sync::watch`.
//!
//! - `ShutdownTrigger::trigger()` flips the flag once; later calls are no-ops.
//! - `ShutdownSignal` is cheap to clone and can be awaited from any task.
//! - Dropping the trigger counts as shutdown, so orphaned listeners never hang.

use tokio::sync::watch;

/// Create a connected trigger/signal pair.
pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

/// Sending half. Owned by whoever decides when to stop.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Request shutdown. Returns `true` only for the call that flipped the flag.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving half.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested (or the trigger is gone).
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // sender dropped => treat as shutdown
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

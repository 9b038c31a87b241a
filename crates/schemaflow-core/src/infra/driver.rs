//! Handle owning the stop signal for a workflow's background orchestrator
//! driver task, grounded on the same stop-channel-ownership pattern as
//! `heartbeat.rs`: the sender lives here, not in the spawned task, so it
//! isn't dropped the instant the task is spawned.

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::instrument;

/// `join` arrives via a oneshot rather than being passed to `new` directly:
/// the handle must be registered *before* `tokio::spawn` runs so a
/// concurrent `cancel`/`shutdown` can never find the registry entry
/// missing, but `tokio::spawn` only returns the `JoinHandle` after the
/// task already exists. The sender is filled in immediately after spawn.
pub struct DriverHandle {
    stop_tx: watch::Sender<bool>,
    join_rx: oneshot::Receiver<JoinHandle<()>>,
}

impl DriverHandle {
    pub fn new(stop_tx: watch::Sender<bool>, join_rx: oneshot::Receiver<JoinHandle<()>>) -> Self {
        Self { stop_tx, join_rx }
    }

    /// Signals stop and waits for the driver task to finish. Only safe to
    /// call from outside the driver task itself — a task cannot await its
    /// own `JoinHandle`.
    #[instrument(skip(self))]
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Ok(join) = self.join_rx.await {
            let _ = join.await;
        }
    }
}

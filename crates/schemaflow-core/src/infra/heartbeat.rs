//! Heartbeat loop (spec §4.E): every 30s, updates `last_heartbeat` for the
//! workflow; on backend failure logs and continues; stops when its stop
//! channel closes.

use std::sync::Arc;
use std::time::Duration;

use schemaflow_contracts::WorkflowRepository;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{instrument, warn};
use uuid::Uuid;

pub struct HeartbeatHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl HeartbeatHandle {
    pub fn spawn(
        workflow_id: Uuid,
        server_id: String,
        repo: Arc<dyn WorkflowRepository>,
        interval: Duration,
    ) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = repo.update_heartbeat(workflow_id, &server_id).await {
                            warn!(%workflow_id, error = %err, "heartbeat update failed");
                        }
                    }
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            return;
                        }
                    }
                }
            }
        });
        Self { stop_tx, join }
    }

    #[instrument(skip(self))]
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.join.await;
    }
}

//! Task-queue snapshot writer (spec §4.E): a single consumer per workflow
//! over a buffered channel. Drains additional pending updates on receipt
//! and persists only the latest (debounce), so concurrent task
//! transitions never race each other writing the UI snapshot. A full
//! buffer drops the update with a warning rather than blocking a task.

use std::sync::Arc;

use schemaflow_contracts::{TaskSnapshot, WorkflowRepository};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

pub struct TaskQueueWriter {
    tx: mpsc::Sender<Vec<TaskSnapshot>>,
    join: JoinHandle<()>,
}

/// A cloneable, non-blocking handle to a spawned [`TaskQueueWriter`]'s
/// channel, for closures (e.g. `WorkQueue::set_on_update`) that must
/// outlive the writer's own scope.
#[derive(Clone)]
pub struct WriterSender(mpsc::Sender<Vec<TaskSnapshot>>);

impl WriterSender {
    pub fn send(&self, snapshot: Vec<TaskSnapshot>) {
        if self.0.try_send(snapshot).is_err() {
            warn!("task queue writer buffer full, dropping update");
        }
    }
}

impl TaskQueueWriter {
    pub fn sender(&self) -> WriterSender {
        WriterSender(self.tx.clone())
    }

    pub fn spawn(workflow_id: Uuid, repo: Arc<dyn WorkflowRepository>, buffer_size: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Vec<TaskSnapshot>>(buffer_size.max(1));
        let join = tokio::spawn(async move {
            while let Some(mut latest) = rx.recv().await {
                while let Ok(next) = rx.try_recv() {
                    latest = next;
                }
                if let Err(err) = repo.update_task_queue(workflow_id, latest).await {
                    warn!(%workflow_id, error = %err, "task queue snapshot write failed");
                }
            }
        });
        Self { tx, join }
    }

    /// Non-blocking; drops the update with a warning if the buffer is full.
    pub fn send(&self, snapshot: Vec<TaskSnapshot>) {
        if self.tx.try_send(snapshot).is_err() {
            warn!("task queue writer buffer full, dropping update");
        }
    }

    /// Closes the channel and waits for the final buffered snapshot (if
    /// any) to flush before returning.
    pub async fn close(self) {
        drop(self.tx);
        let _ = self.join.await;
    }
}

//! Workflow infra (spec §4.E): per-process registries of active queues,
//! task-queue writers, and heartbeats, plus the graceful shutdown
//! sequence that tears every one of them down.

mod driver;
mod heartbeat;
mod writer;

pub use driver::DriverHandle;
pub use heartbeat::HeartbeatHandle;
pub use writer::TaskQueueWriter;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use schemaflow_contracts::WorkflowRepository;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::queue::WorkQueue;

/// Per-process registries, keyed by `workflow_id`. One instance is shared
/// across every phase workflow service in the process.
pub struct WorkflowInfra {
    server_instance_id: String,
    workflow_repo: Arc<dyn WorkflowRepository>,
    queues: DashMap<Uuid, Arc<WorkQueue>>,
    writers: DashMap<Uuid, TaskQueueWriter>,
    heartbeats: DashMap<Uuid, HeartbeatHandle>,
    drivers: DashMap<Uuid, DriverHandle>,
}

impl WorkflowInfra {
    pub fn new(workflow_repo: Arc<dyn WorkflowRepository>) -> Arc<Self> {
        Arc::new(Self {
            server_instance_id: Uuid::now_v7().to_string(),
            workflow_repo,
            queues: DashMap::new(),
            writers: DashMap::new(),
            heartbeats: DashMap::new(),
            drivers: DashMap::new(),
        })
    }

    pub fn server_instance_id(&self) -> &str {
        &self.server_instance_id
    }

    pub fn queue(&self, workflow_id: Uuid) -> Option<Arc<WorkQueue>> {
        self.queues.get(&workflow_id).map(|q| Arc::clone(&q))
    }

    /// Registers the background driver task's stop handle, keeping its
    /// `watch::Sender` alive so the orchestrator's `run` loop can actually
    /// be signalled (and so its receiver doesn't observe a closed channel
    /// the instant the task is spawned).
    pub fn register_driver(&self, workflow_id: Uuid, handle: DriverHandle) {
        self.drivers.insert(workflow_id, handle);
    }

    /// Registers a workflow's queue, heartbeat, and task-queue writer in
    /// one call, matching the order spec §4.F step 6 requires them stood
    /// up in.
    pub fn register(
        &self,
        workflow_id: Uuid,
        queue: Arc<WorkQueue>,
        heartbeat_interval: Duration,
        writer_buffer_size: usize,
    ) {
        let heartbeat = HeartbeatHandle::spawn(
            workflow_id,
            self.server_instance_id.clone(),
            Arc::clone(&self.workflow_repo),
            heartbeat_interval,
        );
        let writer = TaskQueueWriter::spawn(workflow_id, Arc::clone(&self.workflow_repo), writer_buffer_size);

        let repo = Arc::clone(&self.workflow_repo);
        let writer_tx = writer_sender_for(&writer);
        queue.set_on_update(move |snapshot| {
            writer_tx(snapshot.to_vec());
        });
        let _ = repo; // writer already closes over its own repo handle

        self.queues.insert(workflow_id, queue);
        self.heartbeats.insert(workflow_id, heartbeat);
        self.writers.insert(workflow_id, writer);
    }

    /// Tears down one workflow's registrations without touching others:
    /// stops its driver, cancels its queue, stops its heartbeat, closes
    /// its writer, and releases the ownership lease. For external callers
    /// only (`PhaseWorkflowService::cancel`/`shutdown`) — the driver task
    /// itself must use [`Self::finish_driver`] instead, since a task
    /// cannot await its own `JoinHandle`.
    #[instrument(skip(self))]
    pub async fn teardown(&self, workflow_id: Uuid) {
        if let Some((_, driver)) = self.drivers.remove(&workflow_id) {
            // Awaiting `stop` joins the driver task, whose own exit path
            // (`finish_driver`) already released the queue/heartbeat/writer
            // and the ownership lease — releasing them again here would
            // double-release (e.g. a second `release_ownership` against an
            // already-released or already-deleted row).
            driver.stop().await;
        } else {
            self.release_resources(workflow_id).await;
        }
    }

    /// Releases a workflow's resources from within its own driver task, as
    /// it exits on its own (completion, cancellation-via-signal, or
    /// failure): removes the driver's registry entry without awaiting its
    /// join handle — which would deadlock, since the caller *is* that
    /// task — then releases everything else exactly as [`Self::teardown`]
    /// does.
    #[instrument(skip(self))]
    pub async fn finish_driver(&self, workflow_id: Uuid) {
        self.drivers.remove(&workflow_id);
        self.release_resources(workflow_id).await;
    }

    async fn release_resources(&self, workflow_id: Uuid) {
        let mut released_anything = false;

        if let Some((_, queue)) = self.queues.remove(&workflow_id) {
            queue.cancel();
            released_anything = true;
        }
        if let Some((_, heartbeat)) = self.heartbeats.remove(&workflow_id) {
            heartbeat.stop().await;
            released_anything = true;
        }
        if let Some((_, writer)) = self.writers.remove(&workflow_id) {
            writer.close().await;
            released_anything = true;
        }

        // Without this guard, a `teardown`/`finish_driver` reaching a
        // workflow whose resources were already released by the other path
        // (e.g. `cancel()` called on a workflow whose driver already exited
        // naturally) would call `release_ownership` a second time.
        if !released_anything {
            return;
        }
        if let Err(err) = self.workflow_repo.release_ownership(workflow_id).await {
            warn!(%workflow_id, error = %err, "failed to release ownership during teardown");
        }
    }

    /// Cancels every active queue, stops every heartbeat, and releases
    /// every held ownership lease, bounded by `deadline`.
    #[instrument(skip(self))]
    pub async fn shutdown(&self, deadline: Duration) {
        let workflow_ids: Vec<Uuid> = self.queues.iter().map(|e| *e.key()).collect();
        info!(count = workflow_ids.len(), "shutting down workflow infra");

        let shutdown_all = async {
            for workflow_id in workflow_ids {
                self.teardown(workflow_id).await;
            }
        };

        if tokio::time::timeout(deadline, shutdown_all).await.is_err() {
            warn!("workflow infra shutdown exceeded deadline");
        }
    }
}

/// `DashMap`'s `Ref` guard can't be held across the closure passed to
/// `set_on_update`; re-send through a lightweight cloneable handle instead.
fn writer_sender_for(writer: &TaskQueueWriter) -> impl Fn(Vec<schemaflow_contracts::TaskSnapshot>) + Send + Sync + 'static {
    let sender = writer.sender();
    move |snapshot| sender.send(snapshot)
}

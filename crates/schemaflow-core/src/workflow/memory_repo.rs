//! In-memory `WorkflowRepository`, grounded on the ownership-claim
//! semantics in spec §4.F step 5 and §6: a conditional update gated on
//! `owner_server_id IS NULL OR last_heartbeat < now - stale_after`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use schemaflow_contracts::{
    ContractError, Phase, Progress, TaskSnapshot, Workflow, WorkflowRepository, WorkflowState,
};
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryWorkflowRepository {
    rows: Mutex<HashMap<Uuid, Workflow>>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn create(&self, workflow: Workflow) -> Result<Workflow, ContractError> {
        let mut rows = self.rows.lock();
        rows.insert(workflow.workflow_id, workflow.clone());
        Ok(workflow)
    }

    async fn get_by_id(&self, workflow_id: Uuid) -> Result<Workflow, ContractError> {
        self.rows
            .lock()
            .get(&workflow_id)
            .cloned()
            .ok_or(ContractError::WorkflowNotFound(workflow_id))
    }

    async fn get_latest_by_project(&self, project_id: Uuid) -> Result<Option<Workflow>, ContractError> {
        let rows = self.rows.lock();
        Ok(rows
            .values()
            .filter(|w| w.project_id == project_id)
            .max_by_key(|w| w.started_at)
            .cloned())
    }

    async fn get_latest_by_datasource_and_phase(
        &self,
        datasource_id: Uuid,
        phase: Phase,
    ) -> Result<Option<Workflow>, ContractError> {
        let rows = self.rows.lock();
        Ok(rows
            .values()
            .filter(|w| w.datasource_id == Some(datasource_id) && w.phase == phase)
            .max_by_key(|w| w.started_at)
            .cloned())
    }

    async fn get_by_ontology(&self, ontology_id: Uuid) -> Result<Option<Workflow>, ContractError> {
        let rows = self.rows.lock();
        Ok(rows.values().find(|w| w.ontology_id == Some(ontology_id)).cloned())
    }

    async fn update_state(
        &self,
        workflow_id: Uuid,
        state: WorkflowState,
        error: Option<String>,
    ) -> Result<(), ContractError> {
        let mut rows = self.rows.lock();
        let workflow = rows
            .get_mut(&workflow_id)
            .ok_or(ContractError::WorkflowNotFound(workflow_id))?;
        workflow.state = state;
        if let Some(error) = error {
            workflow.progress.message = error;
        }
        if state == WorkflowState::Running && workflow.started_at.is_none() {
            workflow.started_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn update_progress(&self, workflow_id: Uuid, progress: Progress) -> Result<(), ContractError> {
        let mut rows = self.rows.lock();
        let workflow = rows
            .get_mut(&workflow_id)
            .ok_or(ContractError::WorkflowNotFound(workflow_id))?;
        workflow.progress = progress;
        Ok(())
    }

    async fn update_task_queue(
        &self,
        workflow_id: Uuid,
        task_queue: Vec<TaskSnapshot>,
    ) -> Result<(), ContractError> {
        let mut rows = self.rows.lock();
        let workflow = rows
            .get_mut(&workflow_id)
            .ok_or(ContractError::WorkflowNotFound(workflow_id))?;
        workflow.task_queue = task_queue;
        Ok(())
    }

    async fn delete(&self, workflow_id: Uuid) -> Result<(), ContractError> {
        self.rows.lock().remove(&workflow_id);
        Ok(())
    }

    async fn claim_ownership(
        &self,
        workflow_id: Uuid,
        server_id: &str,
        stale_after: std::time::Duration,
    ) -> Result<bool, ContractError> {
        let mut rows = self.rows.lock();
        let workflow = rows
            .get_mut(&workflow_id)
            .ok_or(ContractError::WorkflowNotFound(workflow_id))?;

        let claimable = match (&workflow.owner_server_id, workflow.last_heartbeat) {
            (None, _) => true,
            (Some(_), None) => true,
            (Some(_), Some(last)) => {
                Utc::now() - last > chrono::Duration::from_std(stale_after).unwrap_or_default()
            }
        };

        if claimable {
            workflow.owner_server_id = Some(server_id.to_string());
            workflow.last_heartbeat = Some(Utc::now());
        }
        Ok(claimable)
    }

    async fn release_ownership(&self, workflow_id: Uuid) -> Result<(), ContractError> {
        let mut rows = self.rows.lock();
        let workflow = rows
            .get_mut(&workflow_id)
            .ok_or(ContractError::WorkflowNotFound(workflow_id))?;
        workflow.owner_server_id = None;
        Ok(())
    }

    async fn update_heartbeat(&self, workflow_id: Uuid, server_id: &str) -> Result<DateTime<Utc>, ContractError> {
        let mut rows = self.rows.lock();
        let workflow = rows
            .get_mut(&workflow_id)
            .ok_or(ContractError::WorkflowNotFound(workflow_id))?;
        if workflow.owner_server_id.as_deref() != Some(server_id) {
            return Err(ContractError::OwnershipConflict(workflow_id));
        }
        let now = Utc::now();
        workflow.last_heartbeat = Some(now);
        Ok(now)
    }

    async fn get_next_version(&self, project_id: Uuid) -> Result<u32, ContractError> {
        let rows = self.rows.lock();
        let max = rows
            .values()
            .filter(|w| w.project_id == project_id && w.phase == Phase::Ontology)
            .filter_map(|w| w.ontology_id.is_some().then_some(1u32))
            .count() as u32;
        Ok(max + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemaflow_contracts::WorkflowConfig;

    fn workflow(project_id: Uuid, phase: Phase) -> Workflow {
        Workflow::new(
            project_id,
            phase,
            WorkflowConfig {
                datasource_id: None,
                project_description: None,
            },
        )
    }

    #[tokio::test]
    async fn claim_ownership_succeeds_when_unowned() {
        let repo = InMemoryWorkflowRepository::new();
        let w = repo.create(workflow(Uuid::now_v7(), Phase::Entities)).await.unwrap();
        let claimed = repo
            .claim_ownership(w.workflow_id, "server-a", std::time::Duration::from_secs(120))
            .await
            .unwrap();
        assert!(claimed);
    }

    #[tokio::test]
    async fn claim_ownership_fails_when_freshly_owned() {
        let repo = InMemoryWorkflowRepository::new();
        let w = repo.create(workflow(Uuid::now_v7(), Phase::Entities)).await.unwrap();
        repo.claim_ownership(w.workflow_id, "server-a", std::time::Duration::from_secs(120))
            .await
            .unwrap();
        let second = repo
            .claim_ownership(w.workflow_id, "server-b", std::time::Duration::from_secs(120))
            .await
            .unwrap();
        assert!(!second);
    }

    #[tokio::test]
    async fn claim_ownership_succeeds_when_stale() {
        let repo = InMemoryWorkflowRepository::new();
        let w = repo.create(workflow(Uuid::now_v7(), Phase::Entities)).await.unwrap();
        {
            let mut rows = repo.rows.lock();
            let row = rows.get_mut(&w.workflow_id).unwrap();
            row.owner_server_id = Some("server-a".into());
            row.last_heartbeat = Some(Utc::now() - chrono::Duration::minutes(10));
        }
        let claimed = repo
            .claim_ownership(w.workflow_id, "server-b", std::time::Duration::from_secs(120))
            .await
            .unwrap();
        assert!(claimed);
    }

    #[tokio::test]
    async fn release_ownership_clears_owner() {
        let repo = InMemoryWorkflowRepository::new();
        let w = repo.create(workflow(Uuid::now_v7(), Phase::Entities)).await.unwrap();
        repo.claim_ownership(w.workflow_id, "server-a", std::time::Duration::from_secs(120))
            .await
            .unwrap();
        repo.release_ownership(w.workflow_id).await.unwrap();
        let fetched = repo.get_by_id(w.workflow_id).await.unwrap();
        assert!(fetched.owner_server_id.is_none());
    }
}

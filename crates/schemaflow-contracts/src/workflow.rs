//! The `Workflow` aggregate: one run of a phase over one datasource.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task_snapshot::TaskSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Entities,
    Relationships,
    Ontology,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Entities => "entities",
            Phase::Relationships => "relationships",
            Phase::Ontology => "ontology",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowState::Completed | WorkflowState::Failed | WorkflowState::Cancelled
        )
    }
}

/// Per-workflow progress reported to the UI. Updated by the orchestrator
/// (current/total entity counts) and by the phase workflow service
/// (completion/failure messages).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Progress {
    pub current_phase: String,
    pub current: u32,
    pub total: u32,
    pub message: String,
}

/// Per-workflow configuration supplied by the caller starting the phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub datasource_id: Option<Uuid>,
    pub project_description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub workflow_id: Uuid,
    pub project_id: Uuid,
    /// Placeholder (nil) for non-ontology phases.
    pub ontology_id: Option<Uuid>,
    pub datasource_id: Option<Uuid>,
    pub phase: Phase,
    pub state: WorkflowState,
    pub progress: Progress,
    pub task_queue: Vec<TaskSnapshot>,
    pub config: WorkflowConfig,
    pub owner_server_id: Option<String>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
}

impl Workflow {
    pub fn new(project_id: Uuid, phase: Phase, config: WorkflowConfig) -> Self {
        Self {
            workflow_id: Uuid::now_v7(),
            project_id,
            ontology_id: None,
            datasource_id: config.datasource_id,
            phase,
            state: WorkflowState::Pending,
            progress: Progress {
                current_phase: phase.as_str().to_string(),
                ..Default::default()
            },
            task_queue: Vec::new(),
            config,
            owner_server_id: None,
            last_heartbeat: None,
            started_at: None,
        }
    }
}

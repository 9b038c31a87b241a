//! Denormalised task-queue snapshot persisted solely for UI consumption.
//!
//! Never authoritative: the in-memory work queue is the source of truth
//! for scheduling decisions, this is a projection of it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSnapshotStatus {
    Queued,
    Processing,
    Complete,
    Failed,
    Paused,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSnapshot {
    pub id: Uuid,
    pub name: String,
    pub status: TaskSnapshotStatus,
    pub requires_llm: bool,
    pub error: Option<String>,
    pub retry_count: u32,
}

impl TaskSnapshot {
    pub fn queued(id: Uuid, name: impl Into<String>, requires_llm: bool) -> Self {
        Self {
            id,
            name: name.into(),
            status: TaskSnapshotStatus::Queued,
            requires_llm,
            error: None,
            retry_count: 0,
        }
    }
}

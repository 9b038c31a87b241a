//! Relationship candidates discovered during the relationships phase.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    ValueMatch,
    NameInference,
    Llm,
    Hybrid,
    ForeignKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipCandidate {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub source: ColumnRef,
    pub target: ColumnRef,
    pub detection_method: DetectionMethod,
    pub value_match_rate: Option<f64>,
    pub cardinality: Option<String>,
    pub confidence: f64,
    pub status: CandidateStatus,
    pub is_required: bool,
}

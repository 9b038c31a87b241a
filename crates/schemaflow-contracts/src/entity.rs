//! Per-entity persisted workflow state.
//!
//! Entity keys follow a small grammar so they can round-trip through a
//! plain string column: `GLOBAL | "T:" tableName | "C:" tableName "." columnName`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of entity a `WorkflowEntityState` row tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Global,
    Table,
    Column,
}

/// A structured, grammar-checked entity key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Global,
    Table(String),
    Column(String, String),
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum EntityKeyParseError {
    #[error("empty entity key")]
    Empty,
    #[error("column key missing '.' separator: {0}")]
    MissingColumnSeparator(String),
    #[error("unrecognized entity key: {0}")]
    Unrecognized(String),
}

impl EntityKey {
    pub fn entity_type(&self) -> EntityType {
        match self {
            EntityKey::Global => EntityType::Global,
            EntityKey::Table(_) => EntityType::Table,
            EntityKey::Column(_, _) => EntityType::Column,
        }
    }

    pub fn table(table: impl Into<String>) -> Self {
        EntityKey::Table(table.into())
    }

    pub fn column(table: impl Into<String>, column: impl Into<String>) -> Self {
        EntityKey::Column(table.into(), column.into())
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Global => write!(f, "GLOBAL"),
            EntityKey::Table(table) => write!(f, "T:{table}"),
            EntityKey::Column(table, column) => write!(f, "C:{table}.{column}"),
        }
    }
}

impl FromStr for EntityKey {
    type Err = EntityKeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(EntityKeyParseError::Empty);
        }
        if s == "GLOBAL" {
            return Ok(EntityKey::Global);
        }
        if let Some(rest) = s.strip_prefix("T:") {
            return Ok(EntityKey::Table(rest.to_string()));
        }
        if let Some(rest) = s.strip_prefix("C:") {
            return match rest.split_once('.') {
                Some((table, column)) => Ok(EntityKey::Column(table.to_string(), column.to_string())),
                None => Err(EntityKeyParseError::MissingColumnSeparator(s.to_string())),
            };
        }
        Err(EntityKeyParseError::Unrecognized(s.to_string()))
    }
}

impl Serialize for EntityKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EntityKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        EntityKey::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Status of a single entity's progress through its state machine (spec §4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Pending,
    Scanning,
    Scanned,
    Processing,
    Completed,
    Failed,
}

impl EntityStatus {
    /// Transient states: the orchestrator must wait for the queue rather
    /// than enqueue new work for an entity in one of these.
    pub fn is_transient(&self) -> bool {
        matches!(self, EntityStatus::Scanning | EntityStatus::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EntityStatus::Completed | EntityStatus::Failed)
    }
}

/// Persisted per-(workflow, entity) status and opaque payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEntityState {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub entity_key: EntityKey,
    pub status: EntityStatus,
    /// Opaque, append-mostly JSON payload (e.g. column statistics, fingerprints).
    /// Domain tasks define their own typed views over this at their boundary.
    pub state_data: serde_json::Value,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowEntityState {
    pub fn new(workflow_id: Uuid, entity_key: EntityKey) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            workflow_id,
            entity_key,
            status: EntityStatus::Pending,
            state_data: serde_json::json!({"gathered": {}}),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_key.entity_type()
    }

    /// The opaque `gathered` sub-object domain tasks read/write.
    pub fn gathered(&self) -> &serde_json::Value {
        self.state_data.get("gathered").unwrap_or(&serde_json::Value::Null)
    }

    pub fn set_gathered(&mut self, gathered: serde_json::Value) {
        self.state_data = serde_json::json!({"gathered": gathered});
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global() {
        assert_eq!("GLOBAL".parse::<EntityKey>().unwrap(), EntityKey::Global);
    }

    #[test]
    fn parses_table() {
        assert_eq!(
            "T:orders".parse::<EntityKey>().unwrap(),
            EntityKey::Table("orders".into())
        );
    }

    #[test]
    fn parses_column() {
        assert_eq!(
            "C:orders.user_id".parse::<EntityKey>().unwrap(),
            EntityKey::Column("orders".into(), "user_id".into())
        );
    }

    #[test]
    fn rejects_malformed_column() {
        assert!(matches!(
            "C:orders".parse::<EntityKey>(),
            Err(EntityKeyParseError::MissingColumnSeparator(_))
        ));
    }

    #[test]
    fn round_trips_display() {
        let key = EntityKey::column("orders", "user_id");
        let rendered = key.to_string();
        assert_eq!(rendered.parse::<EntityKey>().unwrap(), key);
    }

    #[test]
    fn entity_type_matches_variant() {
        assert_eq!(EntityKey::Global.entity_type(), EntityType::Global);
        assert_eq!(EntityKey::table("t").entity_type(), EntityType::Table);
        assert_eq!(EntityKey::column("t", "c").entity_type(), EntityType::Column);
    }

    #[test]
    fn transient_and_terminal_classification() {
        assert!(EntityStatus::Scanning.is_transient());
        assert!(EntityStatus::Processing.is_transient());
        assert!(!EntityStatus::Pending.is_transient());
        assert!(EntityStatus::Completed.is_terminal());
        assert!(EntityStatus::Failed.is_terminal());
        assert!(!EntityStatus::Scanned.is_terminal());
    }
}

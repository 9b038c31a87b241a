//! Domain data contracts for the schema-understanding workflow core.
//!
//! This crate defines value types shared by the orchestration engine and
//! its external collaborators, plus trait-only interfaces for
//! collaborators whose internals are out of scope for this workspace
//! (LLM clients, datasource adapters, tenant-scoped connection
//! acquisition, and the persisted workflow/entity-state repositories).
//! Nothing here performs I/O.

pub mod collaborators;
pub mod entity;
pub mod ontology;
pub mod relationship;
pub mod schema;
pub mod store;
pub mod task_snapshot;
pub mod workflow;

pub use collaborators::{LlmClient, LlmResponse, SchemaDiscoverer, TenantConnection, TenantContextProvider};
pub use entity::{EntityKey, EntityKeyParseError, EntityStatus, EntityType, WorkflowEntityState};
pub use ontology::{EntitySource, PromotionFields};
pub use relationship::{CandidateStatus, ColumnRef, DetectionMethod, RelationshipCandidate};
pub use schema::TableSchema;
pub use store::{ContractError, EntityStateStore, WorkflowRepository};
pub use task_snapshot::{TaskSnapshot, TaskSnapshotStatus};
pub use workflow::{Phase, Progress, Workflow, WorkflowConfig, WorkflowState};

//! Trait-only interfaces for external collaborators named in spec §6.
//!
//! The core invokes these from within task `Execute` implementations; it
//! never talks to an LLM, a datasource, or a tenant connection pool
//! directly. Concrete implementations (HTTP clients, driver adapters)
//! live outside this workspace.

use async_trait::async_trait;
use uuid::Uuid;

#[derive(Debug, Clone, thiserror::Error)]
pub enum CollaboratorError {
    #[error("llm call failed: {0}")]
    Llm(String),
    #[error("datasource error: {0}")]
    Datasource(String),
    #[error("failed to acquire tenant-scoped connection for project {0}")]
    TenantAcquire(Uuid),
}

/// Result of a single LLM generation call.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Capability set exposed by an LLM client (spec §6). Implementations are
/// safe for concurrent use, matching `ParallelLLMStrategy`'s assumption
/// that many LLM tasks may be in flight at once.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate_response(
        &self,
        prompt: &str,
        system: Option<&str>,
        temperature: f32,
        thinking: bool,
    ) -> Result<LlmResponse, CollaboratorError>;

    async fn create_embeddings(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, CollaboratorError>;

    fn get_model(&self) -> &str;
}

/// Column statistics gathered by a schema discoverer handle.
#[derive(Debug, Clone)]
pub struct ColumnStats {
    pub row_count: u64,
    pub null_count: u64,
    pub distinct_count: u64,
    pub sample_values: Vec<String>,
}

/// Handle returned by a datasource adapter's discoverer factory (spec §6).
#[async_trait]
pub trait SchemaDiscoverer: Send + Sync {
    async fn analyze_column_stats(
        &self,
        table: &str,
        column: &str,
    ) -> Result<ColumnStats, CollaboratorError>;

    async fn get_distinct_values(
        &self,
        table: &str,
        column: &str,
        limit: u32,
    ) -> Result<Vec<String>, CollaboratorError>;

    async fn analyze_join(
        &self,
        left: &str,
        left_column: &str,
        right: &str,
        right_column: &str,
    ) -> Result<f64, CollaboratorError>;

    async fn close(&self) -> Result<(), CollaboratorError>;
}

/// A tenant-scoped connection acquired for the lifetime of a single task
/// execution. Dropping it releases the underlying resource.
pub trait TenantConnection: Send {}

/// `TenantContextFunc(ctx, project_id) -> (ctx', release, err)` from spec §5,
/// expressed as a trait so each background worker can acquire its own
/// connection rather than sharing a single pooled one across tasks.
#[async_trait]
pub trait TenantContextProvider: Send + Sync {
    async fn acquire(&self, project_id: Uuid) -> Result<Box<dyn TenantConnection>, CollaboratorError>;
}

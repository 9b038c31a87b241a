//! Crate-wide error types, one enum per subsystem (teacher's convention:
//! `StoreError`, `WorkerPoolError`, `PollerError` in `everruns-durable`).

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("task {0} not found in queue")]
    TaskNotFound(Uuid),

    #[error("queue is shutting down")]
    ShuttingDown,
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("store error: {0}")]
    Store(#[from] schemaflow_contracts::ContractError),

    #[error("workflow {0} failed: {1}")]
    WorkflowFailed(Uuid, String),

    #[error("orchestrator cancelled for workflow {0}")]
    Cancelled(Uuid),
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("workflow {0} is already owned by another server")]
    AlreadyOwned(Uuid),

    #[error("store error: {0}")]
    Store(#[from] schemaflow_contracts::ContractError),
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum CoercionError {
    #[error("missing required parameter: {0}")]
    MissingRequired(String),

    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    #[error("invalid decimal: {0}")]
    InvalidDecimal(String),

    #[error("invalid boolean: {0}")]
    InvalidBoolean(String),

    #[error("invalid uuid: {0}")]
    InvalidUuid(String),

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("undeclared parameter token in template: {0}")]
    UndeclaredTemplateToken(String),
}

//! Task abstraction (spec §4.A).
//!
//! A task is a unit of work with identity, a name, an LLM flag, a retry
//! policy, and an `execute` contract. `Execute` must be safe to run
//! concurrently with other tasks according to the queue's strategy, and
//! idempotent relative to persisted entity state: re-running after a
//! crash before commit must not corrupt state.

mod context;

pub use context::TaskContext;

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::queue::retry::RetryPolicy;

/// Error returned by a task's `execute`. The queue decides retry vs.
/// permanent failure from `permanent`; a task may force permanent failure
/// (e.g. malformed input) even on its first attempt.
#[derive(Debug, Clone)]
pub struct TaskError {
    pub message: String,
    pub permanent: bool,
}

impl TaskError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            permanent: false,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            permanent: true,
        }
    }
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TaskError {}

/// Capability passed to a task allowing it to append further tasks to the
/// same queue, without holding a back-pointer to the queue itself
/// (spec §9 — breaks the orchestrator/queue/task reference cycle).
pub trait Enqueuer: Send + Sync {
    fn enqueue(&self, task: Arc<dyn Task>);
}

/// A unit of work with identity, an LLM flag, and a retry policy.
///
/// A task SHOULD advance one entity (or a small set) through at most one
/// state-machine step (spec §4.A).
#[async_trait]
pub trait Task: Send + Sync {
    fn id(&self) -> Uuid;

    fn name(&self) -> &str;

    fn requires_llm(&self) -> bool;

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
    }

    /// Optional key into a circuit-breaker gate consulted before dispatch
    /// (SPEC_FULL §4 supplement 3). `None` means no breaker applies.
    fn circuit_breaker_key(&self) -> Option<&str> {
        None
    }

    async fn execute(
        &self,
        ctx: TaskContext,
        enqueuer: &dyn Enqueuer,
    ) -> Result<serde_json::Value, TaskError>;
}

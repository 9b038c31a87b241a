//! Engine crate: task queue, scheduling strategies, in-memory reference
//! stores, workflow service, orchestrator, and the deterministic scoring
//! and generation helpers (spec §4).
//!
//! Mirrors `everruns_durable`'s shape: a `prelude` re-exporting the types
//! most callers need, plus direct module access for everything else.

pub mod circuit;
pub mod config;
pub mod entity;
pub mod error;
pub mod infra;
pub mod orchestrator;
pub mod params;
pub mod promotion;
pub mod question_gen;
pub mod queue;
pub mod task;
pub mod workflow;

pub use config::EngineConfig;
pub use error::{CoercionError, OrchestratorError, QueueError, ServiceError};

pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::entity::InMemoryEntityStateStore;
    pub use crate::orchestrator::Orchestrator;
    pub use crate::queue::{
        ArcEnqueuer, ParallelLLMStrategy, RetryPolicy, SchedulingStrategy, SerialStrategy,
        WorkQueue,
    };
    pub use crate::task::{CancellationHandle, Enqueuer, Task, TaskContext, TaskError};
    pub use crate::workflow::{InMemoryWorkflowRepository, PhaseWorkflowService};
}

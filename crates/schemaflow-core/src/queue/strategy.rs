//! Scheduling strategies (spec §4.C): pluggable policies for which pending
//! tasks may start given the currently running set.
//!
//! Property every implementation must uphold: `admit(pending, running) ⊆
//! pending`, and the tasks it returns must preserve the strategy's
//! invariant once moved into `running`.

use uuid::Uuid;

/// The minimal view of a task a strategy needs to decide admission.
#[derive(Debug, Clone, Copy)]
pub struct TaskInfo {
    pub id: Uuid,
    pub requires_llm: bool,
}

pub trait SchedulingStrategy: Send + Sync {
    /// Returns the subset of `pending` (in the same relative order) that
    /// may transition to running given what is currently running.
    fn admit(&self, pending: &[TaskInfo], running: &[TaskInfo]) -> Vec<Uuid>;
}

/// At most one running task at any time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialStrategy;

impl SchedulingStrategy for SerialStrategy {
    fn admit(&self, pending: &[TaskInfo], running: &[TaskInfo]) -> Vec<Uuid> {
        if !running.is_empty() {
            return Vec::new();
        }
        pending.first().map(|t| vec![t.id]).unwrap_or_default()
    }
}

/// Unlimited concurrency among `requires_llm = true` tasks; at most one
/// non-LLM task running at a time. LLM calls are I/O-bound and already
/// rate-limited externally; data tasks mutate shared rows and must
/// serialise to avoid write conflicts.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParallelLLMStrategy;

impl SchedulingStrategy for ParallelLLMStrategy {
    fn admit(&self, pending: &[TaskInfo], running: &[TaskInfo]) -> Vec<Uuid> {
        let mut non_llm_busy = running.iter().any(|t| !t.requires_llm);
        let mut admitted = Vec::new();

        for task in pending {
            if task.requires_llm {
                admitted.push(task.id);
            } else if !non_llm_busy {
                admitted.push(task.id);
                non_llm_busy = true;
            }
        }

        admitted
    }
}

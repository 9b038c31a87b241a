//! Execution context handed to a task, grounded on
//! `everruns_durable::activity::ActivityContext`: attempt bookkeeping plus
//! a cooperative cancellation flag shared with the owning queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

/// Handle the work queue holds to request cancellation of a running task.
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancellationHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

/// Context provided to a task during execution.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: Uuid,
    pub attempt: u32,
    pub max_attempts: u32,
    cancelled: Arc<AtomicBool>,
}

impl TaskContext {
    pub fn new(task_id: Uuid, attempt: u32, max_attempts: u32) -> Self {
        Self {
            task_id,
            attempt,
            max_attempts,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancellation_handle(&self) -> CancellationHandle {
        CancellationHandle {
            cancelled: self.cancelled.clone(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Resolves once cancellation has been requested; for use in
    /// `tokio::select!` inside a task's `execute`.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    }
}

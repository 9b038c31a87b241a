//! Work queue (spec §4.B): holds pending and running tasks, consults a
//! [`SchedulingStrategy`] whenever the set changes, and retries failed
//! tasks with exponential backoff.

pub mod retry;
pub mod strategy;

pub use retry::RetryPolicy;
pub use strategy::{ParallelLLMStrategy, SchedulingStrategy, SerialStrategy, TaskInfo};

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use schemaflow_contracts::{TaskSnapshot, TaskSnapshotStatus};
use tokio::sync::Notify;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::circuit::CircuitBreakerGate;
use crate::task::{CancellationHandle, Enqueuer, Task, TaskContext};

/// A task that exhausted its retries, kept for operator inspection
/// (SPEC_FULL supplement 1 — DLQ-style failure log).
#[derive(Debug, Clone)]
pub struct FailedTask {
    pub id: Uuid,
    pub name: String,
    pub error: String,
    pub attempts: u32,
}

struct PendingEntry {
    task: Arc<dyn Task>,
    attempt: u32,
}

struct RunningEntry {
    name: String,
    requires_llm: bool,
    cancel: CancellationHandle,
}

#[derive(Default)]
struct Inner {
    pending: VecDeque<PendingEntry>,
    running: HashMap<Uuid, RunningEntry>,
    /// Terminal (complete/failed) snapshots, retained so a task's last
    /// observed state survives its removal from `running` — without this,
    /// a task vanishes from the projection instead of settling at
    /// `complete`/`failed` (spec §7 category 4, §8 monotonicity).
    terminal: Vec<TaskSnapshot>,
}

type OnUpdate = dyn Fn(&[TaskSnapshot]) + Send + Sync;

/// Dispatches tasks according to a [`SchedulingStrategy`], retrying
/// failures with backoff and notifying `on_update` on every transition.
///
/// Must be held behind an `Arc` — tasks enqueue further work through the
/// same queue (via [`Enqueuer`]), and the dispatch loop re-spawns itself
/// after every completion.
pub struct WorkQueue {
    strategy: Arc<dyn SchedulingStrategy>,
    inner: Mutex<Inner>,
    notify: Notify,
    on_update: Mutex<Option<Box<OnUpdate>>>,
    cancelled: AtomicBool,
    failed: Mutex<Vec<FailedTask>>,
    circuit_breaker: Option<Arc<dyn CircuitBreakerGate>>,
}

impl WorkQueue {
    pub fn new(strategy: Arc<dyn SchedulingStrategy>) -> Arc<Self> {
        Arc::new(Self {
            strategy,
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
            on_update: Mutex::new(None),
            cancelled: AtomicBool::new(false),
            failed: Mutex::new(Vec::new()),
            circuit_breaker: None,
        })
    }

    /// Attaches a circuit-breaker gate consulted before dispatch
    /// (SPEC_FULL §4 supplement 3). Without one, behavior is identical to
    /// the base queue described in spec §4.B.
    pub fn with_circuit_breaker(strategy: Arc<dyn SchedulingStrategy>, breaker: Arc<dyn CircuitBreakerGate>) -> Arc<Self> {
        Arc::new(Self {
            strategy,
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
            on_update: Mutex::new(None),
            cancelled: AtomicBool::new(false),
            failed: Mutex::new(Vec::new()),
            circuit_breaker: Some(breaker),
        })
    }

    pub fn set_on_update(&self, cb: impl Fn(&[TaskSnapshot]) + Send + Sync + 'static) {
        *self.on_update.lock() = Some(Box::new(cb));
    }

    pub fn failed_tasks(&self) -> Vec<FailedTask> {
        self.failed.lock().clone()
    }

    #[instrument(skip(self, task), fields(task_name = task.name()))]
    pub fn enqueue(self: &Arc<Self>, task: Arc<dyn Task>) {
        if self.cancelled.load(Ordering::Relaxed) {
            warn!("enqueue after cancel ignored");
            return;
        }
        self.inner
            .lock()
            .pending
            .push_back(PendingEntry { task, attempt: 1 });
        self.emit_snapshot();
        self.dispatch();
    }

    /// Transitions pending tasks to cancelled and asks running tasks to
    /// stop via their context. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
        let mut inner = self.inner.lock();
        inner.pending.clear();
        for running in inner.running.values() {
            running.cancel.cancel();
        }
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Blocks until no task is pending or running.
    pub async fn wait(&self) {
        loop {
            // Registered before the idle check so a completion landing
            // between the check and the await isn't a missed wakeup —
            // `notify_waiters` only wakes waiters already polling.
            let notified = self.notify.notified();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    fn is_idle(&self) -> bool {
        let inner = self.inner.lock();
        inner.pending.is_empty() && inner.running.is_empty()
    }

    fn emit_snapshot(&self) {
        let cb = self.on_update.lock();
        let Some(cb) = cb.as_ref() else { return };
        let inner = self.inner.lock();
        let mut snapshot: Vec<TaskSnapshot> = inner
            .pending
            .iter()
            .map(|e| {
                let mut s = TaskSnapshot::queued(e.task.id(), e.task.name(), e.task.requires_llm());
                s.retry_count = e.attempt.saturating_sub(1);
                s
            })
            .collect();
        snapshot.extend(inner.running.iter().map(|(id, r)| TaskSnapshot {
            id: *id,
            name: r.name.clone(),
            status: TaskSnapshotStatus::Processing,
            requires_llm: r.requires_llm,
            error: None,
            retry_count: 0,
        }));
        snapshot.extend(inner.terminal.iter().cloned());
        drop(inner);
        cb(&snapshot);
    }

    /// Consults the strategy with the current (pending, running) view and
    /// starts every task it clears. Called after every enqueue and after
    /// every completion, per the spec's dispatch loop.
    fn dispatch(self: &Arc<Self>) {
        if self.cancelled.load(Ordering::Relaxed) {
            return;
        }

        let to_start = {
            let inner = self.inner.lock();
            let pending_info: Vec<TaskInfo> = inner
                .pending
                .iter()
                .filter(|e| !self.breaker_open(e.task.as_ref()))
                .map(|e| TaskInfo {
                    id: e.task.id(),
                    requires_llm: e.task.requires_llm(),
                })
                .collect();
            let running_info: Vec<TaskInfo> = inner
                .running
                .iter()
                .map(|(id, r)| TaskInfo {
                    id: *id,
                    requires_llm: r.requires_llm,
                })
                .collect();
            let blocked_by_breaker = inner.pending.len() > pending_info.len();
            (self.strategy.admit(&pending_info, &running_info), blocked_by_breaker)
        };
        let (to_start, blocked_by_breaker) = to_start;

        for task_id in to_start {
            self.start_one(task_id);
        }

        // Tasks excluded from admission solely by an open breaker would
        // otherwise never be reconsidered, since dispatch only re-runs on
        // enqueue/completion. Schedule one re-check after the breaker's
        // reset window so a half-open transition is noticed promptly.
        if blocked_by_breaker && !self.cancelled.load(Ordering::Relaxed) {
            let queue = Arc::clone(self);
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(250)).await;
                queue.dispatch();
            });
        }
    }

    /// A task whose `circuit_breaker_key` maps to an open breaker is
    /// treated as not-yet-admissible: it stays pending and is retried on
    /// the next dispatch without burning a retry attempt.
    fn breaker_open(&self, task: &dyn Task) -> bool {
        let Some(breaker) = self.circuit_breaker.as_ref() else {
            return false;
        };
        let Some(key) = task.circuit_breaker_key() else {
            return false;
        };
        breaker.is_open(key)
    }

    fn start_one(self: &Arc<Self>, task_id: Uuid) {
        let entry = {
            let mut inner = self.inner.lock();
            let pos = inner.pending.iter().position(|e| e.task.id() == task_id);
            let Some(pos) = pos else { return };
            let entry = inner.pending.remove(pos).expect("position just checked");
            let ctx = TaskContext::new(task_id, entry.attempt, entry.task.retry_policy().max_attempts);
            inner.running.insert(
                task_id,
                RunningEntry {
                    name: entry.task.name().to_string(),
                    requires_llm: entry.task.requires_llm(),
                    cancel: ctx.cancellation_handle(),
                },
            );
            (entry.task, entry.attempt, ctx)
        };
        let (task, attempt, ctx) = entry;
        self.emit_snapshot();

        let queue = Arc::clone(self);
        tokio::spawn(async move {
            let enqueuer = ArcEnqueuer(Arc::clone(&queue));
            let result = task.execute(ctx, &enqueuer).await;
            queue.finish_one(task, attempt, result).await;
        });
    }

    #[instrument(skip(self, task, result), fields(task_name = task.name()))]
    async fn finish_one(
        self: &Arc<Self>,
        task: Arc<dyn Task>,
        attempt: u32,
        result: Result<serde_json::Value, crate::task::TaskError>,
    ) {
        self.inner.lock().running.remove(&task.id());

        match result {
            Ok(_) => {
                info!("task completed");
                self.inner.lock().terminal.push(TaskSnapshot {
                    id: task.id(),
                    name: task.name().to_string(),
                    status: TaskSnapshotStatus::Complete,
                    requires_llm: task.requires_llm(),
                    error: None,
                    retry_count: attempt.saturating_sub(1),
                });
            }
            Err(err) => {
                let policy = task.retry_policy();
                if !err.permanent && policy.has_attempts_remaining(attempt) {
                    let delay = policy.delay_for_attempt(attempt + 1);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, "task failed, retrying");
                    let queue = Arc::clone(self);
                    let task = Arc::clone(&task);
                    tokio::spawn(async move {
                        if delay > std::time::Duration::ZERO {
                            tokio::time::sleep(delay).await;
                        }
                        if queue.cancelled.load(Ordering::Relaxed) {
                            return;
                        }
                        queue.inner.lock().pending.push_back(PendingEntry {
                            task,
                            attempt: attempt + 1,
                        });
                        queue.emit_snapshot();
                        queue.dispatch();
                    });
                } else {
                    warn!(attempt, error = %err, "task permanently failed");
                    self.failed.lock().push(FailedTask {
                        id: task.id(),
                        name: task.name().to_string(),
                        error: err.to_string(),
                        attempts: attempt,
                    });
                    self.inner.lock().terminal.push(TaskSnapshot {
                        id: task.id(),
                        name: task.name().to_string(),
                        status: TaskSnapshotStatus::Failed,
                        requires_llm: task.requires_llm(),
                        error: Some(err.to_string()),
                        retry_count: attempt,
                    });
                }
            }
        }

        self.emit_snapshot();
        self.notify.notify_waiters();
        self.dispatch();
    }
}

/// Adapter handed to tasks as `&dyn Enqueuer`, closing over the `Arc` so
/// `enqueue` can re-trigger dispatch. `WorkQueue::enqueue` itself requires
/// `&Arc<Self>` (dispatch re-spawns through the same `Arc`), which a task
/// running inside `execute` does not hold — this wraps one for it.
pub struct ArcEnqueuer(pub Arc<WorkQueue>);

impl Enqueuer for ArcEnqueuer {
    fn enqueue(&self, task: Arc<dyn Task>) {
        self.0.enqueue(task);
    }
}

//! Process-wide engine configuration (spec §6), following the
//! `WorkerPoolConfig`/`BackpressureConfig` builder style: a `Default`
//! carrying the spec's stated defaults plus `with_*` setters.

use std::time::Duration;

/// Process-wide defaults; per-workflow overrides live on
/// `schemaflow_contracts::WorkflowConfig`.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub heartbeat_interval: Duration,
    pub ownership_stale_after: Duration,
    pub snapshot_buffer_size: usize,
    pub orchestrator_poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 24,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(30),
            ownership_stale_after: Duration::from_secs(120),
            snapshot_buffer_size: 100,
            orchestrator_poll_interval: Duration::from_secs(1),
        }
    }
}

impl EngineConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_backoff(mut self, d: Duration) -> Self {
        self.initial_backoff = d;
        self
    }

    pub fn with_max_backoff(mut self, d: Duration) -> Self {
        self.max_backoff = d;
        self
    }

    pub fn with_heartbeat_interval(mut self, d: Duration) -> Self {
        self.heartbeat_interval = d;
        self
    }

    pub fn with_ownership_stale_after(mut self, d: Duration) -> Self {
        self.ownership_stale_after = d;
        self
    }

    pub fn with_snapshot_buffer_size(mut self, size: usize) -> Self {
        self.snapshot_buffer_size = size;
        self
    }

    pub fn with_orchestrator_poll_interval(mut self, d: Duration) -> Self {
        self.orchestrator_poll_interval = d;
        self
    }
}

//! Circuit-breaker hook point on the scheduling strategy boundary
//! (SPEC_FULL §4 supplement 3).
//!
//! Grounded on `everruns_durable::reliability::CircuitBreakerConfig` /
//! `CircuitState`, trimmed to a local (non-distributed) in-memory variant:
//! the teacher's Postgres-shared breaker protects external service calls
//! across workers, but the work queue only needs a per-process gate
//! consulted before dispatch. A task whose breaker is open is treated as
//! not-yet-admissible and retried later without burning a retry attempt.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Circuit breaker states, matching the teacher's three-state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }
}

/// Gate consulted by the work queue before dispatch. A task is admissible
/// only if its `circuit_breaker_key` (if any) is not open.
pub trait CircuitBreakerGate: Send + Sync {
    fn is_open(&self, key: &str) -> bool;
    fn record_success(&self, key: &str);
    fn record_failure(&self, key: &str);
}

struct KeyState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
}

impl KeyState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            opened_at: None,
        }
    }
}

/// Per-process, in-memory breaker keyed by circuit name. Unlike the
/// teacher's `DistributedCircuitBreaker`, state is not shared across
/// server instances — fine for gating local dispatch, not for
/// cross-worker rate coordination.
pub struct InMemoryCircuitBreaker {
    config: CircuitBreakerConfig,
    keys: Mutex<HashMap<String, KeyState>>,
}

impl InMemoryCircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            keys: Mutex::new(HashMap::new()),
        }
    }

    fn maybe_half_open(&self, entry: &mut KeyState) {
        if entry.state == CircuitState::Open {
            if let Some(opened_at) = entry.opened_at {
                if opened_at.elapsed() >= self.config.reset_timeout {
                    entry.state = CircuitState::HalfOpen;
                    entry.success_count = 0;
                }
            }
        }
    }
}

impl CircuitBreakerGate for InMemoryCircuitBreaker {
    fn is_open(&self, key: &str) -> bool {
        let mut keys = self.keys.lock();
        let entry = keys.entry(key.to_string()).or_insert_with(KeyState::closed);
        self.maybe_half_open(entry);
        entry.state == CircuitState::Open
    }

    fn record_success(&self, key: &str) {
        let mut keys = self.keys.lock();
        let entry = keys.entry(key.to_string()).or_insert_with(KeyState::closed);
        self.maybe_half_open(entry);
        match entry.state {
            CircuitState::Closed => entry.failure_count = 0,
            CircuitState::HalfOpen => {
                entry.success_count += 1;
                if entry.success_count >= self.config.success_threshold {
                    entry.state = CircuitState::Closed;
                    entry.failure_count = 0;
                    entry.success_count = 0;
                    entry.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self, key: &str) {
        let mut keys = self.keys.lock();
        let entry = keys.entry(key.to_string()).or_insert_with(KeyState::closed);
        self.maybe_half_open(entry);
        match entry.state {
            CircuitState::Closed => {
                entry.failure_count += 1;
                if entry.failure_count >= self.config.failure_threshold {
                    entry.state = CircuitState::Open;
                    entry.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                entry.state = CircuitState::Open;
                entry.opened_at = Some(Instant::now());
                entry.success_count = 0;
            }
            CircuitState::Open => {}
        }
    }
}

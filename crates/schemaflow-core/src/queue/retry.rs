//! Retry policy: exponential backoff with jitter (spec §4.B).
//!
//! Defaults per spec: initial 2s, cap 30s, max 24 attempts, jitter ≤ ±20%.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub backoff_coefficient: f64,
    /// Jitter factor in [0.0, 1.0]; 0.2 means up to ±20%.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 24,
            initial_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(30),
            backoff_coefficient: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before the given attempt (1-based; attempt 1 is the first
    /// try and has no delay).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let retry_num = attempt - 1;
        let base = self.initial_interval.as_secs_f64()
            * self.backoff_coefficient.powi(retry_num as i32 - 1);
        let capped = base.min(self.max_interval.as_secs_f64());

        let jittered = if self.jitter > 0.0 {
            let mut rng = rand::thread_rng();
            let range = capped * self.jitter;
            let offset = rng.gen_range(-range..=range);
            (capped + offset).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered)
    }

    pub fn has_attempts_remaining(&self, current_attempt: u32) -> bool {
        current_attempt < self.max_attempts
    }
}

//! Backoff policy for poll tasks
//!
//! The delay resets to `initial` on success and grows by `multiplier`
//! on every failure, never exceeding `max`.

use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default first delay between refreshes
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(12);

/// Default ceiling for a failing refresh
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(120);

/// Default growth factor applied after a failure
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl BackoffPolicy {
    pub fn new(initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Result<Self> {
        if initial_delay.is_zero() {
            return Err(eyre!("Backoff initial delay must be positive"));
        }
        if max_delay < initial_delay {
            return Err(eyre!(
                "Backoff max delay ({:?}) is below the initial delay ({:?})",
                max_delay,
                initial_delay
            ));
        }
        if !(multiplier > 1.0) || !multiplier.is_finite() {
            return Err(eyre!("Backoff multiplier must be > 1 (got {})", multiplier));
        }

        Ok(Self {
            initial_delay,
            max_delay,
            multiplier,
        })
    }

    fn grow(&self, delay: Duration) -> Duration {
        let grown = delay.as_secs_f64() * self.multiplier;
        if grown >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(grown)
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
        }
    }
}

/// Mutable delay state owned by one running poll loop
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    delay: Duration,
    consecutive_failures: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            delay: policy.initial_delay,
            policy,
            consecutive_failures: 0,
        }
    }

    /// Current delay before the next invocation
    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn on_success(&mut self) -> Duration {
        self.consecutive_failures = 0;
        self.delay = self.policy.initial_delay;
        self.delay
    }

    pub fn on_failure(&mut self) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.delay = self.policy.grow(self.delay);
        self.delay
    }
}

// ============================================
// TESTS
// ============================================

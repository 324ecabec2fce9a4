//! Consecutive-failure circuit breaker.
//!
//! The breaker opens once `failure_threshold` failures have been recorded
//! without an intervening success, and reports closed again as soon as
//! `timeout` has passed since the most recent failure. There is no half-open
//! trial state: the first attempt after the timeout is an ordinary attempt,
//! and a single further failure reopens the breaker immediately because the
//! failure count is still at or above the threshold.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::CircuitBreakerConfig;
use crate::ratelimit::duration_from_ms;

/// Snapshot of the breaker for monitoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerStatus {
    pub is_open: bool,
    pub failures: u32,
    pub threshold: u32,
    pub last_failure: Option<DateTime<Utc>>,
    pub timeout_ms: u64,
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    last_failure_at: Option<DateTime<Utc>>,
}

impl BreakerState {
    fn is_open(&self, now: DateTime<Utc>, threshold: u32, timeout: Duration) -> bool {
        if self.consecutive_failures < threshold {
            return false;
        }
        match self.last_failure_at {
            Some(last) => now - last < timeout,
            None => false,
        }
    }
}

/// A thread-safe circuit breaker shared by every validation call.
pub struct CircuitBreaker {
    threshold: u32,
    timeout: Duration,
    state: Mutex<BreakerState>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(config: &CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            threshold: config.failure_threshold,
            timeout: duration_from_ms(config.timeout_ms),
            state: Mutex::new(BreakerState::default()),
            clock,
        }
    }

    /// Returns `true` if calls should be refused right now.
    pub fn is_open(&self) -> bool {
        let now = self.clock.now();
        self.state.lock().is_open(now, self.threshold, self.timeout)
    }

    /// A successful call clears the consecutive failure count.
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        if state.consecutive_failures > 0 {
            info!(
                previous_failures = state.consecutive_failures,
                "Circuit breaker failure count cleared"
            );
        }
        state.consecutive_failures = 0;
    }

    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_failure_at = Some(now);

        if state.consecutive_failures == self.threshold {
            warn!(
                failures = state.consecutive_failures,
                timeout_ms = self.timeout.num_milliseconds(),
                "Circuit breaker opened"
            );
        }
    }

    /// Administrative override: forget all recorded failures.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        *state = BreakerState::default();
        info!("Circuit breaker reset");
    }

    pub fn status(&self) -> CircuitBreakerStatus {
        let now = self.clock.now();
        let state = self.state.lock();
        CircuitBreakerStatus {
            is_open: state.is_open(now, self.threshold, self.timeout),
            failures: state.consecutive_failures,
            threshold: self.threshold,
            last_failure: state.last_failure_at,
            timeout_ms: u64::try_from(self.timeout.num_milliseconds()).unwrap_or(0),
        }
    }
}

//! # Circuit Breaker Module
//!
//! Guards the extraction endpoint. After repeated upstream failures the client
//! stops sending requests for a cool-down window and goes straight to the
//! fallback extractor. Nothing is ever retried.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::BreakerConfig;

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Circuit breaker for extraction requests
///
/// # State Machine
///
/// - **Closed**: requests pass through
/// - **Open**: `failure_threshold` consecutive failures seen, requests are skipped
/// - **Half-Open**: `reset_secs` elapsed, the next request is let through and
///   its outcome closes or re-opens the circuit
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    config: BreakerConfig,
}

impl CircuitBreaker {
    /// Create a closed circuit breaker
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fintracker::circuit_breaker::CircuitBreaker;
    /// use fintracker::config::BreakerConfig;
    ///
    /// let breaker = CircuitBreaker::new(BreakerConfig::default());
    /// assert!(!breaker.is_open());
    /// ```
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            config,
        }
    }

    // The state is two plain fields; a panic mid-update cannot leave it inconsistent
    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `true` while requests should be skipped
    pub fn is_open(&self) -> bool {
        let state = self.lock();
        match state.opened_at {
            Some(opened_at) => {
                opened_at.elapsed() < Duration::from_secs(self.config.reset_secs)
            }
            None => false,
        }
    }

    /// Record an upstream failure, opening the circuit at the threshold
    pub fn record_failure(&self) {
        let mut state = self.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        if state.consecutive_failures >= self.config.failure_threshold {
            state.opened_at = Some(Instant::now());
        }
    }

    /// Record a well-formed upstream response, closing the circuit
    pub fn record_success(&self) {
        let mut state = self.lock();
        state.consecutive_failures = 0;
        state.opened_at = None;
    }

    /// Consecutive failures since the last success
    pub fn failure_count(&self) -> u32 {
        self.lock().consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, reset_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: threshold,
            reset_secs,
        })
    }

    #[test]
    fn test_opens_at_threshold() {
        let breaker = breaker(2, 60);

        breaker.record_failure();
        assert!(!breaker.is_open());

        breaker.record_failure();
        assert!(breaker.is_open());
        assert_eq!(breaker.failure_count(), 2);
    }

    #[test]
    fn test_success_closes() {
        let breaker = breaker(1, 60);

        breaker.record_failure();
        assert!(breaker.is_open());

        breaker.record_success();
        assert!(!breaker.is_open());
        assert_eq!(breaker.failure_count(), 0);
    }

    #[test]
    fn test_half_open_after_reset_window() {
        let breaker = breaker(1, 0);

        breaker.record_failure();
        // Zero-second window: the circuit is immediately half-open
        assert!(!breaker.is_open());

        // A failed probe re-opens it
        breaker.record_failure();
        assert_eq!(breaker.failure_count(), 2);
    }
}

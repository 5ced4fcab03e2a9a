//! Resilience primitives shared by the scheduler's dispatch loop and agent
//! connection plane.
//!
//! [`CircuitBreaker`] wraps a fallible call and trips open after repeated
//! failures, recovering through a half-open probe. [`EligibilityTracker`]
//! adapts the same failure-threshold idea to per-agent dispatch eligibility,
//! where the state isn't persisted between scheduling ticks: an agent is
//! simply re-evaluated as eligible or not on every tick from its running
//! failure count, and a single success resets it.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ResilienceError {
    #[error("circuit breaker open, rejecting call")]
    CircuitOpen,
    #[error("{0}")]
    CallFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitBreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Generic circuit breaker: trips `Open` after `failure_threshold`
/// consecutive failures, and after `reset_timeout` allows a single
/// `HalfOpen` probe call through before deciding whether to close or
/// re-open.
pub struct CircuitBreaker {
    state: CircuitBreakerState,
    failure_count: u32,
    failure_threshold: u32,
    last_failure_at: Option<Instant>,
    reset_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            state: CircuitBreakerState::Closed,
            failure_count: 0,
            failure_threshold,
            last_failure_at: None,
            reset_timeout,
        }
    }

    pub fn call<F, T>(&mut self, f: F) -> Result<T, ResilienceError>
    where
        F: FnOnce() -> Result<T, String>,
    {
        if self.state == CircuitBreakerState::Open {
            let elapsed = self
                .last_failure_at
                .map(|t| t.elapsed())
                .unwrap_or(Duration::MAX);
            if elapsed >= self.reset_timeout {
                self.state = CircuitBreakerState::HalfOpen;
            } else {
                return Err(ResilienceError::CircuitOpen);
            }
        }

        match f() {
            Ok(result) => {
                self.failure_count = 0;
                self.state = CircuitBreakerState::Closed;
                Ok(result)
            }
            Err(e) => {
                self.failure_count += 1;
                self.last_failure_at = Some(Instant::now());
                if self.state == CircuitBreakerState::HalfOpen
                    || self.failure_count >= self.failure_threshold
                {
                    self.state = CircuitBreakerState::Open;
                }
                Err(ResilienceError::CallFailed(e))
            }
        }
    }

    pub fn state(&self) -> CircuitBreakerState {
        self.state
    }
}

/// Per-agent dispatch eligibility, keyed by agent ID. An agent whose
/// consecutive failure count reaches `skip_threshold` is excluded from the
/// next dispatch round; the count decays to zero as soon as it reports a
/// success. Unlike [`CircuitBreaker`] there is no timed half-open probe —
/// eligibility is simply recomputed every scheduling tick from whatever the
/// count currently is.
pub struct EligibilityTracker<K> {
    skip_threshold: u32,
    failures: HashMap<K, u32>,
}

impl<K: Eq + Hash + Clone> EligibilityTracker<K> {
    pub fn new(skip_threshold: u32) -> Self {
        Self {
            skip_threshold,
            failures: HashMap::new(),
        }
    }

    pub fn record_success(&mut self, agent: &K) {
        self.failures.remove(agent);
    }

    pub fn record_failure(&mut self, agent: &K) {
        *self.failures.entry(agent.clone()).or_insert(0) += 1;
    }

    /// `false` once `agent`'s consecutive failure count reaches the
    /// threshold; the scheduler should exclude it from this tick's
    /// candidate pool. Recorded failures below the threshold don't affect
    /// eligibility — the agent is simply at elevated risk.
    pub fn is_eligible(&self, agent: &K) -> bool {
        self.failures.get(agent).copied().unwrap_or(0) < self.skip_threshold
    }

    pub fn consecutive_failures(&self, agent: &K) -> u32 {
        self.failures.get(agent).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_breaker_trips_after_threshold_failures() {
        let mut cb = CircuitBreaker::new(3, Duration::from_millis(50));
        for _ in 0..3 {
            let _ = cb.call(|| Err::<(), _>("boom".to_string()));
        }
        assert_eq!(cb.state(), CircuitBreakerState::Open);
    }

    #[test]
    fn circuit_breaker_rejects_calls_while_open() {
        let mut cb = CircuitBreaker::new(1, Duration::from_secs(60));
        let _ = cb.call(|| Err::<(), _>("boom".to_string()));
        let result = cb.call(|| Ok::<_, String>(()));
        assert!(matches!(result, Err(ResilienceError::CircuitOpen)));
    }

    #[test]
    fn circuit_breaker_closes_after_successful_probe() {
        let mut cb = CircuitBreaker::new(1, Duration::from_millis(10));
        let _ = cb.call(|| Err::<(), _>("boom".to_string()));
        std::thread::sleep(Duration::from_millis(15));
        let result = cb.call(|| Ok::<_, String>(42));
        assert_eq!(result.unwrap(), 42);
        assert_eq!(cb.state(), CircuitBreakerState::Closed);
    }

    #[test]
    fn eligibility_tracker_excludes_agent_past_threshold() {
        let mut tracker = EligibilityTracker::new(3);
        let agent = uuid::Uuid::new_v4();
        assert!(tracker.is_eligible(&agent));
        for _ in 0..3 {
            tracker.record_failure(&agent);
        }
        assert!(!tracker.is_eligible(&agent));
    }

    #[test]
    fn eligibility_tracker_decays_on_success() {
        let mut tracker = EligibilityTracker::new(2);
        let agent = uuid::Uuid::new_v4();
        tracker.record_failure(&agent);
        tracker.record_failure(&agent);
        assert!(!tracker.is_eligible(&agent));
        tracker.record_success(&agent);
        assert!(tracker.is_eligible(&agent));
        assert_eq!(tracker.consecutive_failures(&agent), 0);
    }
}

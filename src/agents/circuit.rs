//! Consecutive-failure circuit breaker, one per (agent instance, operation).
//!
//! The breaker holds no lock of its own: it lives inside the agent's guarded
//! state next to the metrics and is mutated under the same lock.

use std::time::{Duration, Instant};

use serde::Serialize;

#[derive(Debug, Clone, Default)]
pub struct CircuitBreakerState {
    pub consecutive_failures: u32,
    pub last_failure: Option<Instant>,
    pub is_open: bool,
    /// A half-open trial call is running; everyone else is still rejected.
    pub trial_in_flight: bool,
}

impl CircuitBreakerState {
    /// `Err(retry_after)` while the breaker is open and `reset` has not
    /// elapsed since the last failure. Once it has, the next call goes through
    /// as the single trial and its outcome decides whether the breaker closes
    /// or reopens.
    pub fn check(&self, reset: Duration) -> Result<(), Duration> {
        if !self.is_open {
            return Ok(());
        }
        if self.trial_in_flight {
            return Err(reset);
        }
        match self.last_failure {
            Some(at) => {
                let elapsed = at.elapsed();
                if elapsed >= reset {
                    Ok(())
                } else {
                    Err(reset - elapsed)
                }
            }
            None => Ok(()),
        }
    }

    /// Claim the trial slot of an open breaker. Returns false while closed.
    pub fn begin_trial(&mut self) -> bool {
        if self.is_open {
            self.trial_in_flight = true;
        }
        self.is_open
    }

    pub fn end_trial(&mut self) {
        self.trial_in_flight = false;
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.is_open = false;
    }

    /// Returns true when this failure opened (or reopened) the breaker.
    pub fn record_failure(&mut self, threshold: u32) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_failure = Some(Instant::now());
        if self.consecutive_failures >= threshold.max(1) {
            self.is_open = true;
            return true;
        }
        false
    }

    pub fn snapshot(&self, operation: &str, reset: Duration) -> CircuitSnapshot {
        CircuitSnapshot {
            operation: operation.to_string(),
            consecutive_failures: self.consecutive_failures,
            is_open: self.is_open,
            retry_after_ms: self.check(reset).err().map(|d| d.as_millis() as u64),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitSnapshot {
    pub operation: String,
    pub consecutive_failures: u32,
    pub is_open: bool,
    pub retry_after_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opens_at_threshold() {
        let mut cb = CircuitBreakerState::default();
        assert!(!cb.record_failure(3));
        assert!(!cb.record_failure(3));
        assert!(cb.record_failure(3));
        assert!(cb.is_open);
        assert!(cb.check(Duration::from_secs(60)).is_err());
    }

    #[test]
    fn test_retry_after_is_remaining_window() {
        let mut cb = CircuitBreakerState::default();
        cb.record_failure(1);
        let retry_after = cb.check(Duration::from_secs(30)).unwrap_err();
        assert!(retry_after <= Duration::from_secs(30));
        assert!(retry_after > Duration::from_secs(29));
    }

    #[test]
    fn test_allows_call_after_reset_window() {
        let mut cb = CircuitBreakerState::default();
        cb.record_failure(1);
        assert!(cb.check(Duration::ZERO).is_ok());
        // Still open until the trial call reports back.
        assert!(cb.is_open);
    }

    #[test]
    fn test_only_one_trial_at_a_time() {
        let mut cb = CircuitBreakerState::default();
        cb.record_failure(1);
        assert!(cb.check(Duration::ZERO).is_ok());
        assert!(cb.begin_trial());
        assert_eq!(cb.check(Duration::ZERO), Err(Duration::ZERO));

        cb.end_trial();
        assert!(cb.check(Duration::ZERO).is_ok());
    }

    #[test]
    fn test_closed_breaker_has_no_trial() {
        let mut cb = CircuitBreakerState::default();
        assert!(!cb.begin_trial());
        assert!(!cb.trial_in_flight);
    }

    #[test]
    fn test_success_closes() {
        let mut cb = CircuitBreakerState::default();
        cb.record_failure(1);
        cb.record_success();
        assert!(!cb.is_open);
        assert_eq!(cb.consecutive_failures, 0);
        assert!(cb.check(Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn test_failed_trial_reopens() {
        let mut cb = CircuitBreakerState::default();
        cb.record_failure(2);
        cb.record_failure(2);
        assert!(cb.check(Duration::ZERO).is_ok());
        assert!(cb.record_failure(2));
        assert!(cb.check(Duration::from_secs(60)).is_err());
    }

    #[test]
    fn test_snapshot() {
        let mut cb = CircuitBreakerState::default();
        cb.record_failure(1);
        let snap = cb.snapshot("execute", Duration::from_secs(10));
        assert_eq!(snap.operation, "execute");
        assert!(snap.is_open);
        assert!(snap.retry_after_ms.is_some());
    }
}

//! Failure counting for configuration updates.
//!
//! Closed until `failure_threshold` consecutive failures, then open. An open
//! breaker rejects every update until it is reset, or, when a reset timeout is
//! configured, lets exactly one trial update through once the timeout has passed. The
//! trial closes the breaker on success and re-opens it on failure.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::CircuitBreakerConfig;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerState {
    pub is_open: bool,
    pub failure_count: u32,
    pub consecutive_successes: u32,
    /// When the breaker last opened, while it is open
    pub opened_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// Open, but the reset timeout has passed
    Trial,
    Rejected,
}

#[derive(Clone, Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Option<Duration>,
    state: CircuitBreakerState,
}

impl CircuitBreaker {
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            reset_timeout: config.reset_timeout(),
            state: CircuitBreakerState::default(),
        }
    }

    pub fn state(&self) -> &CircuitBreakerState {
        &self.state
    }

    pub fn admit(&self, now: DateTime<Utc>) -> Admission {
        if !self.state.is_open {
            return Admission::Allowed;
        }

        match (self.reset_timeout, self.state.opened_at) {
            (Some(timeout), Some(opened_at)) if now - opened_at >= timeout => Admission::Trial,
            _ => Admission::Rejected,
        }
    }

    pub fn record_success(&mut self) {
        if self.state.is_open {
            info!("circuit breaker closed after successful trial update");
        }
        self.state.is_open = false;
        self.state.opened_at = None;
        self.state.failure_count = 0;
        self.state.consecutive_successes = self.state.consecutive_successes.saturating_add(1);
    }

    /// Count a failure. Returns true when this failure opened the breaker.
    pub fn record_failure(&mut self, now: DateTime<Utc>) -> bool {
        self.state.failure_count = self.state.failure_count.saturating_add(1);
        self.state.consecutive_successes = 0;

        if self.state.is_open {
            // Failed trial
            self.state.opened_at = Some(now);
            warn!(failures = self.state.failure_count, "circuit breaker trial update failed; staying open");
            return false;
        }

        if self.state.failure_count >= self.failure_threshold {
            self.state.is_open = true;
            self.state.opened_at = Some(now);
            warn!(failures = self.state.failure_count, "circuit breaker opened");
            return true;
        }

        false
    }

    pub fn reset(&mut self) {
        self.state.is_open = false;
        self.state.opened_at = None;
        self.state.failure_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_opens_after_threshold() {
        let mut breaker = CircuitBreaker::new(&CircuitBreakerConfig::default());

        assert!(!breaker.record_failure(now()));
        assert!(!breaker.record_failure(now()));
        assert_eq!(breaker.admit(now()), Admission::Allowed);
        assert!(breaker.record_failure(now()));

        assert!(breaker.state().is_open);
        assert_eq!(breaker.state().failure_count, 3);
        assert_eq!(breaker.state().opened_at, Some(now()));
        assert_eq!(breaker.admit(now()), Admission::Rejected);
    }

    #[test]
    fn test_success_resets_failure_count() {
        let mut breaker = CircuitBreaker::new(&CircuitBreakerConfig::default());
        breaker.record_failure(now());
        breaker.record_failure(now());
        breaker.record_success();
        breaker.record_success();

        assert_eq!(breaker.state().failure_count, 0);
        assert_eq!(breaker.state().consecutive_successes, 2);

        breaker.record_failure(now());
        assert_eq!(breaker.state().consecutive_successes, 0);
        assert!(!breaker.state().is_open);
    }

    #[test]
    fn test_trial_after_timeout() {
        let mut breaker = CircuitBreaker::new(&CircuitBreakerConfig {
            failure_threshold: 1,
            reset_timeout_secs: Some(30),
        });
        breaker.record_failure(now());

        assert_eq!(breaker.admit(now() + Duration::seconds(29)), Admission::Rejected);
        assert_eq!(breaker.admit(now() + Duration::seconds(30)), Admission::Trial);

        // Failed trial restarts the timeout
        breaker.record_failure(now() + Duration::seconds(30));
        assert!(breaker.state().is_open);
        assert_eq!(breaker.admit(now() + Duration::seconds(45)), Admission::Rejected);
        assert_eq!(breaker.admit(now() + Duration::seconds(60)), Admission::Trial);

        breaker.record_success();
        assert!(!breaker.state().is_open);
        assert_eq!(breaker.state().opened_at, None);
        assert_eq!(breaker.admit(now() + Duration::seconds(61)), Admission::Allowed);
    }

    #[test]
    fn test_without_timeout_stays_open() {
        let mut breaker = CircuitBreaker::new(&CircuitBreakerConfig {
            failure_threshold: 1,
            reset_timeout_secs: None,
        });
        breaker.record_failure(now());
        assert_eq!(breaker.admit(now() + Duration::days(1)), Admission::Rejected);

        breaker.reset();
        assert_eq!(breaker.admit(now()), Admission::Allowed);
        assert_eq!(breaker.state().failure_count, 0);
    }
}

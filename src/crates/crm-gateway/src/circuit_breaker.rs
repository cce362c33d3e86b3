//! Per-key circuit breaker table (§4.C, §5).
//!
//! Grounded on `seanchatmangpt-knhk/rust/knhk-workflow-engine/src/resilience/
//! circuit_breaker.rs`'s closed/open/half-open state machine, generalized
//! from one breaker per process to one breaker per key (`bsa_workflow`,
//! `contact_linking`, ...) backed by the workspace's `dashmap` dependency so
//! each key gets its own shard lock rather than one global `RwLock`.

use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerState {
    pub key: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_failure_at: Option<Instant>,
    pub half_open_attempts: u32,
}

impl CircuitBreakerState {
    fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_at: None,
            half_open_attempts: 0,
        }
    }
}

/// Why `admit` refused to let a call through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CircuitRejection {
    #[error("circuit is open")]
    CircuitOpen,
    #[error("half-open attempt budget exhausted")]
    HalfOpenExhausted,
}

const FAILURE_THRESHOLD: u32 = 5;
const SUCCESS_THRESHOLD: u32 = 3;
const HALF_OPEN_MAX_ATTEMPTS: u32 = 3;
const RESET_TIMEOUT: Duration = Duration::from_secs(60);

/// Process-scoped (§5: "Circuit-breaker table: per-process, keyed by
/// operation class"). One instance is constructed by the coordinator at
/// startup and shared by every run in the process.
#[derive(Default)]
pub struct CircuitBreakerTable {
    states: DashMap<String, CircuitBreakerState>,
}

impl CircuitBreakerTable {
    pub fn new() -> Self {
        Self { states: DashMap::new() }
    }

    /// Check whether a call keyed by `key` may proceed, applying the
    /// open → half-open transition if the reset timeout has elapsed.
    pub fn admit(&self, key: &str) -> Result<(), CircuitRejection> {
        let mut entry = self.states.entry(key.to_string()).or_insert_with(|| CircuitBreakerState::new(key));

        match entry.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = entry.last_failure_at.map(|t| t.elapsed()).unwrap_or(Duration::MAX);
                if elapsed >= RESET_TIMEOUT {
                    entry.state = CircuitState::HalfOpen;
                    entry.half_open_attempts = 1;
                    entry.success_count = 0;
                    Ok(())
                } else {
                    Err(CircuitRejection::CircuitOpen)
                }
            }
            CircuitState::HalfOpen => {
                if entry.half_open_attempts >= HALF_OPEN_MAX_ATTEMPTS {
                    Err(CircuitRejection::HalfOpenExhausted)
                } else {
                    entry.half_open_attempts += 1;
                    Ok(())
                }
            }
        }
    }

    pub fn record_success(&self, key: &str) {
        let mut entry = self.states.entry(key.to_string()).or_insert_with(|| CircuitBreakerState::new(key));
        match entry.state {
            CircuitState::Closed => {
                entry.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                entry.success_count += 1;
                if entry.success_count >= SUCCESS_THRESHOLD {
                    entry.state = CircuitState::Closed;
                    entry.failure_count = 0;
                    entry.success_count = 0;
                    entry.half_open_attempts = 0;
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self, key: &str) {
        let mut entry = self.states.entry(key.to_string()).or_insert_with(|| CircuitBreakerState::new(key));
        entry.failure_count += 1;
        entry.last_failure_at = Some(Instant::now());
        match entry.state {
            CircuitState::Closed => {
                if entry.failure_count >= FAILURE_THRESHOLD {
                    entry.state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen => {
                entry.state = CircuitState::Open;
                entry.success_count = 0;
                entry.half_open_attempts = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub fn state_of(&self, key: &str) -> CircuitState {
        self.states.get(key).map(|e| e.state).unwrap_or(CircuitState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_failures_opens_the_circuit() {
        let table = CircuitBreakerTable::new();
        for _ in 0..5 {
            table.admit("bsa_workflow").unwrap();
            table.record_failure("bsa_workflow");
        }
        assert_eq!(table.state_of("bsa_workflow"), CircuitState::Open);
        assert_eq!(table.admit("bsa_workflow"), Err(CircuitRejection::CircuitOpen));
    }

    #[test]
    fn open_transitions_to_half_open_after_reset_timeout() {
        let table = CircuitBreakerTable::new();
        for _ in 0..5 {
            table.admit("k").unwrap();
            table.record_failure("k");
        }
        {
            let mut entry = table.states.get_mut("k").unwrap();
            entry.last_failure_at = Some(Instant::now() - Duration::from_secs(61));
        }
        assert!(table.admit("k").is_ok());
        assert_eq!(table.state_of("k"), CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_admits_at_most_three_attempts() {
        let table = CircuitBreakerTable::new();
        for _ in 0..5 {
            table.admit("k").unwrap();
            table.record_failure("k");
        }
        {
            let mut entry = table.states.get_mut("k").unwrap();
            entry.last_failure_at = Some(Instant::now() - Duration::from_secs(61));
        }
        table.admit("k").unwrap(); // 1st half-open attempt, consumed by the transition itself
        table.admit("k").unwrap(); // 2nd
        table.admit("k").unwrap(); // 3rd
        assert_eq!(table.admit("k"), Err(CircuitRejection::HalfOpenExhausted));
    }

    #[test]
    fn three_successes_in_half_open_closes_circuit() {
        let table = CircuitBreakerTable::new();
        for _ in 0..5 {
            table.admit("k").unwrap();
            table.record_failure("k");
        }
        {
            let mut entry = table.states.get_mut("k").unwrap();
            entry.last_failure_at = Some(Instant::now() - Duration::from_secs(61));
        }
        table.admit("k").unwrap();
        table.record_success("k");
        table.record_success("k");
        table.record_success("k");
        assert_eq!(table.state_of("k"), CircuitState::Closed);
    }

    #[test]
    fn failure_in_half_open_reopens_immediately() {
        let table = CircuitBreakerTable::new();
        for _ in 0..5 {
            table.admit("k").unwrap();
            table.record_failure("k");
        }
        {
            let mut entry = table.states.get_mut("k").unwrap();
            entry.last_failure_at = Some(Instant::now() - Duration::from_secs(61));
        }
        table.admit("k").unwrap();
        table.record_failure("k");
        assert_eq!(table.state_of("k"), CircuitState::Open);
    }

    #[test]
    fn success_in_closed_state_resets_failure_count() {
        let table = CircuitBreakerTable::new();
        table.admit("k").unwrap();
        table.record_failure("k");
        table.record_failure("k");
        table.record_success("k");
        let entry = table.states.get("k").unwrap();
        assert_eq!(entry.failure_count, 0);
    }
}

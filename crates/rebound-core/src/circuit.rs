//! Per-key circuit breaker state machine.
//!
//! ```text
//! Closed → Open:      consecutive_failures >= failure_threshold
//! Open → HalfOpen:    a call arrives after reset_timeout (evaluated lazily)
//! HalfOpen → Closed:  the probe succeeds
//! HalfOpen → Open:    the probe fails (a single failure is enough)
//! ```
//!
//! Every key gets its own circuit so one flaky endpoint cannot take down
//! unrelated callers. State is created on first use and lives until the
//! breaker is dropped or reset.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::{Clock, SystemClock};
use crate::config::duration_human;

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,

    /// Time the circuit stays open before a probe is allowed
    #[serde(with = "duration_human")]
    pub reset_timeout: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// State of a single circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation
    Closed,

    /// Calls are rejected or routed to a fallback
    Open,

    /// One probe call is testing recovery
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };
        f.write_str(s)
    }
}

/// Read-only snapshot of a circuit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitStatus {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
}

/// Whether a call may go ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Circuit is closed
    Closed,

    /// This call is the half-open probe
    Probe,

    /// Circuit is open; no probe is due for `retry_after`
    Rejected { retry_after: Duration },
}

impl Admission {
    pub fn is_permitted(&self) -> bool {
        !matches!(self, Admission::Rejected { .. })
    }
}

/// What a recorded failure did to the circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Still closed, failure counted
    Counted { failures: u32 },

    /// This failure crossed the threshold
    Opened { failures: u32 },

    /// The half-open probe failed
    Reopened,

    /// Another caller had already opened the circuit
    StillOpen,
}

impl FailureOutcome {
    /// True when the circuit is open after this failure.
    pub fn is_open(&self) -> bool {
        !matches!(self, FailureOutcome::Counted { .. })
    }
}

#[derive(Debug, Clone)]
struct CircuitRecord {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    last_failure_time: Option<DateTime<Utc>>,
    probe_started_at: Option<Instant>,
}

impl Default for CircuitRecord {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
            last_failure_time: None,
            probe_started_at: None,
        }
    }
}

impl CircuitRecord {
    fn status(&self) -> CircuitStatus {
        CircuitStatus {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            last_failure_time: self.last_failure_time,
        }
    }
}

/// Circuit breaker tracking one circuit per key.
///
/// A single lock guards the whole map; every transition is a short
/// read-modify-write under it, so concurrent failures are never lost.
pub struct CircuitBreaker {
    states: RwLock<HashMap<String, CircuitRecord>>,
    config: CircuitConfig,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    /// Create a breaker on the system clock.
    pub fn new(config: CircuitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a breaker on a custom clock.
    pub fn with_clock(config: CircuitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &CircuitConfig {
        &self.config
    }

    /// Decide whether a call for `key` may proceed.
    ///
    /// Creates the circuit on first sight. An open circuit whose reset
    /// timeout has elapsed moves to half-open and admits this call as the
    /// probe. While a probe is outstanding other calls are rejected; a probe
    /// that never reports back is abandoned after another reset timeout.
    pub fn admit(&self, key: &str) -> Admission {
        let now = self.clock.now();
        let timeout = self.config.reset_timeout;
        let mut states = self.states.write();
        let record = states.entry(key.to_string()).or_default();

        match record.state {
            CircuitState::Closed => Admission::Closed,
            CircuitState::Open => {
                let elapsed = record
                    .last_failure_at
                    .map(|at| now.saturating_duration_since(at))
                    .unwrap_or(timeout);

                if elapsed >= timeout {
                    record.state = CircuitState::HalfOpen;
                    record.probe_started_at = Some(now);
                    tracing::warn!(key = %key, "Circuit half-open, probing for recovery");
                    Admission::Probe
                } else {
                    Admission::Rejected {
                        retry_after: timeout - elapsed,
                    }
                }
            }
            CircuitState::HalfOpen => {
                let elapsed = record
                    .probe_started_at
                    .map(|at| now.saturating_duration_since(at))
                    .unwrap_or(timeout);

                if elapsed >= timeout {
                    record.probe_started_at = Some(now);
                    tracing::warn!(key = %key, "Previous probe never reported, probing again");
                    Admission::Probe
                } else {
                    Admission::Rejected {
                        retry_after: timeout - elapsed,
                    }
                }
            }
        }
    }

    /// True if `key` is closed (unknown keys are closed).
    pub fn is_closed(&self, key: &str) -> bool {
        self.states
            .read()
            .get(key)
            .map(|r| r.state == CircuitState::Closed)
            .unwrap_or(true)
    }

    /// Record a successful call.
    ///
    /// Always clears the failure counter. Returns the state the circuit
    /// left, if the success closed it.
    pub fn record_success(&self, key: &str) -> Option<CircuitState> {
        let mut states = self.states.write();
        let record = states.get_mut(key)?;
        let previous = record.state;

        record.state = CircuitState::Closed;
        record.consecutive_failures = 0;
        record.probe_started_at = None;

        match previous {
            CircuitState::Closed => None,
            CircuitState::HalfOpen => {
                tracing::warn!(key = %key, "Circuit closed after successful probe");
                Some(previous)
            }
            CircuitState::Open => {
                tracing::warn!(key = %key, "Circuit closed by a call admitted before it opened");
                Some(previous)
            }
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self, key: &str) -> FailureOutcome {
        let now = self.clock.now();
        let threshold = self.config.failure_threshold;
        let mut states = self.states.write();
        let record = states.entry(key.to_string()).or_default();

        record.consecutive_failures = record.consecutive_failures.saturating_add(1);
        record.last_failure_at = Some(now);
        record.last_failure_time = Some(Utc::now());

        match record.state {
            CircuitState::Closed => {
                let failures = record.consecutive_failures;
                if failures >= threshold {
                    record.state = CircuitState::Open;
                    tracing::warn!(
                        key = %key,
                        failures,
                        "Circuit opened after repeated failures"
                    );
                    FailureOutcome::Opened { failures }
                } else {
                    FailureOutcome::Counted { failures }
                }
            }
            CircuitState::HalfOpen => {
                record.state = CircuitState::Open;
                record.probe_started_at = None;
                record.consecutive_failures = record.consecutive_failures.max(threshold);
                tracing::warn!(key = %key, "Circuit reopened after failed probe");
                FailureOutcome::Reopened
            }
            CircuitState::Open => FailureOutcome::StillOpen,
        }
    }

    /// Give up the probe slot on a half-open `key` without judging recovery.
    ///
    /// Used when the probe ended with an error that does not count against
    /// the circuit. The next `admit` grants a fresh probe.
    pub fn release_probe(&self, key: &str) {
        let mut states = self.states.write();
        if let Some(record) = states.get_mut(key) {
            if record.state == CircuitState::HalfOpen && record.probe_started_at.take().is_some() {
                tracing::debug!(key = %key, "Probe released without a verdict");
            }
        }
    }

    /// Snapshot of `key`; unknown keys report a fresh closed circuit.
    pub fn status(&self, key: &str) -> CircuitStatus {
        self.states
            .read()
            .get(key)
            .map(CircuitRecord::status)
            .unwrap_or_else(|| CircuitRecord::default().status())
    }

    /// Keys with tracked circuits, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.states.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Force one circuit (or all, with `None`) back to closed.
    pub fn reset(&self, key: Option<&str>) {
        let mut states = self.states.write();
        match key {
            Some(key) => {
                if let Some(record) = states.get_mut(key) {
                    if record.state != CircuitState::Closed || record.consecutive_failures > 0 {
                        tracing::info!(key = %key, state = %record.state, "Circuit reset");
                    }
                    *record = CircuitRecord::default();
                }
            }
            None => {
                tracing::info!(circuits = states.len(), "All circuits reset");
                states.clear();
            }
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitConfig::default())
    }
}

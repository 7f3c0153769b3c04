//! Retry policy and the per-failure retry decision.

use rand::Rng;
use std::time::Duration;

use crate::backoff::BackoffConfig;
use crate::circuit::{CircuitConfig, FailureOutcome};
use crate::config::ExecutorConfig;
use crate::error::PolicyError;

/// Validated retry policy for an executor.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: BackoffConfig,
    failure_threshold: u32,
    reset_timeout: Duration,
}

/// What to do after a retryable failure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// Sleep for `delay`, then make the next attempt
    Retry { delay: Duration },

    /// The circuit is open; stop and report it
    Open,

    /// Attempts used up with the circuit still closed
    Exhausted { attempts: u32 },
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        backoff: BackoffConfig,
        failure_threshold: u32,
        reset_timeout: Duration,
    ) -> Result<Self, PolicyError> {
        if max_attempts == 0 {
            return Err(PolicyError::ZeroAttempts);
        }
        if failure_threshold == 0 {
            return Err(PolicyError::ZeroThreshold);
        }
        backoff.validate()?;

        Ok(Self {
            max_attempts,
            backoff,
            failure_threshold,
            reset_timeout,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> &BackoffConfig {
        &self.backoff
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn reset_timeout(&self) -> Duration {
        self.reset_timeout
    }

    /// Circuit settings for a breaker driven by this policy.
    pub fn circuit_config(&self) -> CircuitConfig {
        CircuitConfig {
            failure_threshold: self.failure_threshold,
            reset_timeout: self.reset_timeout,
        }
    }

    /// Same policy with a different attempt budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Result<Self, PolicyError> {
        if max_attempts == 0 {
            return Err(PolicyError::ZeroAttempts);
        }
        self.max_attempts = max_attempts;
        Ok(self)
    }

    /// Same policy with a different backoff.
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Result<Self, PolicyError> {
        backoff.validate()?;
        self.backoff = backoff;
        Ok(self)
    }

    /// Decide what follows a retryable failure on `attempt` (1-indexed).
    ///
    /// An open circuit wins over everything; otherwise the last attempt
    /// exhausts the call and earlier ones back off.
    pub fn decide(&self, attempt: u32, outcome: FailureOutcome) -> Decision {
        self.decide_with_rng(attempt, outcome, &mut rand::thread_rng())
    }

    pub fn decide_with_rng<R: Rng>(
        &self,
        attempt: u32,
        outcome: FailureOutcome,
        rng: &mut R,
    ) -> Decision {
        if outcome.is_open() {
            Decision::Open
        } else if attempt >= self.max_attempts {
            Decision::Exhausted { attempts: attempt }
        } else {
            Decision::Retry {
                delay: self.backoff.delay_with_rng(attempt, rng),
            }
        }
    }

    /// Config-file form of this policy.
    pub fn to_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            max_attempts: self.max_attempts,
            failure_threshold: self.failure_threshold,
            reset_timeout: self.reset_timeout,
            backoff: self.backoff.clone(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffConfig::default(),
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

impl TryFrom<ExecutorConfig> for RetryPolicy {
    type Error = PolicyError;

    fn try_from(config: ExecutorConfig) -> Result<Self, Self::Error> {
        Self::new(
            config.max_attempts,
            config.backoff,
            config.failure_threshold,
            config.reset_timeout,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::BackoffStrategy;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            BackoffConfig::fixed(
                BackoffStrategy::Exponential,
                Duration::from_secs(1),
                Duration::from_secs(10),
            ),
            5,
            Duration::from_secs(30),
        )
        .unwrap()
    }

    #[test]
    fn test_decide_retries_with_backoff() {
        let p = policy(3);
        assert_eq!(
            p.decide(1, FailureOutcome::Counted { failures: 1 }),
            Decision::Retry {
                delay: Duration::from_secs(1)
            }
        );
        assert_eq!(
            p.decide(2, FailureOutcome::Counted { failures: 2 }),
            Decision::Retry {
                delay: Duration::from_secs(2)
            }
        );
    }

    #[test]
    fn test_decide_exhausts_on_last_attempt() {
        let p = policy(3);
        assert_eq!(
            p.decide(3, FailureOutcome::Counted { failures: 3 }),
            Decision::Exhausted { attempts: 3 }
        );
    }

    #[test]
    fn test_open_circuit_wins_over_exhaustion() {
        let p = policy(3);
        assert_eq!(p.decide(3, FailureOutcome::Opened { failures: 5 }), Decision::Open);
        assert_eq!(p.decide(1, FailureOutcome::Reopened), Decision::Open);
        assert_eq!(p.decide(1, FailureOutcome::StillOpen), Decision::Open);
    }

    #[test]
    fn test_validation() {
        let backoff = BackoffConfig::default();
        assert_eq!(
            RetryPolicy::new(0, backoff.clone(), 1, Duration::from_secs(1)),
            Err(PolicyError::ZeroAttempts)
        );
        assert_eq!(
            RetryPolicy::new(1, backoff, 0, Duration::from_secs(1)),
            Err(PolicyError::ZeroThreshold)
        );
        assert!(policy(1).with_max_attempts(0).is_err());
    }

    #[test]
    fn test_overrides_keep_circuit_settings() {
        let p = policy(3)
            .with_max_attempts(7)
            .unwrap()
            .with_backoff(BackoffConfig::fixed(
                BackoffStrategy::Constant,
                Duration::from_millis(10),
                Duration::from_millis(10),
            ))
            .unwrap();

        assert_eq!(p.max_attempts(), 7);
        assert_eq!(p.backoff().strategy, BackoffStrategy::Constant);
        assert_eq!(p.failure_threshold(), 5);
        assert_eq!(p.circuit_config().reset_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_config_round_trip() {
        let p = policy(4);
        let back = RetryPolicy::try_from(p.to_config()).unwrap();
        assert_eq!(back, p);
    }
}

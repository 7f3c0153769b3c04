//! Backoff delay calculation.
//!
//! Computes the delay inserted before retry attempt N (1-indexed). The
//! calculation is pure: given the same attempt, config and random source it
//! always yields the same delay, and it never sleeps.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::duration_human;
use crate::error::PolicyError;

/// Growth factor used by [`BackoffStrategy::Fibonacci`].
///
/// This is a golden-ratio exponential, not a Fibonacci recurrence.
pub const GOLDEN_RATIO: f64 = 1.618;

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// `base`
    Constant,
    /// `base * attempt`
    Linear,
    /// `base * 2^(attempt - 1)`
    Exponential,
    /// `base * 1.618^attempt`
    Fibonacci,
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Exponential
    }
}

impl std::str::FromStr for BackoffStrategy {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "constant" => Ok(Self::Constant),
            "linear" => Ok(Self::Linear),
            "exponential" => Ok(Self::Exponential),
            "fibonacci" => Ok(Self::Fibonacci),
            other => Err(PolicyError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Immutable backoff configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Growth strategy
    pub strategy: BackoffStrategy,

    /// Delay unit the strategy scales
    #[serde(with = "duration_human")]
    pub base_delay: Duration,

    /// Upper bound applied before jitter
    #[serde(with = "duration_human")]
    pub max_delay: Duration,

    /// Fraction of the delay randomly added or removed, in `[0, 1)`
    #[serde(alias = "jitter_fraction")]
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: 0.1,
        }
    }
}

impl BackoffConfig {
    /// Create a validated config.
    pub fn new(
        strategy: BackoffStrategy,
        base_delay: Duration,
        max_delay: Duration,
        jitter: f64,
    ) -> Result<Self, PolicyError> {
        let config = Self {
            strategy,
            base_delay,
            max_delay,
            jitter,
        };
        config.validate()?;
        Ok(config)
    }

    /// Jitter-free config, mostly useful in tests and schedules.
    pub fn fixed(strategy: BackoffStrategy, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            strategy,
            base_delay,
            max_delay,
            jitter: 0.0,
        }
    }

    /// Check the invariants: positive base, `max >= base`, jitter in `[0, 1)`.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.base_delay.is_zero() {
            return Err(PolicyError::ZeroBaseDelay);
        }
        if self.max_delay < self.base_delay {
            return Err(PolicyError::MaxBelowBase {
                base: self.base_delay,
                max: self.max_delay,
            });
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err(PolicyError::JitterOutOfRange(self.jitter));
        }
        Ok(())
    }

    /// Delay before retry `attempt`, drawing jitter from the thread RNG.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with_rng(attempt, &mut rand::thread_rng())
    }

    /// Delay before retry `attempt`, drawing jitter from `rng`.
    pub fn delay_with_rng<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let nominal = self.nominal_secs(attempt);

        let jittered = if self.jitter > 0.0 && nominal > 0.0 {
            let spread = nominal * self.jitter;
            nominal + rng.gen_range(-spread..=spread)
        } else {
            nominal
        };

        self.to_duration(jittered.max(0.0))
    }

    /// Clamped, jitter-free delay before retry `attempt`.
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        self.to_duration(self.nominal_secs(attempt))
    }

    /// Jitter-free delays for attempts `1..=attempts`.
    pub fn schedule(&self, attempts: u32) -> Vec<Duration> {
        (1..=attempts).map(|a| self.nominal_delay(a)).collect()
    }

    fn nominal_secs(&self, attempt: u32) -> f64 {
        let attempt = attempt.max(1);
        let base = self.base_delay.as_secs_f64();
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);

        let raw = match self.strategy {
            BackoffStrategy::Constant => base,
            BackoffStrategy::Linear => base * f64::from(attempt),
            BackoffStrategy::Exponential => base * 2f64.powi(exponent - 1),
            BackoffStrategy::Fibonacci => base * GOLDEN_RATIO.powi(exponent),
        };

        // powi overflows to +inf for large attempts; min() handles that
        raw.min(self.max_delay.as_secs_f64())
    }

    // f64 seconds round up near Duration::MAX; saturate at max_delay
    fn to_duration(&self, secs: f64) -> Duration {
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay)
    }
}

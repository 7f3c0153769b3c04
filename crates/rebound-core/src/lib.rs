//! # rebound-core
//!
//! Deterministic building blocks for resilient calls.
//!
//! This crate holds everything about retrying that does not need an async
//! runtime:
//! - Backoff delay calculation (constant, linear, exponential, golden-ratio)
//! - A per-key circuit breaker state machine
//! - The retry policy and the decision taken after each failure
//! - Loading policies from YAML/JSON config files
//!
//! Executing operations (async or blocking), fallbacks and cancellation
//! live in `rebound-runtime`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use rebound_core::{CircuitBreaker, ExecutorConfig};
//!
//! let policy = ExecutorConfig::from_file("retry.yaml")?.into_policy()?;
//! let breaker = CircuitBreaker::new(policy.circuit_config());
//!
//! if breaker.admit("github").is_permitted() {
//!     // call GitHub, then report the outcome
//!     breaker.record_failure("github");
//! }
//! ```

pub mod backoff;
pub mod circuit;
pub mod clock;
pub mod config;
pub mod error;
pub mod policy;

pub use backoff::{BackoffConfig, BackoffStrategy, GOLDEN_RATIO};
pub use circuit::{
    Admission, CircuitBreaker, CircuitConfig, CircuitState, CircuitStatus, FailureOutcome,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ExecutorConfig;
pub use error::{ConfigError, PolicyError, Severity};
pub use policy::{Decision, RetryPolicy};

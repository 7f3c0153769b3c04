//! # rebound-runtime
//!
//! Resilient execution of flaky outbound calls (LLM providers, chat and
//! code-hosting APIs, anything that can time out or rate-limit).
//!
//! The [`Executor`] wraps a caller-supplied operation with:
//! - Retries with configurable backoff and jitter
//! - A circuit breaker per key, so a failing dependency fails fast
//! - Optional fallbacks when a circuit is open or retries run out
//!
//! Operations can be async (awaited, backoff on tokio timers) or blocking
//! (backoff sleeps the calling thread). The executor knows nothing about the
//! domain of the operation; callers pick the key, usually the endpoint or
//! provider name.
//!
//! ## Example
//!
//! ```rust,ignore
//! use rebound_runtime::{Executor, ResilienceError, RetryOn};
//! use rebound_core::ExecutorConfig;
//!
//! let executor = Executor::from_config(
//!     ExecutorConfig::from_file("retry.yaml")?,
//!     RetryOn::predicate(|e: &ApiError| e.is_transient()),
//! )?;
//! executor.register_fallback("anthropic", || async { Ok(cached_reply()) });
//!
//! match executor.execute("anthropic", || client.complete(&prompt)).await {
//!     Ok(reply) => println!("{reply}"),
//!     Err(ResilienceError::CircuitOpen { .. }) => println!("provider down"),
//!     Err(e) => return Err(e.into()),
//! }
//! ```

mod classify;
mod clock;
mod error;
mod executor;
mod fallback;
mod protected;

pub use classify::{RetryOn, Retryable};
pub use clock::TokioClock;
pub use error::ResilienceError;
pub use executor::{Executor, ExecutorBuilder};
pub use fallback::FallbackRegistry;
pub use protected::Protected;

pub use tokio_util::sync::CancellationToken;

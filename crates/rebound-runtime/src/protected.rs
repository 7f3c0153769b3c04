//! An operation bound to an executor and key.
//!
//! `Protected` is a callable value: build it once with
//! [`Executor::protect`](crate::Executor::protect), then call it wherever the
//! raw operation would have been called.
//!
//! ```rust,ignore
//! let executor = Arc::new(Executor::new(policy, RetryOn::all()));
//! let fetch_issue = executor
//!     .protect("github", |number: u64| github.issue(number))
//!     .max_attempts(5)?;
//!
//! let issue = fetch_issue.call_with(42).await?;
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use rebound_core::{BackoffConfig, PolicyError, RetryPolicy};

use crate::error::ResilienceError;
use crate::executor::Executor;

/// An operation wrapped with its executor's retry and circuit policy.
///
/// Attempt count and backoff can be overridden per wrapper; the circuit
/// threshold and reset timeout always come from the executor, whose circuit
/// for this key is shared with every other caller.
pub struct Protected<E, F> {
    executor: Arc<Executor<E>>,
    key: String,
    operation: F,
    policy: RetryPolicy,
}

impl<E, F> Protected<E, F>
where
    E: fmt::Debug + Send + 'static,
{
    pub(crate) fn new(executor: Arc<Executor<E>>, key: String, operation: F) -> Self {
        let policy = executor.policy().clone();
        Self {
            executor,
            key,
            operation,
            policy,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Override the number of attempts per call.
    pub fn max_attempts(mut self, max_attempts: u32) -> Result<Self, PolicyError> {
        self.policy = self.policy.with_max_attempts(max_attempts)?;
        Ok(self)
    }

    /// Override the backoff between attempts.
    pub fn backoff(mut self, backoff: BackoffConfig) -> Result<Self, PolicyError> {
        self.policy = self.policy.with_backoff(backoff)?;
        Ok(self)
    }

    /// Call a zero-argument async operation.
    pub async fn call<T, Fut>(&self) -> Result<T, ResilienceError<E>>
    where
        T: 'static,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.executor
            .run(&self.key, &self.policy, (), |()| (self.operation)(), None)
            .await
    }

    /// Call an async operation with arguments.
    pub async fn call_with<A, T, Fut>(&self, args: A) -> Result<T, ResilienceError<E>>
    where
        A: Clone + 'static,
        T: 'static,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.executor
            .run(&self.key, &self.policy, args, &self.operation, None)
            .await
    }

    /// Call a zero-argument synchronous operation.
    pub fn call_blocking<T>(&self) -> Result<T, ResilienceError<E>>
    where
        T: 'static,
        F: Fn() -> Result<T, E>,
    {
        self.executor
            .run_blocking(&self.key, &self.policy, (), |()| (self.operation)(), None)
    }

    /// Call a synchronous operation with arguments.
    pub fn call_blocking_with<A, T>(&self, args: A) -> Result<T, ResilienceError<E>>
    where
        A: Clone + 'static,
        T: 'static,
        F: Fn(A) -> Result<T, E>,
    {
        self.executor
            .run_blocking(&self.key, &self.policy, args, &self.operation, None)
    }
}

impl<E, F> fmt::Debug for Protected<E, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Protected")
            .field("key", &self.key)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::RetryOn;
    use rebound_core::{BackoffStrategy, CircuitState};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn executor() -> Arc<Executor<String>> {
        let policy = RetryPolicy::new(
            2,
            BackoffConfig::fixed(
                BackoffStrategy::Constant,
                Duration::from_millis(1),
                Duration::from_millis(1),
            ),
            10,
            Duration::from_secs(30),
        )
        .unwrap();
        Arc::new(Executor::new(policy, RetryOn::all()))
    }

    #[tokio::test]
    async fn test_call_with_args() {
        let executor = executor();
        let double = executor.protect("double", |n: u32| async move { Ok::<_, String>(n * 2) });

        assert_eq!(double.call_with(21).await.unwrap(), 42);
        assert_eq!(double.key(), "double");
    }

    #[tokio::test]
    async fn test_max_attempts_override() {
        let executor = executor();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let flaky = executor
            .protect("flaky", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("503".to_string()) }
            })
            .max_attempts(4)
            .unwrap();

        let err = flaky.call().await.unwrap_err();
        assert!(matches!(err, ResilienceError::RetryExhausted { attempts: 4, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(executor.policy().max_attempts(), 2);
    }

    #[tokio::test]
    async fn test_wrappers_share_circuit_state() {
        let executor = executor();
        let a = executor
            .protect("shared", || async { Err::<(), _>("down".to_string()) })
            .max_attempts(5)
            .unwrap();
        let b = executor.protect("shared", || async { Ok::<_, String>(()) });

        // 5 failures, threshold 10: still closed
        assert!(a.call().await.unwrap_err().is_retry_exhausted());
        assert_eq!(executor.get_circuit_status("shared").consecutive_failures, 5);

        b.call().await.unwrap();
        let status = executor.get_circuit_status("shared");
        assert_eq!(status.state, CircuitState::Closed);
        assert_eq!(status.consecutive_failures, 0);
    }

    #[test]
    fn test_blocking_calls() {
        let executor = executor();
        let parse = executor.protect("parse", |s: &'static str| {
            s.parse::<u32>().map_err(|e| e.to_string())
        });

        assert_eq!(parse.call_blocking_with("17").unwrap(), 17);
        assert!(parse.call_blocking_with("x").unwrap_err().is_retry_exhausted());

        let ping = executor.protect("ping", || Ok::<_, String>("pong"));
        assert_eq!(ping.call_blocking().unwrap(), "pong");
    }

    #[test]
    fn test_default_key_is_operation_identity() {
        fn ping() -> Result<&'static str, String> {
            Ok("pong")
        }

        let executor = executor();
        let op = executor.protect_default(ping);
        assert!(op.key().ends_with("ping"));
        assert_eq!(op.call_blocking().unwrap(), "pong");
        assert_eq!(executor.circuit_keys(), vec![op.key().to_string()]);

        let other = executor.protect_default(|| Ok::<_, String>(1));
        assert_ne!(other.key(), op.key());
    }

    #[test]
    fn test_invalid_override_rejected() {
        let executor = executor();
        let op = executor.protect("op", || Ok::<(), String>(()));
        assert!(matches!(op.max_attempts(0), Err(PolicyError::ZeroAttempts)));
    }
}

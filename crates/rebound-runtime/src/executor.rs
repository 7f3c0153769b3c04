//! Resilient call executor.
//!
//! Wraps an operation with retry, backoff and a per-key circuit breaker,
//! optionally routing to a fallback when the primary path is blocked or
//! exhausted.
//!
//! # Execution Flow
//! 1. Ask the breaker to admit the call; a rejected call goes straight to the
//!    fallback or fails with `CircuitOpen` without touching the operation
//! 2. Invoke the operation, at most `max_attempts` times, strictly in sequence
//! 3. Non-retryable errors return immediately with no circuit impact
//! 4. Retryable errors are recorded; the policy decides to back off, stop
//!    because the circuit opened, or stop because attempts ran out
//!
//! Both an async path (`execute*`, sleeping on tokio timers) and a blocking
//! path (`execute_blocking*`, sleeping the calling thread) share the same
//! breaker and decisions.
//!
//! # Cancellation
//! The `*_cancellable` variants check the token before every attempt and
//! while backing off. An attempt already in flight is never interrupted and
//! its outcome is still recorded. Dropping an `execute` future mid-attempt
//! abandons that attempt without recording it; if it was a half-open probe
//! the breaker admits a new probe after another reset timeout.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rebound_core::{
    Admission, CircuitBreaker, CircuitStatus, Clock, ConfigError, Decision, ExecutorConfig,
    RetryPolicy,
};
use tokio_util::sync::CancellationToken;

use crate::classify::RetryOn;
use crate::clock::TokioClock;
use crate::error::ResilienceError;
use crate::fallback::FallbackRegistry;
use crate::protected::Protected;

/// Granularity of cancellation checks during a blocking backoff.
const BLOCKING_SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Executes operations with retry, circuit breaking and fallbacks.
///
/// One executor owns the circuits and fallbacks for every key it serves.
/// Share it behind an `Arc` between the collaborators it protects.
pub struct Executor<E> {
    policy: RetryPolicy,
    breaker: CircuitBreaker,
    fallbacks: FallbackRegistry,
    retry_on: RetryOn<E>,
}

impl<E> Executor<E>
where
    E: fmt::Debug + Send + 'static,
{
    /// Create an executor on tokio's clock.
    pub fn new(policy: RetryPolicy, retry_on: RetryOn<E>) -> Self {
        Self::with_clock(policy, retry_on, Arc::new(TokioClock))
    }

    pub fn with_clock(policy: RetryPolicy, retry_on: RetryOn<E>, clock: Arc<dyn Clock>) -> Self {
        let breaker = CircuitBreaker::with_clock(policy.circuit_config(), clock);
        Self {
            policy,
            breaker,
            fallbacks: FallbackRegistry::new(),
            retry_on,
        }
    }

    /// Build from a config file model.
    pub fn from_config(config: ExecutorConfig, retry_on: RetryOn<E>) -> Result<Self, ConfigError> {
        Ok(Self::new(config.into_policy()?, retry_on))
    }

    pub fn builder() -> ExecutorBuilder<E> {
        ExecutorBuilder::new()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn fallbacks(&self) -> &FallbackRegistry {
        &self.fallbacks
    }

    // Fallback registration

    /// Register a zero-argument async fallback for `key`.
    pub fn register_fallback<T, F, Fut>(&self, key: impl Into<String>, fallback: F)
    where
        T: 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.fallbacks.register(key, move |(): ()| fallback());
    }

    /// Register an async fallback that receives the call's arguments.
    pub fn register_fallback_with<A, T, F, Fut>(&self, key: impl Into<String>, fallback: F)
    where
        A: 'static,
        T: 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.fallbacks.register(key, fallback);
    }

    /// Register a zero-argument synchronous fallback for `key`.
    pub fn register_blocking_fallback<T, F>(&self, key: impl Into<String>, fallback: F)
    where
        T: 'static,
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
    {
        self.fallbacks
            .register_blocking(key, move |(): ()| fallback());
    }

    /// Register a synchronous fallback that receives the call's arguments.
    pub fn register_blocking_fallback_with<A, T, F>(&self, key: impl Into<String>, fallback: F)
    where
        A: 'static,
        T: 'static,
        F: Fn(A) -> Result<T, E> + Send + Sync + 'static,
    {
        self.fallbacks.register_blocking(key, fallback);
    }

    pub fn remove_fallback(&self, key: &str) -> bool {
        self.fallbacks.remove(key)
    }

    // Async execution

    /// Run a zero-argument async operation under `key`.
    pub async fn execute<T, F, Fut>(&self, key: &str, mut operation: F) -> Result<T, ResilienceError<E>>
    where
        T: 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run(key, &self.policy, (), move |()| operation(), None)
            .await
    }

    /// Run an async operation, handing each attempt (and any fallback) a
    /// clone of `args`.
    pub async fn execute_with<A, T, F, Fut>(
        &self,
        key: &str,
        args: A,
        operation: F,
    ) -> Result<T, ResilienceError<E>>
    where
        A: Clone + 'static,
        T: 'static,
        F: FnMut(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run(key, &self.policy, args, operation, None).await
    }

    /// Like [`Executor::execute`], giving up when `token` is cancelled.
    pub async fn execute_cancellable<T, F, Fut>(
        &self,
        key: &str,
        token: &CancellationToken,
        mut operation: F,
    ) -> Result<T, ResilienceError<E>>
    where
        T: 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run(key, &self.policy, (), move |()| operation(), Some(token))
            .await
    }

    pub(crate) async fn run<A, T, F, Fut>(
        &self,
        key: &str,
        policy: &RetryPolicy,
        args: A,
        mut operation: F,
        cancel: Option<&CancellationToken>,
    ) -> Result<T, ResilienceError<E>>
    where
        A: Clone + 'static,
        T: 'static,
        F: FnMut(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admission = self.breaker.admit(key);
        if let Admission::Rejected { retry_after } = admission {
            tracing::debug!(key = %key, retry_after = ?retry_after, "Circuit open, call rejected");
            return self.open_circuit(key, args, None).await;
        }

        let mut attempt: u32 = 0;
        let mut last_error: Option<E> = None;

        loop {
            attempt += 1;

            if is_cancelled(cancel) {
                return Err(self.cancelled(key, attempt - 1));
            }
            if attempt > 1 && !self.breaker.is_closed(key) {
                tracing::warn!(key = %key, attempt, "Circuit opened by a concurrent call, abandoning retries");
                return self.open_circuit(key, args, last_error).await;
            }

            let error = match operation(args.clone()).await {
                Ok(value) => {
                    self.breaker.record_success(key);
                    return Ok(value);
                }
                Err(e) if !self.retry_on.matches(&e) => {
                    if admission == Admission::Probe {
                        self.breaker.release_probe(key);
                    }
                    return Err(ResilienceError::Inner(e));
                }
                Err(e) => e,
            };

            let outcome = self.breaker.record_failure(key);
            match policy.decide(attempt, outcome) {
                Decision::Open => return self.open_circuit(key, args, Some(error)).await,
                Decision::Exhausted { attempts } => {
                    return self.exhausted(key, args, attempts, error).await
                }
                Decision::Retry { delay } => {
                    tracing::warn!(
                        key = %key,
                        attempt,
                        max_attempts = policy.max_attempts(),
                        delay = ?delay,
                        error = ?error,
                        "Attempt failed, retrying after backoff"
                    );

                    match cancel {
                        Some(token) => {
                            tokio::select! {
                                _ = token.cancelled() => return Err(self.cancelled(key, attempt)),
                                _ = tokio::time::sleep(delay) => {}
                            }
                        }
                        None => tokio::time::sleep(delay).await,
                    }
                    last_error = Some(error);
                }
            }
        }
    }

    async fn open_circuit<A, T>(
        &self,
        key: &str,
        args: A,
        last_error: Option<E>,
    ) -> Result<T, ResilienceError<E>>
    where
        A: 'static,
        T: 'static,
    {
        match self.fallbacks.get::<A, T, E>(key) {
            Some(fallback) => {
                tracing::debug!(key = %key, "Circuit open, routing to fallback");
                fallback.invoke(args).await.map_err(ResilienceError::Inner)
            }
            None => Err(ResilienceError::CircuitOpen {
                key: key.to_string(),
                last_error,
            }),
        }
    }

    async fn exhausted<A, T>(
        &self,
        key: &str,
        args: A,
        attempts: u32,
        last_error: E,
    ) -> Result<T, ResilienceError<E>>
    where
        A: 'static,
        T: 'static,
    {
        match self.fallbacks.get::<A, T, E>(key) {
            Some(fallback) => {
                tracing::debug!(key = %key, attempts, "Retries exhausted, routing to fallback");
                fallback.invoke(args).await.map_err(ResilienceError::Inner)
            }
            None => Err(ResilienceError::RetryExhausted {
                key: key.to_string(),
                attempts,
                last_error,
            }),
        }
    }

    // Blocking execution

    /// Run a zero-argument synchronous operation under `key`, sleeping the
    /// calling thread between attempts.
    pub fn execute_blocking<T, F>(&self, key: &str, mut operation: F) -> Result<T, ResilienceError<E>>
    where
        T: 'static,
        F: FnMut() -> Result<T, E>,
    {
        self.run_blocking(key, &self.policy, (), move |()| operation(), None)
    }

    pub fn execute_blocking_with<A, T, F>(
        &self,
        key: &str,
        args: A,
        operation: F,
    ) -> Result<T, ResilienceError<E>>
    where
        A: Clone + 'static,
        T: 'static,
        F: FnMut(A) -> Result<T, E>,
    {
        self.run_blocking(key, &self.policy, args, operation, None)
    }

    pub fn execute_blocking_cancellable<T, F>(
        &self,
        key: &str,
        token: &CancellationToken,
        mut operation: F,
    ) -> Result<T, ResilienceError<E>>
    where
        T: 'static,
        F: FnMut() -> Result<T, E>,
    {
        self.run_blocking(key, &self.policy, (), move |()| operation(), Some(token))
    }

    pub(crate) fn run_blocking<A, T, F>(
        &self,
        key: &str,
        policy: &RetryPolicy,
        args: A,
        mut operation: F,
        cancel: Option<&CancellationToken>,
    ) -> Result<T, ResilienceError<E>>
    where
        A: Clone + 'static,
        T: 'static,
        F: FnMut(A) -> Result<T, E>,
    {
        let admission = self.breaker.admit(key);
        if let Admission::Rejected { retry_after } = admission {
            tracing::debug!(key = %key, retry_after = ?retry_after, "Circuit open, call rejected");
            return self.open_circuit_blocking(key, args, None);
        }

        let mut attempt: u32 = 0;
        let mut last_error: Option<E> = None;

        loop {
            attempt += 1;

            if is_cancelled(cancel) {
                return Err(self.cancelled(key, attempt - 1));
            }
            if attempt > 1 && !self.breaker.is_closed(key) {
                tracing::warn!(key = %key, attempt, "Circuit opened by a concurrent call, abandoning retries");
                return self.open_circuit_blocking(key, args, last_error);
            }

            let error = match operation(args.clone()) {
                Ok(value) => {
                    self.breaker.record_success(key);
                    return Ok(value);
                }
                Err(e) if !self.retry_on.matches(&e) => {
                    if admission == Admission::Probe {
                        self.breaker.release_probe(key);
                    }
                    return Err(ResilienceError::Inner(e));
                }
                Err(e) => e,
            };

            let outcome = self.breaker.record_failure(key);
            match policy.decide(attempt, outcome) {
                Decision::Open => return self.open_circuit_blocking(key, args, Some(error)),
                Decision::Exhausted { attempts } => {
                    return match self.fallbacks.get_blocking::<A, T, E>(key) {
                        Some(fallback) => {
                            tracing::debug!(key = %key, attempts, "Retries exhausted, routing to fallback");
                            fallback(args).map_err(ResilienceError::Inner)
                        }
                        None => Err(ResilienceError::RetryExhausted {
                            key: key.to_string(),
                            attempts,
                            last_error: error,
                        }),
                    };
                }
                Decision::Retry { delay } => {
                    tracing::warn!(
                        key = %key,
                        attempt,
                        max_attempts = policy.max_attempts(),
                        delay = ?delay,
                        error = ?error,
                        "Attempt failed, retrying after backoff"
                    );

                    if !sleep_blocking(delay, cancel) {
                        return Err(self.cancelled(key, attempt));
                    }
                    last_error = Some(error);
                }
            }
        }
    }

    fn open_circuit_blocking<A, T>(
        &self,
        key: &str,
        args: A,
        last_error: Option<E>,
    ) -> Result<T, ResilienceError<E>>
    where
        A: 'static,
        T: 'static,
    {
        match self.fallbacks.get_blocking::<A, T, E>(key) {
            Some(fallback) => {
                tracing::debug!(key = %key, "Circuit open, routing to fallback");
                fallback(args).map_err(ResilienceError::Inner)
            }
            None => Err(ResilienceError::CircuitOpen {
                key: key.to_string(),
                last_error,
            }),
        }
    }

    fn cancelled(&self, key: &str, attempts: u32) -> ResilienceError<E> {
        tracing::debug!(key = %key, attempts, "Call cancelled");
        ResilienceError::Cancelled {
            key: key.to_string(),
            attempts,
        }
    }

    // Inspection

    /// Read-only snapshot of the circuit for `key`.
    pub fn get_circuit_status(&self, key: &str) -> CircuitStatus {
        self.breaker.status(key)
    }

    /// Keys with a tracked circuit.
    pub fn circuit_keys(&self) -> Vec<String> {
        self.breaker.keys()
    }

    /// Close one circuit, or all with `None`.
    pub fn reset_circuit(&self, key: Option<&str>) {
        self.breaker.reset(key);
    }

    /// Bind an operation to this executor under `key`.
    ///
    /// The returned wrapper is called like the operation itself and shares
    /// this executor's circuits and fallbacks.
    pub fn protect<F>(self: &Arc<Self>, key: impl Into<String>, operation: F) -> Protected<E, F> {
        Protected::new(Arc::clone(self), key.into(), operation)
    }

    /// Bind an operation keyed by its own type name.
    ///
    /// Every closure and function item has a distinct type, so two call sites
    /// never share a circuit by accident. Use [`protect`](Self::protect) to
    /// group operations under one key.
    pub fn protect_default<F>(self: &Arc<Self>, operation: F) -> Protected<E, F> {
        self.protect(std::any::type_name::<F>(), operation)
    }
}

impl<E> fmt::Debug for Executor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("policy", &self.policy)
            .field("circuits", &self.breaker.keys())
            .field("fallbacks", &self.fallbacks)
            .field("retry_on", &self.retry_on)
            .finish()
    }
}

fn is_cancelled(token: Option<&CancellationToken>) -> bool {
    token.map(CancellationToken::is_cancelled).unwrap_or(false)
}

/// Sleep the thread for `delay`. Returns false if cancelled first.
fn sleep_blocking(delay: Duration, cancel: Option<&CancellationToken>) -> bool {
    let Some(token) = cancel else {
        std::thread::sleep(delay);
        return true;
    };

    let deadline = Instant::now() + delay;
    loop {
        if token.is_cancelled() {
            return false;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        std::thread::sleep(remaining.min(BLOCKING_SLEEP_SLICE));
    }
}

/// Builder for [`Executor`].
pub struct ExecutorBuilder<E> {
    policy: RetryPolicy,
    retry_on: RetryOn<E>,
    clock: Option<Arc<dyn Clock>>,
}

impl<E> ExecutorBuilder<E>
where
    E: fmt::Debug + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            policy: RetryPolicy::default(),
            retry_on: RetryOn::All,
            clock: None,
        }
    }

    pub fn policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Use a validated config file model.
    pub fn config(mut self, config: ExecutorConfig) -> Result<Self, ConfigError> {
        self.policy = config.into_policy()?;
        Ok(self)
    }

    pub fn retry_on(mut self, retry_on: RetryOn<E>) -> Self {
        self.retry_on = retry_on;
        self
    }

    /// Retry only errors the predicate accepts.
    pub fn retry_if<F>(self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.retry_on(RetryOn::predicate(predicate))
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Executor<E> {
        let clock = self.clock.unwrap_or_else(|| Arc::new(TokioClock));
        Executor::with_clock(self.policy, self.retry_on, clock)
    }
}

impl<E> Default for ExecutorBuilder<E>
where
    E: fmt::Debug + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rebound_core::{BackoffConfig, BackoffStrategy, CircuitState, ManualClock};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    enum ApiError {
        Unavailable,
        BadRequest,
    }

    fn policy(max_attempts: u32, threshold: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            BackoffConfig::fixed(
                BackoffStrategy::Constant,
                Duration::from_millis(1),
                Duration::from_millis(1),
            ),
            threshold,
            Duration::from_secs(30),
        )
        .unwrap()
    }

    fn executor(max_attempts: u32, threshold: u32) -> (Executor<ApiError>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let executor = Executor::builder()
            .policy(policy(max_attempts, threshold))
            .retry_if(|e: &ApiError| *e == ApiError::Unavailable)
            .clock(clock.clone())
            .build();
        (executor, clock)
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let (executor, _clock) = executor(3, 5);
        let result = executor.execute("llm", || async { Ok::<_, ApiError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(executor.get_circuit_status("llm").state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let (executor, _clock) = executor(3, 5);
        let calls = AtomicU32::new(0);

        let result = executor
            .execute("llm", || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(ApiError::Unavailable)
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(executor.get_circuit_status("llm").consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_non_retryable_bypasses_retry_and_circuit() {
        let (executor, _clock) = executor(5, 1);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = executor
            .execute("github", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ApiError::BadRequest) }
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::Inner(ApiError::BadRequest))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let status = executor.get_circuit_status("github");
        assert_eq!(status.state, CircuitState::Closed);
        assert_eq!(status.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_exhausted_fallback_failure_propagates_unmodified() {
        let (executor, _clock) = executor(2, 10);
        executor.register_fallback("slack", || async { Err::<u32, _>(ApiError::BadRequest) });

        let result = executor
            .execute("slack", || async { Err::<u32, _>(ApiError::Unavailable) })
            .await;

        assert!(matches!(result, Err(ResilienceError::Inner(ApiError::BadRequest))));
    }

    #[tokio::test]
    async fn test_fallback_receives_args() {
        let (executor, _clock) = executor(1, 10);
        executor.register_fallback_with("search", |query: String| async move {
            Ok::<_, ApiError>(format!("fallback:{query}"))
        });

        let result = executor
            .execute_with("search", "rust".to_string(), |_query: String| async {
                Err::<String, _>(ApiError::Unavailable)
            })
            .await;

        assert_eq!(result.unwrap(), "fallback:rust");
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens_with_manual_clock() {
        let (executor, clock) = executor(1, 1);

        let first = executor
            .execute("llm", || async { Err::<(), _>(ApiError::Unavailable) })
            .await;
        assert!(matches!(
            first,
            Err(ResilienceError::CircuitOpen { last_error: Some(_), .. })
        ));

        clock.advance(Duration::from_secs(30));
        let calls = AtomicU32::new(0);
        let probe = executor
            .execute("llm", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ApiError::Unavailable) }
            })
            .await;

        assert!(probe.unwrap_err().is_circuit_open());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(executor.get_circuit_status("llm").state, CircuitState::Open);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let (executor, _clock) = executor(3, 5);
        let token = CancellationToken::new();
        token.cancel();

        let calls = AtomicU32::new(0);
        let result = executor
            .execute_cancellable("llm", &token, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, ApiError>(()) }
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::Cancelled { attempts: 0, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_during_backoff() {
        let executor: Executor<ApiError> = Executor::new(
            RetryPolicy::new(
                5,
                BackoffConfig::fixed(
                    BackoffStrategy::Constant,
                    Duration::from_secs(60),
                    Duration::from_secs(60),
                ),
                10,
                Duration::from_secs(30),
            )
            .unwrap(),
            RetryOn::All,
        );
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            canceller.cancel();
        });

        let result = executor
            .execute_cancellable("llm", &token, || async { Err::<(), _>(ApiError::Unavailable) })
            .await;

        assert!(matches!(result, Err(ResilienceError::Cancelled { attempts: 1, .. })));
        assert_eq!(executor.get_circuit_status("llm").consecutive_failures, 1);
    }

    #[test]
    fn test_blocking_retries_then_exhausts() {
        let (executor, _clock) = executor(3, 10);
        let mut calls = 0;

        let result: Result<(), _> = executor.execute_blocking("github", || {
            calls += 1;
            Err(ApiError::Unavailable)
        });

        match result {
            Err(ResilienceError::RetryExhausted { attempts, last_error, .. }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error, ApiError::Unavailable);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(calls, 3);
        assert_eq!(executor.get_circuit_status("github").consecutive_failures, 3);
    }

    #[test]
    fn test_blocking_open_circuit_uses_blocking_fallback() {
        let (executor, _clock) = executor(1, 1);
        executor.register_blocking_fallback("github", || Ok::<_, ApiError>("cached"));

        let tripped = executor.execute_blocking("github", || Err::<&str, _>(ApiError::Unavailable));
        assert_eq!(tripped.unwrap(), "cached");

        let mut calls = 0;
        let rejected = executor.execute_blocking("github", || {
            calls += 1;
            Ok::<&str, ApiError>("live")
        });
        assert_eq!(rejected.unwrap(), "cached");
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_blocking_cancellation() {
        let (executor, _clock) = executor(3, 10);
        let token = CancellationToken::new();
        let mut calls = 0;

        let result: Result<(), _> = executor.execute_blocking_cancellable("llm", &token, || {
            calls += 1;
            token.cancel();
            Err(ApiError::Unavailable)
        });

        assert!(matches!(result, Err(ResilienceError::Cancelled { attempts: 1, .. })));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_reset_circuit() {
        let (executor, _clock) = executor(1, 1);
        let _ = executor
            .execute("a", || async { Err::<(), _>(ApiError::Unavailable) })
            .await;
        assert_eq!(executor.get_circuit_status("a").state, CircuitState::Open);

        executor.reset_circuit(Some("a"));
        assert_eq!(executor.get_circuit_status("a").state, CircuitState::Closed);
        assert_eq!(executor.circuit_keys(), vec!["a".to_string()]);

        executor.reset_circuit(None);
        assert!(executor.circuit_keys().is_empty());
    }
}

//! Which operation errors are worth retrying.

use std::fmt;
use std::sync::Arc;

/// Errors that know whether they are transient.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Retry classification for an executor.
///
/// Errors that do not match are returned immediately and never count
/// against a circuit.
pub enum RetryOn<E> {
    /// Every error is retryable
    All,

    /// Only errors the predicate accepts are retryable
    Predicate(Arc<dyn Fn(&E) -> bool + Send + Sync>),
}

impl<E> RetryOn<E> {
    pub fn all() -> Self {
        RetryOn::All
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        RetryOn::Predicate(Arc::new(f))
    }

    /// Defer to the error's own [`Retryable`] impl.
    pub fn by_trait() -> Self
    where
        E: Retryable + 'static,
    {
        RetryOn::predicate(|e: &E| e.is_retryable())
    }

    pub fn matches(&self, error: &E) -> bool {
        match self {
            RetryOn::All => true,
            RetryOn::Predicate(f) => f(error),
        }
    }
}

impl<E> Default for RetryOn<E> {
    fn default() -> Self {
        RetryOn::All
    }
}

impl<E> Clone for RetryOn<E> {
    fn clone(&self) -> Self {
        match self {
            RetryOn::All => RetryOn::All,
            RetryOn::Predicate(f) => RetryOn::Predicate(Arc::clone(f)),
        }
    }
}

impl<E> fmt::Debug for RetryOn<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryOn::All => f.write_str("RetryOn::All"),
            RetryOn::Predicate(_) => f.write_str("RetryOn::Predicate(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    enum ApiError {
        RateLimited,
        BadRequest,
    }

    impl Retryable for ApiError {
        fn is_retryable(&self) -> bool {
            matches!(self, ApiError::RateLimited)
        }
    }

    #[test]
    fn test_all_matches_everything() {
        let retry_on: RetryOn<ApiError> = RetryOn::default();
        assert!(retry_on.matches(&ApiError::BadRequest));
    }

    #[test]
    fn test_by_trait() {
        let retry_on = RetryOn::<ApiError>::by_trait();
        assert!(retry_on.matches(&ApiError::RateLimited));
        assert!(!retry_on.matches(&ApiError::BadRequest));
    }

    #[test]
    fn test_predicate() {
        let retry_on = RetryOn::predicate(|status: &u16| *status >= 500);
        assert!(retry_on.matches(&503));
        assert!(!retry_on.matches(&404));
    }
}

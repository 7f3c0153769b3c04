//! Fallback registration.
//!
//! A fallback is an alternate operation for a key, used when the circuit is
//! open or the retries run out. Keys map to operations of different result
//! types, so entries are stored type-erased and recovered by downcasting
//! to the signature the caller expects.

use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

pub(crate) type AsyncFallbackFn<A, T, E> =
    Arc<dyn Fn(A) -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

pub(crate) type BlockingFallbackFn<A, T, E> = Arc<dyn Fn(A) -> Result<T, E> + Send + Sync>;

/// A fallback recovered from the registry with a concrete signature.
pub(crate) enum Fallback<A, T, E> {
    Async(AsyncFallbackFn<A, T, E>),
    Blocking(BlockingFallbackFn<A, T, E>),
}

impl<A, T, E> Fallback<A, T, E> {
    pub(crate) async fn invoke(&self, args: A) -> Result<T, E> {
        match self {
            Fallback::Async(f) => f(args).await,
            Fallback::Blocking(f) => f(args),
        }
    }
}

type Erased = Box<dyn Any + Send + Sync>;

#[derive(Default)]
struct Entry {
    async_fn: Option<Erased>,
    blocking_fn: Option<Erased>,
}

/// Fallback operations by key.
///
/// Read-mostly: written during setup, read on every rejected or exhausted call.
#[derive(Default)]
pub struct FallbackRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl FallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an async fallback taking the call's arguments.
    ///
    /// Replaces any async fallback already registered for `key`.
    pub fn register<A, T, E, F, Fut>(&self, key: impl Into<String>, fallback: F)
    where
        A: 'static,
        T: 'static,
        E: 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let erased: AsyncFallbackFn<A, T, E> = Arc::new(move |args| fallback(args).boxed());
        self.entries
            .write()
            .entry(key.into())
            .or_default()
            .async_fn = Some(Box::new(erased));
    }

    /// Register a synchronous fallback taking the call's arguments.
    pub fn register_blocking<A, T, E, F>(&self, key: impl Into<String>, fallback: F)
    where
        A: 'static,
        T: 'static,
        E: 'static,
        F: Fn(A) -> Result<T, E> + Send + Sync + 'static,
    {
        let erased: BlockingFallbackFn<A, T, E> = Arc::new(fallback);
        self.entries
            .write()
            .entry(key.into())
            .or_default()
            .blocking_fn = Some(Box::new(erased));
    }

    /// Remove every fallback for `key`. Returns whether any existed.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Fallback usable from async code: the async one, else the blocking one.
    pub(crate) fn get<A, T, E>(&self, key: &str) -> Option<Fallback<A, T, E>>
    where
        A: 'static,
        T: 'static,
        E: 'static,
    {
        let entries = self.entries.read();
        let entry = entries.get(key)?;

        let found = entry
            .async_fn
            .as_ref()
            .and_then(|f| f.downcast_ref::<AsyncFallbackFn<A, T, E>>())
            .map(|f| Fallback::Async(Arc::clone(f)))
            .or_else(|| {
                entry
                    .blocking_fn
                    .as_ref()
                    .and_then(|f| f.downcast_ref::<BlockingFallbackFn<A, T, E>>())
                    .map(|f| Fallback::Blocking(Arc::clone(f)))
            });

        if found.is_none() {
            tracing::debug!(key = %key, "Fallback registered with a different signature, ignoring");
        }
        found
    }

    /// Fallback usable from blocking code.
    pub(crate) fn get_blocking<A, T, E>(&self, key: &str) -> Option<BlockingFallbackFn<A, T, E>>
    where
        A: 'static,
        T: 'static,
        E: 'static,
    {
        let entries = self.entries.read();
        let entry = entries.get(key)?;

        let found = entry
            .blocking_fn
            .as_ref()
            .and_then(|f| f.downcast_ref::<BlockingFallbackFn<A, T, E>>())
            .map(Arc::clone);

        if found.is_none() {
            tracing::debug!(key = %key, "No blocking fallback with a matching signature");
        }
        found
    }
}

impl std::fmt::Debug for FallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_invoke_async() {
        let registry = FallbackRegistry::new();
        registry.register("llm", |prompt: String| async move {
            Ok::<_, String>(format!("cached answer for {prompt}"))
        });

        let fallback = registry.get::<String, String, String>("llm").unwrap();
        let result = fallback.invoke("hello".to_string()).await;
        assert_eq!(result.unwrap(), "cached answer for hello");
    }

    #[tokio::test]
    async fn test_async_lookup_falls_back_to_blocking() {
        let registry = FallbackRegistry::new();
        registry.register_blocking("slack", |(): ()| Ok::<u32, String>(7));

        let fallback = registry.get::<(), u32, String>("slack").unwrap();
        assert_eq!(fallback.invoke(()).await.unwrap(), 7);
    }

    #[test]
    fn test_signature_mismatch_is_ignored() {
        let registry = FallbackRegistry::new();
        registry.register_blocking("github", |(): ()| Ok::<u32, String>(1));

        assert!(registry.get_blocking::<(), String, String>("github").is_none());
        assert!(registry.get_blocking::<(), u32, String>("github").is_some());
        assert!(registry.get::<(), String, String>("github").is_none());
    }

    #[test]
    fn test_remove() {
        let registry = FallbackRegistry::new();
        registry.register_blocking("a", |(): ()| Ok::<(), String>(()));
        assert!(registry.contains("a"));
        assert_eq!(registry.keys(), vec!["a".to_string()]);

        assert!(registry.remove("a"));
        assert!(!registry.remove("a"));
        assert!(!registry.contains("a"));
    }
}

//! Ordered middleware pipelines for requests and responses.
//!
//! An [`InterceptorChain`] maps strictly increasing handles to transforms.
//! Executing the chain threads a value through every registered transform in
//! registration order. A failing transform aborts the chain with an
//! [`InterceptorError`], which keeps the handler's error as its source.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Boxed error type returned by interceptors and transports.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A transform applied to every value passing through a chain.
///
/// Implement this for stateful middleware. Plain async closures can be
/// registered directly with [`InterceptorChain::register_fn`].
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use courier::{BoxError, Interceptor, RequestDescriptor};
///
/// struct BearerAuth(String);
///
/// #[async_trait]
/// impl Interceptor<RequestDescriptor> for BearerAuth {
///     async fn intercept(
///         &self,
///         request: RequestDescriptor,
///     ) -> Result<RequestDescriptor, BoxError> {
///         Ok(request.with_header("authorization", format!("Bearer {}", self.0))?)
///     }
/// }
/// ```
#[async_trait]
pub trait Interceptor<T: Send + 'static>: Send + Sync {
    /// Transforms `value`, or fails and aborts the chain.
    async fn intercept(&self, value: T) -> Result<T, BoxError>;
}

struct FnInterceptor<F>(F);

#[async_trait]
impl<T, F, Fut> Interceptor<T> for FnInterceptor<F>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
{
    async fn intercept(&self, value: T) -> Result<T, BoxError> {
        (self.0)(value).await
    }
}

/// Failure raised while a chain was executing.
///
/// The message identifies interceptor processing as the failing stage; the
/// handler's own error is kept as the source.
#[derive(thiserror::Error, Debug)]
#[error("Interceptor failed: {source}")]
pub struct InterceptorError {
    handle: usize,
    #[source]
    source: BoxError,
}

impl InterceptorError {
    pub(crate) fn new(handle: usize, source: BoxError) -> Self {
        Self { handle, source }
    }

    /// Handle of the interceptor that failed.
    pub fn handle(&self) -> usize {
        self.handle
    }

    /// Unwraps the handler's original error.
    pub fn into_source(self) -> BoxError {
        self.source
    }
}

/// An ordered, handle-addressed pipeline of transforms over `T`.
///
/// Registration and removal take a short write lock. [`execute`] snapshots
/// the handlers under a read lock and then runs without holding it, so any
/// number of executions may be in flight at once.
///
/// [`execute`]: InterceptorChain::execute
pub struct InterceptorChain<T: Send + 'static> {
    handlers: RwLock<BTreeMap<usize, Arc<dyn Interceptor<T>>>>,
    next_handle: AtomicUsize,
}

impl<T: Send + 'static> InterceptorChain<T> {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(BTreeMap::new()),
            next_handle: AtomicUsize::new(0),
        }
    }

    /// Registers an interceptor and returns its handle.
    ///
    /// Handles are strictly increasing and never reused, even after removal.
    pub fn register<I>(&self, interceptor: I) -> usize
    where
        I: Interceptor<T> + 'static,
    {
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, Arc::new(interceptor));
        handle
    }

    /// Registers an async closure as an interceptor.
    ///
    /// ```
    /// use courier::{BoxError, InterceptorChain, RequestDescriptor};
    ///
    /// let chain = InterceptorChain::<RequestDescriptor>::new();
    /// let handle = chain.register_fn(|request: RequestDescriptor| async move {
    ///     Ok::<_, BoxError>(request.with_param("trace", "1"))
    /// });
    /// assert_eq!(chain.len(), 1);
    /// chain.remove(handle);
    /// assert!(chain.is_empty());
    /// ```
    pub fn register_fn<F, Fut>(&self, f: F) -> usize
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        self.register(FnInterceptor(f))
    }

    /// Removes an interceptor. Unknown handles are ignored.
    pub fn remove(&self, handle: usize) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle);
    }

    /// Removes every interceptor. Handles keep increasing afterwards.
    pub fn clear(&self) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of registered interceptors.
    pub fn len(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if no interceptors are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Threads `value` through every interceptor in registration order.
    pub async fn execute(&self, mut value: T) -> Result<T, InterceptorError> {
        let handlers: Vec<(usize, Arc<dyn Interceptor<T>>)> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(handle, interceptor)| (*handle, Arc::clone(interceptor)))
            .collect();

        for (handle, interceptor) in handlers {
            value = interceptor.intercept(value).await.map_err(|source| {
                tracing::warn!(handle = handle, error = %source, "Interceptor failed");
                InterceptorError::new(handle, source)
            })?;
        }

        Ok(value)
    }
}

impl<T: Send + 'static> Default for InterceptorChain<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> std::fmt::Debug for InterceptorChain<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn append(chain: &InterceptorChain<String>, suffix: &'static str) -> usize {
        chain.register_fn(move |value: String| async move {
            Ok::<_, BoxError>(format!("{value}{suffix}"))
        })
    }

    #[tokio::test]
    async fn test_runs_in_registration_order() {
        let chain = InterceptorChain::new();
        append(&chain, "A");
        append(&chain, "B");

        assert_eq!(chain.execute("x".to_string()).await.unwrap(), "xAB");
    }

    #[tokio::test]
    async fn test_removed_interceptor_is_skipped() {
        let chain = InterceptorChain::new();
        let a = append(&chain, "A");
        append(&chain, "B");
        chain.remove(a);

        assert_eq!(chain.execute("x".to_string()).await.unwrap(), "xB");
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_handles_are_never_reused() {
        let chain = InterceptorChain::<String>::new();
        let a = append(&chain, "A");
        let b = append(&chain, "B");
        chain.remove(b);
        chain.remove(b);
        chain.remove(999);
        let c = append(&chain, "C");

        assert!(a < b && b < c);
        assert_eq!(chain.len(), 2);
        chain.clear();
        assert!(chain.is_empty());
        assert!(append(&chain, "D") > c);
    }

    #[tokio::test]
    async fn test_failure_is_wrapped() {
        let chain = InterceptorChain::new();
        append(&chain, "A");
        let failing = chain.register_fn(|_value: String| async move {
            Err::<String, BoxError>("token expired".into())
        });
        append(&chain, "C");

        let err = chain.execute("x".to_string()).await.unwrap_err();
        assert_eq!(err.handle(), failing);
        assert_eq!(err.to_string(), "Interceptor failed: token expired");
        assert_eq!(err.into_source().to_string(), "token expired");
    }

    #[tokio::test]
    async fn test_empty_chain_is_identity() {
        let chain = InterceptorChain::<u32>::new();
        assert_eq!(chain.execute(7).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_concurrent_executions_do_not_interfere() {
        let chain = Arc::new(InterceptorChain::<u32>::new());
        chain.register_fn(|n: u32| async move {
            tokio::task::yield_now().await;
            Ok::<_, BoxError>(n * 10)
        });
        chain.register_fn(|n: u32| async move { Ok::<_, BoxError>(n + 1) });

        let tasks: Vec<_> = (0..8)
            .map(|n| {
                let chain = Arc::clone(&chain);
                tokio::spawn(async move { chain.execute(n).await.unwrap() })
            })
            .collect();

        for (n, task) in tasks.into_iter().enumerate() {
            assert_eq!(task.await.unwrap(), n as u32 * 10 + 1);
        }
    }
}

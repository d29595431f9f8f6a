use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::{BackendError, BoxError};

/// A unit of generation work.
///
/// `execute` may be invoked more than once when the backend asks us to back
/// off, so implementations must be safe to retry.
#[async_trait]
pub trait Work: Send + Sync + 'static {
    /// Value handed back to the submitter
    type Output: Send + 'static;

    /// One attempt against the backend
    async fn execute(&self) -> Result<Self::Output, BackendError>;
}

/// Adapter turning an async closure into [`Work`]
pub struct FnWork<F>(F);

/// Wrap a closure returning a future as [`Work`]
///
/// ```rust
/// use dog_dispatch::{work_fn, BackendError};
///
/// let work = work_fn(|| async { Ok::<_, BackendError>("a post about volunteering".to_string()) });
/// # let _ = work;
/// ```
pub fn work_fn<F, Fut, T>(f: F) -> FnWork<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, BackendError>> + Send + 'static,
    T: Send + 'static,
{
    FnWork(f)
}

#[async_trait]
impl<F, Fut, T> Work for FnWork<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, BackendError>> + Send + 'static,
    T: Send + 'static,
{
    type Output = T;

    async fn execute(&self) -> Result<T, BackendError> {
        (self.0)().await
    }
}

/// One-shot notification run when the worker starts a task.
///
/// Typically edits the "you are N-th in line" message into "generating...".
/// Failures are logged and swallowed.
pub struct StartHook(Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxError>> + Send>);

impl StartHook {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self(Box::new(move || Box::pin(f())))
    }

    pub(crate) fn call(self) -> BoxFuture<'static, Result<(), BoxError>> {
        (self.0)()
    }
}

impl fmt::Debug for StartHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StartHook")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fn_work_can_run_repeatedly() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let work = work_fn(move || {
            let counter = counter.clone();
            async move { Ok::<_, BackendError>(counter.fetch_add(1, Ordering::SeqCst) + 1) }
        });

        assert_eq!(work.execute().await, Ok(1));
        assert_eq!(work.execute().await, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_start_hook_reports_failure() {
        let hook = StartHook::new(|| async { Err::<(), BoxError>("message was deleted".into()) });

        let err = hook.call().await.unwrap_err();
        assert_eq!(err.to_string(), "message was deleted");
    }
}

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::BleCentralError;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs `operation`, mapping an expired `timeout` onto `error`.
pub(crate) async fn with_timeout<T>(
    timeout: Option<Duration>,
    error: BleCentralError,
    operation: impl Future<Output = Result<T, BleCentralError>>,
) -> Result<T, BleCentralError> {
    match timeout {
        Some(duration) => tokio::time::timeout(duration, operation)
            .await
            .unwrap_or(Err(error)),
        None => operation.await,
    }
}

/// Runs `operation` until `deadline`, `None` when it passed first.
pub(crate) async fn until<F: Future>(
    deadline: Option<tokio::time::Instant>,
    operation: F,
) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, operation).await.ok(),
        None => Some(operation.await),
    }
}

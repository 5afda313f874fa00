//! Single-retry wrapper for storage calls made by the checkout service.

use std::{future::Future, time::Duration};

use backon::{BackoffBuilder, ExponentialBuilder};

use crate::error::{AppError, AppResult};

/// One retry after a short jittered delay.
pub fn storage_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(50))
        .with_max_delay(Duration::from_millis(500))
        .with_max_times(1)
        .with_jitter()
}

/// Runs `op`, retrying once when it fails with a transient storage error.
/// Domain errors are returned immediately.
pub async fn retry_transient<T, F, Fut>(operation: &'static str, mut op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let backoff = storage_backoff().build();
    let mut last_error = None;

    for (attempt, delay) in std::iter::once(Duration::ZERO).chain(backoff).enumerate() {
        if attempt > 0 {
            tokio::time::sleep(delay).await;
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                tracing::warn!(operation, attempt = attempt + 1, error = %err, "storage call failed");
                last_error = Some(err);
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_error
        .unwrap_or_else(|| AppError::Internal(anyhow::anyhow!("{operation}: retries exhausted"))))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn transient_failure_is_retried_once() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let result = retry_transient("flaky", || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(AppError::OrmError(sea_orm::DbErr::Custom("reset".into())))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn persistent_failure_gives_up_after_two_attempts() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let result: AppResult<()> = retry_transient("down", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::OrmError(sea_orm::DbErr::Custom("down".into())))
        })
        .await;

        assert!(matches!(result, Err(AppError::OrmError(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn domain_errors_are_not_retried() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let result: AppResult<()> = retry_transient("domain", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::EmptyCart)
        })
        .await;

        assert!(matches!(result, Err(AppError::EmptyCart)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

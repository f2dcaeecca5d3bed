use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::store::StoreError;

/// Run a store operation, retrying it once after `backoff` if the first
/// attempt failed transiently. Store writes are atomic, so a failed attempt
/// left nothing behind and the retry starts from a clean slate.
pub async fn retry_transient<T, F, Fut>(operation: &str, backoff: Duration, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    match op().await {
        Err(err) if err.is_transient() => {
            warn!("{} failed transiently, retrying in {:?}: {}", operation, backoff, err);
            tokio::time::sleep(backoff).await;
            op().await
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retries_once_on_transient_failure() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry_transient("probe", Duration::from_millis(1), move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(StoreError::Unavailable("blip".to_string()))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_second_failure() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), StoreError> = retry_transient("probe", Duration::from_millis(1), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable("down".to_string()))
        })
        .await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_does_not_retry_definite_failures() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), StoreError> = retry_transient("probe", Duration::from_millis(1), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::SlotOverlap("taken".to_string()))
        })
        .await;

        assert!(matches!(result, Err(StoreError::SlotOverlap(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

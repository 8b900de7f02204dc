//! Shared `CatalogError::Busy` retry helper (spec §7: "retried by the
//! caller up to 5x with 10-200ms jittered backoff; other kinds propagate").
//! Used by `ImageProcessor`'s persistence step and `JobRunner`'s totals
//! update so both sides of a SQLite write contention race back off the
//! same way, grounded on the teacher's bounded-retry-with-jitter pattern
//! for transient infrastructure errors.

use std::time::Duration;

use rand::Rng;

use imgforge_domain::error::{CatalogErrorKind, DomainError};

const MAX_ATTEMPTS: u32 = 5;

/// Runs `op` up to [`MAX_ATTEMPTS`] times, sleeping a random 10-200ms
/// between attempts whenever it fails with `CatalogErrorKind::Busy`. Any
/// other error, or a `Busy` on the final attempt, is returned immediately.
pub async fn with_busy_retry<T, F, Fut>(mut op: F) -> Result<T, DomainError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, DomainError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(DomainError::Catalog { kind: CatalogErrorKind::Busy, .. }) if attempt + 1 < MAX_ATTEMPTS => {
                attempt += 1;
                let jitter_ms = rand::rng().random_range(10..=200);
                tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success_on_busy() {
        let attempts = AtomicU32::new(0);
        let result = with_busy_retry(|| async {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(DomainError::catalog(CatalogErrorKind::Busy, "locked"))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn propagates_non_busy_errors_immediately() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), DomainError> = with_busy_retry(|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(DomainError::catalog(CatalogErrorKind::Corrupt, "bad row"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts_on_persistent_busy() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), DomainError> = with_busy_retry(|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(DomainError::catalog(CatalogErrorKind::Busy, "locked"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }
}

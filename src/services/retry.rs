//! Retrying store writes that lose an optimistic-concurrency race.

use std::future::Future;
use std::time::Duration;

use backoff::ExponentialBackoff;
use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};

const INITIAL_INTERVAL: Duration = Duration::from_millis(10);

/// Exponential backoff bounded by `max_elapsed`.
pub fn conflict_backoff(max_elapsed: Duration) -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: INITIAL_INTERVAL,
        max_elapsed_time: Some(max_elapsed),
        ..ExponentialBackoff::default()
    }
}

/// Run `attempt` until it succeeds, fails permanently, or `max_elapsed`
/// passes. Only transient errors are retried; each attempt must re-read what
/// it writes.
pub async fn retry_on_conflict<T, F, Fut>(max_elapsed: Duration, operation: &'static str, mut attempt: F) -> DomainResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DomainResult<T>>,
{
    backoff::future::retry(conflict_backoff(max_elapsed), || {
        let pending = attempt();
        async move {
            pending.await.map_err(|err: DomainError| {
                if err.is_transient() {
                    debug!(operation, error = %err, "write conflicted, retrying");
                    backoff::Error::transient(err)
                } else {
                    backoff::Error::permanent(err)
                }
            })
        }
    })
    .await
}

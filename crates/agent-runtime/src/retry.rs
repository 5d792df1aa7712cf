//! Retry Executor
//!
//! Re-runs an operation on transient HTTP failures (429 and 5xx gateway
//! errors) with exponential backoff and jitter. Anything else fails fast.

use std::future::Future;
use std::time::Duration;

use agent_core::error::{AgentError, Result};
use rand::Rng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Status codes worth another attempt
pub const RETRYABLE_STATUS: [u16; 5] = [429, 500, 502, 503, 504];

/// Delay before the second attempt; doubles after each further failure
pub const BASE_BACKOFF: Duration = Duration::from_millis(500);

/// A failure tagged with the HTTP status that produced it
#[derive(Debug, Error)]
#[error("{source} (status {status})")]
pub struct RetryableError {
    pub status: u16,
    #[source]
    pub source: AgentError,
}

impl RetryableError {
    pub fn new(status: u16, source: AgentError) -> Self {
        Self { status, source }
    }

    pub fn is_retryable(&self) -> bool {
        RETRYABLE_STATUS.contains(&self.status)
    }
}

/// Failure of a single attempt
#[derive(Debug, Error)]
pub enum RetryError {
    /// Carries a status; retried when the status is in [`RETRYABLE_STATUS`]
    #[error(transparent)]
    Status(#[from] RetryableError),

    /// Never retried
    #[error(transparent)]
    Fatal(#[from] AgentError),
}

impl RetryError {
    fn into_agent_error(self) -> AgentError {
        match self {
            RetryError::Status(err) => err.source,
            RetryError::Fatal(err) => err,
        }
    }
}

/// Backoff before retrying after failed attempt `attempt` (0-indexed)
pub fn backoff_for_attempt(attempt: u32) -> Duration {
    BASE_BACKOFF.saturating_mul(2_u32.saturating_pow(attempt))
}

/// Backoff plus jitter drawn uniformly from `[0, backoff / 2)`
fn delay_for_attempt(attempt: u32) -> Duration {
    let backoff = backoff_for_attempt(attempt);
    let half = backoff / 2;
    if half.is_zero() {
        return backoff;
    }
    let jitter = rand::thread_rng().gen_range(Duration::ZERO..half);
    backoff + jitter
}

/// Run `operation` up to `max_attempts` times (0 is treated as 1).
///
/// Only [`RetryError::Status`] failures with a retryable status are
/// retried; the backoff wait aborts with [`AgentError::Cancelled`] when
/// `cancel` fires. When attempts run out the last error is returned.
pub async fn with_retry<T, F, Fut>(
    cancel: &CancellationToken,
    max_attempts: u32,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, RetryError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let failure = match operation().await {
            Ok(value) => return Ok(value),
            Err(RetryError::Status(err)) if err.is_retryable() => err,
            Err(err) => return Err(err.into_agent_error()),
        };

        attempt += 1;
        if attempt >= max_attempts {
            return Err(failure.source);
        }

        let delay = delay_for_attempt(attempt - 1);
        tracing::warn!(
            status = failure.status,
            attempt,
            max_attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "transient failure, retrying"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AgentError::Cancelled),
            () = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn status_error(status: u16) -> RetryError {
        RetryableError::new(status, AgentError::completion("status", format!("status {status}"))).into()
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff_for_attempt(0), Duration::from_millis(500));
        assert_eq!(backoff_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(backoff_for_attempt(3), Duration::from_millis(4000));
    }

    #[test]
    fn test_jitter_bounds() {
        for attempt in 0..4 {
            let backoff = backoff_for_attempt(attempt);
            let delay = delay_for_attempt(attempt);
            assert!(delay >= backoff);
            assert!(delay < backoff + backoff / 2);
        }
    }

    #[test]
    fn test_retryable_status_set() {
        for status in [429, 500, 502, 503, 504] {
            assert!(RetryableError::new(status, AgentError::Cancelled).is_retryable());
        }
        for status in [400, 401, 404, 501] {
            assert!(!RetryableError::new(status, AgentError::Cancelled).is_retryable());
        }
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let attempts = AtomicU32::new(0);
        let value = with_retry(&CancellationToken::new(), 3, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Ok::<_, RetryError>(7)
        })
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_two_unavailable() {
        let attempts = AtomicU32::new(0);
        let result = with_retry(&CancellationToken::new(), 3, || async {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                return Err(status_error(503));
            }
            Ok("done")
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_status_fails_fast() {
        let attempts = AtomicU32::new(0);
        let result: Result<()> = with_retry(&CancellationToken::new(), 3, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(status_error(400))
        })
        .await;

        assert!(matches!(result, Err(AgentError::CompletionFailed(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_untagged_error_fails_fast() {
        let attempts = AtomicU32::new(0);
        let result: Result<()> = with_retry(&CancellationToken::new(), 5, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(RetryError::Fatal(AgentError::completion("unmarshal", "bad json")))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_attempts_and_returns_last_error() {
        let attempts = AtomicU32::new(0);
        let result: Result<()> = with_retry(&CancellationToken::new(), 3, || async {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            Err(RetryableError::new(
                502,
                AgentError::completion("status", format!("attempt {n}")),
            )
            .into())
        })
        .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        match result {
            Err(AgentError::CompletionFailed(msg)) => assert!(msg.ends_with("attempt 2")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_zero_attempts_runs_once() {
        let attempts = AtomicU32::new(0);
        let result: Result<()> = with_retry(&CancellationToken::new(), 0, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(status_error(503))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_backoff() {
        let cancel = CancellationToken::new();
        let attempts = Arc::new(AtomicU32::new(0));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let counter = Arc::clone(&attempts);
        let result: Result<()> = with_retry(&cancel, 5, || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(status_error(429))
            }
        })
        .await;

        assert!(matches!(result, Err(AgentError::Cancelled)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}

//! Bounded retries with exponential backoff around network fetches.

use std::time::Duration;

use bytes::Bytes;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::FetchError;
use crate::net::{ByteRange, Fetcher};

/// Retry budget for one network operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// Backoff before retry number `retry` (zero-based), without jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.min(16)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Backoff with up to 25% random jitter added.
    fn backoff_with_jitter(&self, retry: u32) -> Duration {
        let delay = self.backoff(retry);
        let jitter_ms = (delay.as_millis() / 4) as u64;
        if jitter_ms == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

/// Why a retried fetch gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RetryError {
    Cancelled,
    Exhausted { attempts: u32, source: FetchError },
}

/// Fetch `url`, retrying transient failures.
///
/// Each attempt is bounded by `timeout`; an elapsed timeout counts as a
/// transient failure. A ranged fetch always yields exactly the requested
/// bytes, even from a server that answers with the whole resource. Cancellation is checked before every attempt and
/// interrupts the backoff sleep, never an attempt in flight.
pub(crate) async fn fetch_with_retry(
    fetcher: &dyn Fetcher,
    url: &Url,
    range: Option<ByteRange>,
    policy: &RetryPolicy,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Bytes, RetryError> {
    let mut retry = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        let attempt = tokio::time::timeout(timeout, fetcher.fetch(url, range))
            .await
            .unwrap_or(Err(FetchError::Timeout))
            .and_then(|bytes| match range {
                Some(range) => range.extract(bytes),
                None => Ok(bytes),
            });
        let error = match attempt {
            Ok(bytes) => return Ok(bytes),
            Err(e) => e,
        };

        if !error.is_transient() || retry >= policy.max_retries {
            return Err(RetryError::Exhausted {
                attempts: retry + 1,
                source: error,
            });
        }

        let delay = policy.backoff_with_jitter(retry);
        tracing::debug!(
            "Fetch of {} failed ({}), retry {}/{} in {:?}",
            url,
            error,
            retry + 1,
            policy.max_retries,
            delay
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        retry += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockFetcher;

    fn url() -> Url {
        Url::parse("https://cdn.test/seg0.ts").unwrap()
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::ZERO, Duration::ZERO)
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(500));
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(500));
        assert_eq!(policy.backoff(40), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let fetcher = MockFetcher::new();
        fetcher.serve(url().as_str(), b"payload");
        fetcher.fail_times(url().as_str(), FetchError::Status(503), 2);

        let bytes = fetch_with_retry(
            &fetcher,
            &url(),
            None,
            &policy(2),
            Duration::from_secs(5),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(&bytes[..], b"payload");
        assert_eq!(fetcher.hits(url().as_str()), 3);
    }

    #[tokio::test]
    async fn test_budget_exhaustion() {
        let fetcher = MockFetcher::new();
        fetcher.serve(url().as_str(), b"payload");
        fetcher.fail_times(url().as_str(), FetchError::Timeout, 5);

        let err = fetch_with_retry(
            &fetcher,
            &url(),
            None,
            &policy(1),
            Duration::from_secs(5),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(
            err,
            RetryError::Exhausted {
                attempts: 2,
                source: FetchError::Timeout
            }
        );
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let fetcher = MockFetcher::new();
        let err = fetch_with_retry(
            &fetcher,
            &url(),
            None,
            &policy(3),
            Duration::from_secs(5),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(
            err,
            RetryError::Exhausted {
                attempts: 1,
                source: FetchError::Status(404)
            }
        );
        assert_eq!(fetcher.hits(url().as_str()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_transient() {
        let fetcher = MockFetcher::new();
        fetcher.serve(url().as_str(), b"payload");
        fetcher.stall(url().as_str());

        let err = fetch_with_retry(
            &fetcher,
            &url(),
            None,
            &policy(1),
            Duration::from_millis(50),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(
            err,
            RetryError::Exhausted {
                attempts: 2,
                source: FetchError::Timeout
            }
        );
    }

    #[tokio::test]
    async fn test_range_cut_from_full_response() {
        let fetcher = MockFetcher::new();
        fetcher.serve(url().as_str(), b"0123456789");
        fetcher.ignore_ranges(url().as_str());

        let bytes = fetch_with_retry(
            &fetcher,
            &url(),
            Some(ByteRange::new(2, 5)),
            &policy(0),
            Duration::from_secs(5),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(&bytes[..], b"23456");
    }

    #[tokio::test]
    async fn test_short_range_response_not_retried() {
        let fetcher = MockFetcher::new();
        fetcher.serve(url().as_str(), b"0123");
        fetcher.ignore_ranges(url().as_str());

        let err = fetch_with_retry(
            &fetcher,
            &url(),
            Some(ByteRange::new(2, 5)),
            &policy(3),
            Duration::from_secs(5),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(
            err,
            RetryError::Exhausted {
                attempts: 1,
                source: FetchError::RangeMismatch {
                    expected: 5,
                    received: 4
                }
            }
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let fetcher = MockFetcher::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = fetch_with_retry(&fetcher, &url(), None, &policy(3), Duration::from_secs(5), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, RetryError::Cancelled);
        assert_eq!(fetcher.hits(url().as_str()), 0);
    }
}

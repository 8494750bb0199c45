//! Retry configuration and strategies.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::backoff::{Backoff, ConstantBackoff, ExponentialBackoff};

/// Wait time before a given retry.
pub trait Retriable: Send + Sync + fmt::Debug {
    /// Interval to wait after the attempt with this zero-based index fails.
    fn next_interval(&self, retry: u32) -> Duration;
}

impl<R: Retriable + ?Sized> Retriable for Arc<R> {
    fn next_interval(&self, retry: u32) -> Duration {
        (**self).next_interval(retry)
    }
}

/// Retriable backed by a [`Backoff`].
#[derive(Debug, Clone)]
pub struct Retrier<B> {
    backoff: B,
}

impl<B: Backoff> Retrier<B> {
    /// Create a retrier with some backoff strategy.
    pub fn new(backoff: B) -> Self {
        Self { backoff }
    }

    /// The backing backoff.
    pub fn backoff(&self) -> &B {
        &self.backoff
    }
}

impl<B: Backoff> Retriable for Retrier<B> {
    fn next_interval(&self, retry: u32) -> Duration {
        self.backoff.next(retry)
    }
}

/// Retriable that never waits.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRetrier;

impl Retriable for NoRetrier {
    fn next_interval(&self, _retry: u32) -> Duration {
        Duration::ZERO
    }
}

/// Adapts a plain function to [`Retriable`].
///
/// ```
/// use rampart_http_client::{Retriable, RetriableFn};
/// use std::time::Duration;
///
/// let linear = RetriableFn::new(|retry| Duration::from_millis(50 * u64::from(retry)));
/// assert_eq!(linear.next_interval(3), Duration::from_millis(150));
/// ```
#[derive(Clone)]
pub struct RetriableFn<F> {
    f: F,
}

impl<F> RetriableFn<F>
where
    F: Fn(u32) -> Duration + Send + Sync,
{
    /// Wrap a function.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> fmt::Debug for RetriableFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetriableFn").finish_non_exhaustive()
    }
}

impl<F> Retriable for RetriableFn<F>
where
    F: Fn(u32) -> Duration + Send + Sync,
{
    fn next_interval(&self, retry: u32) -> Duration {
        (self.f)(retry)
    }
}

/// Retry configuration: how many retries, and how long to wait between them.
///
/// Total attempts are `retry_count + 1`.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Number of retries after the initial attempt.
    pub retry_count: u32,
    /// Wait strategy between attempts.
    pub retrier: Arc<dyn Retriable>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryConfig {
    /// No retries.
    pub fn none() -> Self {
        Self {
            retry_count: 0,
            retrier: Arc::new(NoRetrier),
        }
    }

    /// Retry immediately, without waiting.
    pub fn immediate(retry_count: u32) -> Self {
        Self {
            retry_count,
            retrier: Arc::new(NoRetrier),
        }
    }

    /// Retry with a constant delay plus jitter.
    pub fn constant(retry_count: u32, interval: Duration, max_jitter: Duration) -> Self {
        Self::with_retrier(
            retry_count,
            Retrier::new(ConstantBackoff::new(interval, max_jitter)),
        )
    }

    /// Retry with exponential backoff plus jitter.
    pub fn exponential(
        retry_count: u32,
        initial: Duration,
        max: Duration,
        factor: f64,
        max_jitter: Duration,
    ) -> Self {
        Self::with_retrier(
            retry_count,
            Retrier::new(ExponentialBackoff::new(initial, max, factor, max_jitter)),
        )
    }

    /// Retry with a custom strategy.
    pub fn with_retrier(retry_count: u32, retrier: impl Retriable + 'static) -> Self {
        Self {
            retry_count,
            retrier: Arc::new(retrier),
        }
    }

    /// Total number of attempts, the initial one included.
    pub fn max_attempts(&self) -> u32 {
        self.retry_count.saturating_add(1)
    }

    /// Delay after the attempt with zero-based index `retry` fails.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        self.retrier.next_interval(retry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_retrier_never_waits() {
        for retry in [0, 1, 2, 100, u32::MAX] {
            assert_eq!(NoRetrier.next_interval(retry), Duration::ZERO);
        }
    }

    #[test]
    fn test_retrier_delegates_to_backoff() {
        let retrier =
            Retrier::new(ConstantBackoff::new(Duration::from_millis(100), Duration::ZERO));

        assert_eq!(retrier.next_interval(0), Duration::ZERO);
        assert_eq!(retrier.next_interval(1), Duration::from_millis(100));
    }

    #[test]
    fn test_retriable_fn() {
        let retrier = RetriableFn::new(|retry| Duration::from_millis(10 * u64::from(retry)));

        assert_eq!(retrier.next_interval(1), Duration::from_millis(10));
        assert_eq!(retrier.next_interval(4), Duration::from_millis(40));
        assert_eq!(format!("{retrier:?}"), "RetriableFn { .. }");
    }

    #[test]
    fn test_retry_config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.retry_count, 0);
        assert_eq!(config.max_attempts(), 1);
        assert_eq!(config.delay_for_retry(1), Duration::ZERO);
    }

    #[test]
    fn test_exponential_config() {
        let config = RetryConfig::exponential(
            3,
            Duration::from_millis(100),
            Duration::from_secs(1),
            2.0,
            Duration::ZERO,
        );

        assert_eq!(config.max_attempts(), 4);
        assert_eq!(config.delay_for_retry(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_retry(3), Duration::from_millis(800));
    }

    #[test]
    fn test_max_attempts_saturates() {
        assert_eq!(RetryConfig::immediate(u32::MAX).max_attempts(), u32::MAX);
    }
}

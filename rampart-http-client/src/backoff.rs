//! Backoff strategies with jitter.
//!
//! A backoff maps a retry number to the time to wait before that retry.
//! All arithmetic is done in whole milliseconds and converted to a
//! [`Duration`] only when returned. Retry `0` always yields zero.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Maps a retry number to a wait duration.
pub trait Backoff: Send + Sync + fmt::Debug {
    /// Wait duration before the given retry (0-based; `0` yields zero).
    fn next(&self, retry: u32) -> Duration;
}

impl<B: Backoff + ?Sized> Backoff for Arc<B> {
    fn next(&self, retry: u32) -> Duration {
        (**self).next(retry)
    }
}

/// Source of random jitter, injected into backoff values.
pub trait JitterSource: Send + Sync + fmt::Debug {
    /// Draw uniformly from `0..=ceiling` milliseconds.
    fn sample(&self, ceiling: u64) -> u64;
}

/// Jitter drawn from the thread-local generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn sample(&self, ceiling: u64) -> u64 {
        if ceiling == 0 {
            return 0;
        }
        rand::rng().random_range(0..=ceiling)
    }
}

/// Deterministic jitter from a seeded generator.
#[derive(Debug)]
pub struct SeededJitter {
    rng: Mutex<StdRng>,
}

impl SeededJitter {
    /// Create a jitter source with a fixed seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl JitterSource for SeededJitter {
    fn sample(&self, ceiling: u64) -> u64 {
        if ceiling == 0 {
            return 0;
        }
        self.rng.lock().random_range(0..=ceiling)
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn non_negative_millis(millis: i64) -> u64 {
    u64::try_from(millis).unwrap_or(0)
}

/// Constant interval plus jitter.
#[derive(Debug, Clone)]
pub struct ConstantBackoff {
    interval: u64,
    max_jitter: u64,
    jitter: Arc<dyn JitterSource>,
}

impl ConstantBackoff {
    /// Create a constant backoff. Jitter is drawn from `0..=max_jitter`.
    pub fn new(interval: Duration, max_jitter: Duration) -> Self {
        Self {
            interval: duration_millis(interval),
            max_jitter: duration_millis(max_jitter),
            jitter: Arc::new(ThreadRngJitter),
        }
    }

    /// Create from signed millisecond values; negatives are treated as zero.
    pub fn from_millis(interval: i64, max_jitter: i64) -> Self {
        Self::new(
            Duration::from_millis(non_negative_millis(interval)),
            Duration::from_millis(non_negative_millis(max_jitter)),
        )
    }

    /// Replace the jitter source.
    pub fn with_jitter_source(mut self, source: impl JitterSource + 'static) -> Self {
        self.jitter = Arc::new(source);
        self
    }
}

impl Backoff for ConstantBackoff {
    fn next(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let jitter = self.jitter.sample(self.max_jitter);
        Duration::from_millis(self.interval.saturating_add(jitter))
    }
}

/// Exponential backoff: `initial * factor^retry`, clamped to `[initial, max]`, plus jitter.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: u64,
    max: u64,
    factor: f64,
    max_jitter: u64,
    jitter: Arc<dyn JitterSource>,
}

impl ExponentialBackoff {
    /// Create an exponential backoff.
    ///
    /// A `max` below `initial` is raised to `initial`.
    pub fn new(initial: Duration, max: Duration, factor: f64, max_jitter: Duration) -> Self {
        let initial = duration_millis(initial);
        Self {
            initial,
            max: duration_millis(max).max(initial),
            factor,
            max_jitter: duration_millis(max_jitter),
            jitter: Arc::new(ThreadRngJitter),
        }
    }

    /// Create from signed millisecond values; negatives are treated as zero.
    pub fn from_millis(initial: i64, max: i64, factor: f64, max_jitter: i64) -> Self {
        Self::new(
            Duration::from_millis(non_negative_millis(initial)),
            Duration::from_millis(non_negative_millis(max)),
            factor,
            Duration::from_millis(non_negative_millis(max_jitter)),
        )
    }

    /// Replace the jitter source.
    pub fn with_jitter_source(mut self, source: impl JitterSource + 'static) -> Self {
        self.jitter = Arc::new(source);
        self
    }

    fn base_millis(&self, retry: u32) -> u64 {
        let initial = self.initial as f64;
        let max = self.max as f64;
        let raw = initial * self.factor.powf(f64::from(retry));
        let clamped = if raw.is_nan() {
            initial
        } else {
            raw.clamp(initial, max)
        };
        clamped.floor() as u64
    }
}

impl Backoff for ExponentialBackoff {
    fn next(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let jitter = self.jitter.sample(self.max_jitter);
        Duration::from_millis(self.base_millis(retry).saturating_add(jitter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: u32 = 10_000;

    #[test]
    fn test_exponential_backoff() {
        let backoff = ExponentialBackoff::new(
            Duration::from_millis(100),
            Duration::from_millis(1000),
            2.0,
            Duration::ZERO,
        );

        assert_eq!(backoff.next(0), Duration::ZERO);
        assert_eq!(backoff.next(1), Duration::from_millis(200));
        assert_eq!(backoff.next(2), Duration::from_millis(400));
        assert_eq!(backoff.next(3), Duration::from_millis(800));
    }

    #[test]
    fn test_exponential_backoff_clamped_to_max() {
        let backoff = ExponentialBackoff::new(
            Duration::from_millis(100),
            Duration::from_millis(1000),
            2.0,
            Duration::ZERO,
        );
        assert_eq!(backoff.next(4), Duration::from_millis(1000));
        assert_eq!(backoff.next(u32::MAX), Duration::from_millis(1000));

        let backoff = ExponentialBackoff::new(
            Duration::from_millis(100),
            Duration::from_millis(1600),
            2.0,
            Duration::ZERO,
        );
        assert_eq!(backoff.next(4), Duration::from_millis(1600));
    }

    #[test]
    fn test_exponential_backoff_clamped_to_initial() {
        let backoff = ExponentialBackoff::new(
            Duration::from_millis(100),
            Duration::from_millis(1000),
            0.5,
            Duration::ZERO,
        );
        assert_eq!(backoff.next(3), Duration::from_millis(100));
    }

    #[test]
    fn test_exponential_backoff_non_decreasing() {
        let backoff = ExponentialBackoff::new(
            Duration::from_millis(10),
            Duration::from_millis(5000),
            1.5,
            Duration::ZERO,
        );

        let mut previous = backoff.next(1);
        for retry in 2..40 {
            let current = backoff.next(retry);
            assert!(current >= previous);
            assert!(current >= Duration::from_millis(10));
            assert!(current <= Duration::from_millis(5000));
            previous = current;
        }
    }

    #[test]
    fn test_exponential_max_below_initial() {
        let backoff = ExponentialBackoff::new(
            Duration::from_millis(300),
            Duration::from_millis(100),
            2.0,
            Duration::ZERO,
        );
        assert_eq!(backoff.next(5), Duration::from_millis(300));
    }

    #[test]
    fn test_exponential_negative_jitter_is_zero() {
        let backoff = ExponentialBackoff::from_millis(100, 1000, 2.0, -1);
        assert_eq!(backoff.next(1), Duration::from_millis(200));
        assert_eq!(backoff.next(2), Duration::from_millis(400));
        assert_eq!(backoff.next(3), Duration::from_millis(800));
    }

    #[test]
    fn test_exponential_jitter_bounds() {
        let backoff = ExponentialBackoff::new(
            Duration::from_millis(100),
            Duration::from_millis(1000),
            2.0,
            Duration::from_millis(50),
        );

        for _ in 0..SAMPLES {
            let next = backoff.next(1);
            assert!(next >= Duration::from_millis(200));
            assert!(next <= Duration::from_millis(250));
        }
    }

    #[test]
    fn test_constant_backoff() {
        let backoff = ConstantBackoff::new(Duration::from_millis(100), Duration::ZERO);

        assert_eq!(backoff.next(0), Duration::ZERO);
        assert_eq!(backoff.next(1), Duration::from_millis(100));
        assert_eq!(backoff.next(2), Duration::from_millis(100));
        assert_eq!(backoff.next(5), Duration::from_millis(100));
    }

    #[test]
    fn test_constant_negative_jitter_is_zero() {
        let backoff = ConstantBackoff::from_millis(100, -1);
        for retry in 1..100 {
            assert_eq!(backoff.next(retry), Duration::from_millis(100));
        }
    }

    #[test]
    fn test_constant_jitter_bounds() {
        let backoff = ConstantBackoff::new(Duration::from_millis(100), Duration::from_millis(50));

        for retry in 1..=SAMPLES {
            let next = backoff.next(retry);
            assert!(next >= Duration::from_millis(100));
            assert!(next <= Duration::from_millis(150));
        }
    }

    #[test]
    fn test_constant_jitter_of_one_millisecond() {
        let backoff = ConstantBackoff::new(Duration::from_millis(100), Duration::from_millis(1));

        let mut seen = [false; 2];
        for retry in 1..=SAMPLES {
            let extra = backoff.next(retry).as_millis() - 100;
            assert!(extra <= 1);
            seen[extra as usize] = true;
        }
        assert_eq!(seen, [true, true]);
    }

    #[test]
    fn test_seeded_jitter_is_deterministic() {
        let a = ConstantBackoff::new(Duration::from_millis(10), Duration::from_millis(1000))
            .with_jitter_source(SeededJitter::new(7));
        let b = ConstantBackoff::new(Duration::from_millis(10), Duration::from_millis(1000))
            .with_jitter_source(SeededJitter::new(7));

        for retry in 1..50 {
            assert_eq!(a.next(retry), b.next(retry));
        }
    }

    #[derive(Debug)]
    struct CeilingJitter;

    impl JitterSource for CeilingJitter {
        fn sample(&self, ceiling: u64) -> u64 {
            ceiling
        }
    }

    #[test]
    fn test_jitter_added_after_clamp() {
        let backoff = ExponentialBackoff::new(
            Duration::from_millis(100),
            Duration::from_millis(1000),
            2.0,
            Duration::from_millis(30),
        )
        .with_jitter_source(CeilingJitter);

        assert_eq!(backoff.next(10), Duration::from_millis(1030));
        assert_eq!(backoff.next(0), Duration::ZERO);
    }
}

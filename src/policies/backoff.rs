//! # Retry delay after a failed receive.
//!
//! [`BackoffPolicy`] decides how long a poller sleeps after consecutive receive
//! failures. The delay for failure `n` (0-indexed) is `first × factor^n`,
//! clamped to `max`, then jittered. The base is derived from `n` alone, so
//! jitter never feeds back into later delays, except for
//! [`JitterPolicy::Decorrelated`], which draws from `[first, prev × 3]` where
//! `prev` is the delay actually slept after the previous failure.
//!
//! [`BackoffPolicy::immediate`] (the default) retries without sleeping.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use queuecast::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(100),
//!     max: Duration::from_secs(10),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0, Duration::ZERO), Duration::from_millis(100));
//! assert_eq!(backoff.next(1, Duration::from_millis(100)), Duration::from_millis(200));
//! // 100ms × 2^10 = 102.4s → capped at 10s
//! assert_eq!(backoff.next(10, Duration::from_secs(10)), Duration::from_secs(10));
//!
//! assert_eq!(BackoffPolicy::immediate().next(7, Duration::ZERO), Duration::ZERO);
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Receive retry backoff policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first failure (`0` = retry immediately).
    pub first: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
    /// Randomization applied to the clamped delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::immediate()
    }
}

impl BackoffPolicy {
    /// Retry with no delay at all.
    pub const fn immediate() -> Self {
        Self {
            first: Duration::ZERO,
            max: Duration::ZERO,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Returns `true` if every delay produced by this policy is zero.
    pub fn is_immediate(&self) -> bool {
        self.first.is_zero() || self.max.is_zero()
    }

    /// Computes the delay after `failures` consecutive failures (0-indexed).
    ///
    /// `prev` is the delay returned for the previous failure of the same run
    /// (`Duration::ZERO` for the first one). Only `Decorrelated` jitter reads it.
    ///
    /// # Notes
    /// - `factor == 1.0` keeps the delay constant at `first` (up to `max`).
    /// - Non-finite or negative intermediate results clamp to `max`.
    pub fn next(&self, failures: u32, prev: Duration) -> Duration {
        if self.is_immediate() {
            return Duration::ZERO;
        }

        let max_secs = self.max.as_secs_f64();
        let exp = failures.min(i32::MAX as u32) as i32;
        let unclamped = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !unclamped.is_finite() || unclamped < 0.0 || unclamped > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(unclamped)
        };

        match self.jitter {
            JitterPolicy::Decorrelated => {
                let floor = self.first.min(self.max);
                let prev = if prev.is_zero() { floor } else { prev };
                self.jitter.apply_decorrelated(floor, prev, self.max)
            }
            _ => self.jitter.apply(base),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exp(first_ms: u64, max_ms: u64, factor: f64, jitter: JitterPolicy) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(first_ms),
            max: Duration::from_millis(max_ms),
            factor,
            jitter,
        }
    }

    #[test]
    fn default_is_immediate() {
        let policy = BackoffPolicy::default();
        assert!(policy.is_immediate());
        for failures in [0, 1, 50, u32::MAX] {
            assert_eq!(policy.next(failures, Duration::ZERO), Duration::ZERO);
        }
    }

    #[test]
    fn exponential_growth_without_jitter() {
        let policy = exp(100, 30_000, 2.0, JitterPolicy::None);
        assert_eq!(policy.next(0, Duration::ZERO), Duration::from_millis(100));
        assert_eq!(policy.next(1, Duration::ZERO), Duration::from_millis(200));
        assert_eq!(policy.next(2, Duration::ZERO), Duration::from_millis(400));
        assert_eq!(policy.next(3, Duration::ZERO), Duration::from_millis(800));
    }

    #[test]
    fn constant_factor_stays_at_first() {
        let policy = exp(500, 30_000, 1.0, JitterPolicy::None);
        for failures in 0..10 {
            assert_eq!(
                policy.next(failures, Duration::ZERO),
                Duration::from_millis(500)
            );
        }
    }

    #[test]
    fn clamps_to_max() {
        let policy = exp(100, 1_000, 2.0, JitterPolicy::None);
        assert_eq!(policy.next(10, Duration::ZERO), Duration::from_secs(1));
        assert_eq!(policy.next(u32::MAX, Duration::ZERO), Duration::from_secs(1));
    }

    #[test]
    fn first_above_max_is_capped() {
        let policy = exp(10_000, 5_000, 2.0, JitterPolicy::None);
        assert_eq!(policy.next(0, Duration::ZERO), Duration::from_secs(5));
    }

    #[test]
    fn full_jitter_never_exceeds_base() {
        let policy = exp(100, 30_000, 2.0, JitterPolicy::Full);
        for failures in 0..15 {
            let base_ms = (100.0 * 2.0f64.powi(failures as i32)).min(30_000.0);
            let delay = policy.next(failures, Duration::ZERO);
            assert!(delay <= Duration::from_millis(base_ms as u64));
        }
    }

    #[test]
    fn equal_jitter_stays_in_upper_half() {
        let policy = exp(1_000, 30_000, 1.0, JitterPolicy::Equal);
        for failures in 0..50 {
            let delay = policy.next(failures, Duration::ZERO);
            assert!(delay >= Duration::from_millis(500), "{delay:?} below half");
            assert!(delay <= Duration::from_millis(1_000), "{delay:?} above base");
        }
    }

    #[test]
    fn decorrelated_jitter_respects_floor_and_cap() {
        let policy = exp(100, 30_000, 2.0, JitterPolicy::Decorrelated);
        for _ in 0..100 {
            let delay = policy.next(8, Duration::from_secs(20));
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_secs(30));
        }
    }

    #[test]
    fn decorrelated_first_delay_starts_from_first() {
        let policy = exp(100, 30_000, 2.0, JitterPolicy::Decorrelated);
        for _ in 0..100 {
            let delay = policy.next(0, Duration::ZERO);
            assert!(delay >= Duration::from_millis(100), "{delay:?}");
            assert!(delay <= Duration::from_millis(300), "{delay:?}");
        }
    }

    #[test]
    fn decorrelated_range_grows_with_previous_delay() {
        // failures=0 keeps the exponential base at 100ms; only `prev` can widen the range.
        let policy = exp(100, 30_000, 2.0, JitterPolicy::Decorrelated);
        let delays: Vec<Duration> = (0..200)
            .map(|_| policy.next(0, Duration::from_secs(10)))
            .collect();
        assert!(delays.iter().all(|d| *d >= Duration::from_millis(100)));
        assert!(delays.iter().all(|d| *d <= Duration::from_secs(30)));
        assert!(
            delays.iter().any(|d| *d > Duration::from_secs(1)),
            "previous delay did not widen the range"
        );
    }

    #[test]
    fn previous_delay_is_ignored_without_decorrelated_jitter() {
        let policy = exp(100, 30_000, 2.0, JitterPolicy::None);
        assert_eq!(
            policy.next(1, Duration::from_secs(25)),
            Duration::from_millis(200)
        );
    }
}

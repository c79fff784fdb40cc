//! # Jitter for receive retry delays.
//!
//! When many pollers fail at once (queue endpoint unreachable) identical
//! delays make them retry in lock-step. [`JitterPolicy`] spreads them out:
//!
//! - [`JitterPolicy::None`]: exact delay
//! - [`JitterPolicy::Full`]: random in `[0, delay]`
//! - [`JitterPolicy::Equal`]: `delay/2 + random[0, delay/2]`
//! - [`JitterPolicy::Decorrelated`]: random in `[base, prev × 3]`, capped at max

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

/// Randomization strategy applied to a retry delay.
///
/// Deserializes from lowercase names: `none`, `full`, `equal`, `decorrelated`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JitterPolicy {
    /// Use the delay as computed.
    #[default]
    None,
    /// Random delay in `[0, delay]`.
    Full,
    /// Half the delay plus a random share of the other half.
    Equal,
    /// Random delay in `[base, prev × 3]`, capped at max.
    Decorrelated,
}

impl JitterPolicy {
    /// Applies jitter to `delay`.
    ///
    /// `Decorrelated` needs more context and returns `delay` unchanged here;
    /// use [`apply_decorrelated`](Self::apply_decorrelated).
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            JitterPolicy::None | JitterPolicy::Decorrelated => delay,
            JitterPolicy::Full => Self::full(delay),
            JitterPolicy::Equal => Self::equal(delay),
        }
    }

    /// Decorrelated jitter with its full context; other policies fall back to `apply(prev)`.
    pub fn apply_decorrelated(&self, base: Duration, prev: Duration, max: Duration) -> Duration {
        if !matches!(self, JitterPolicy::Decorrelated) {
            return self.apply(prev);
        }

        let base_ms = base.as_millis() as u64;
        let upper = (prev.as_millis() as u64)
            .saturating_mul(3)
            .min(max.as_millis() as u64)
            .max(base_ms);

        if base_ms >= upper {
            return base;
        }
        Duration::from_millis(rand::rng().random_range(base_ms..=upper))
    }

    fn full(delay: Duration) -> Duration {
        let ms = delay.as_millis() as u64;
        if ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=ms))
    }

    fn equal(delay: Duration) -> Duration {
        let ms = delay.as_millis() as u64;
        let half = ms / 2;
        if half == 0 {
            return delay;
        }
        Duration::from_millis(half + rand::rng().random_range(0..=half))
    }
}

//! # Jitter for idle waits.
//!
//! Actor workers that went idle together would otherwise poll their queues on the
//! same ticks. [`JitterPolicy::Spread`] shortens each idle wait by a random amount,
//! never lengthening it, so the backoff cap stays a hard bound on how long a
//! worker sleeps between cancellation checks.
//!
//! ```text
//! None   → delay
//! Spread → random in [delay/2, delay]   (microsecond resolution)
//! ```

use std::time::Duration;

use rand::Rng;

/// Randomization of idle waits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// Exact backoff delay; deterministic under a paused clock.
    #[default]
    None,

    /// Wait somewhere between half the delay and the full delay.
    Spread,
}

impl JitterPolicy {
    /// Applies the policy to one idle wait. The result never exceeds `delay`.
    pub fn apply(self, delay: Duration) -> Duration {
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Spread => {
                let micros = u64::try_from(delay.as_micros()).unwrap_or(u64::MAX);
                if micros < 2 {
                    return delay;
                }
                let shave = rand::rng().random_range(0..=micros / 2);
                delay.saturating_sub(Duration::from_micros(shave))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_exact() {
        let d = Duration::from_millis(7);
        assert_eq!(JitterPolicy::None.apply(d), d);
    }

    #[test]
    fn spread_stays_between_half_and_full_delay() {
        let d = Duration::from_millis(20);
        for _ in 0..200 {
            let j = JitterPolicy::Spread.apply(d);
            assert!(j >= Duration::from_millis(10) && j <= d, "{j:?}");
        }
    }

    #[test]
    fn spread_leaves_tiny_delays_alone() {
        assert_eq!(JitterPolicy::Spread.apply(Duration::ZERO), Duration::ZERO);
        assert_eq!(JitterPolicy::Spread.apply(Duration::from_micros(1)), Duration::from_micros(1));
    }
}

//! # Idle backoff for actor workers.
//!
//! An actor worker polls its queue without blocking. While the queue stays empty it
//! waits (cancellably, and also woken by the next enqueue) for a delay taken from
//! [`BackoffPolicy`], which grows with the number of consecutive empty polls:
//! - [`BackoffPolicy::first`] delay after the first empty poll;
//! - [`BackoffPolicy::factor`] multiplicative growth per further empty poll;
//! - [`BackoffPolicy::max`] cap, which bounds how long a worker can sleep between
//!   checks of its cancellation token.
//!
//! The delay for poll `n` is `first × factor^n`, clamped to `max`, then jittered.
//! Jitter output never feeds back into later delays.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use hsmstage::{BackoffPolicy, JitterPolicy};
//!
//! let idle = BackoffPolicy {
//!     first: Duration::from_millis(1),
//!     max: Duration::from_millis(20),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(idle.next(0), Duration::from_millis(1));
//! assert_eq!(idle.next(3), Duration::from_millis(8));
//! assert_eq!(idle.next(10), Duration::from_millis(20));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Idle poll backoff for actor workers.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Wait after the first empty poll.
    pub first: Duration,
    /// Upper bound on any single idle wait.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
    /// Randomization applied to each wait.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Returns a policy with:
    /// - `first = 1ms`;
    /// - `factor = 2.0`;
    /// - `max = 20ms`.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(1),
            max: Duration::from_millis(20),
            jitter: JitterPolicy::None,
            factor: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Computes the wait after `idle_polls` consecutive empty polls (0-indexed).
    ///
    /// The base is `first × factor^idle_polls`, clamped to [`BackoffPolicy::max`].
    pub fn next(&self, idle_polls: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let clamped_exp = idle_polls.min(i32::MAX as u32) as i32;
        let unclamped_secs = self.first.as_secs_f64() * self.factor.powi(clamped_exp);

        let base =
            if !unclamped_secs.is_finite() || unclamped_secs < 0.0 || unclamped_secs > max_secs {
                self.max
            } else {
                Duration::from_secs_f64(unclamped_secs)
            };

        self.jitter.apply(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn idle(factor: f64, jitter: JitterPolicy) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(1),
            max: Duration::from_millis(20),
            factor,
            jitter,
        }
    }

    #[test]
    fn default_is_short_and_bounded() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.next(0), Duration::from_millis(1));
        assert_eq!(policy.next(50), Duration::from_millis(20));
    }

    #[test]
    fn test_exponential_growth_no_jitter() {
        let policy = idle(2.0, JitterPolicy::None);
        assert_eq!(policy.next(0), Duration::from_millis(1));
        assert_eq!(policy.next(1), Duration::from_millis(2));
        assert_eq!(policy.next(2), Duration::from_millis(4));
        assert_eq!(policy.next(4), Duration::from_millis(16));
        assert_eq!(policy.next(5), Duration::from_millis(20));
    }

    #[test]
    fn test_constant_factor() {
        let policy = idle(1.0, JitterPolicy::None);
        for n in 0..10 {
            assert_eq!(policy.next(n), Duration::from_millis(1), "poll {n}");
        }
    }

    #[test]
    fn test_first_exceeds_max() {
        let policy = BackoffPolicy {
            first: Duration::from_millis(50),
            max: Duration::from_millis(5),
            factor: 2.0,
            jitter: JitterPolicy::None,
        };
        assert_eq!(policy.next(0), Duration::from_millis(5));
    }

    #[test]
    fn test_spread_never_exceeds_max() {
        let policy = idle(2.0, JitterPolicy::Spread);
        for n in 0..40 {
            assert!(policy.next(n) <= Duration::from_millis(20), "poll {n}");
        }
    }

    #[test]
    fn test_non_finite_overflow_clamps_to_max() {
        let policy = idle(2.0, JitterPolicy::None);
        assert_eq!(policy.next(u32::MAX), Duration::from_millis(20));
    }
}

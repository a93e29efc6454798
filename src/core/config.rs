//! # Stage configuration.
//!
//! Provides [`StageConfig`], the settings shared by the stage loop, every actor
//! worker and every machine mounted on the stage.
//!
//! ## Sentinel values
//! - `grace = 0s` → do not wait for actors on shutdown, report stragglers immediately
//! - `bus_capacity = 0` → clamped to 1 by the report bus

use std::time::Duration;

use crate::policies::{BackoffPolicy, FaultPolicy, MissingFieldPolicy};

/// Configuration for one [`Stage`](crate::Stage).
///
/// ## Field semantics
/// - `grace`: maximum wait for actor workers to stop after shutdown is requested
/// - `bus_capacity`: report bus ring buffer size (min 1)
/// - `idle`: backoff between polls of an empty actor queue
/// - `fault`: actor reaction to a failed dispatch
/// - `missing_field`: meaning of a guard that touched an undefined payload field
/// - `strict_initial`: reject states with children but no initial designation
///
/// ## Notes
/// All fields are public. Prefer the helper accessors over sentinel checks.
#[derive(Clone, Debug)]
pub struct StageConfig {
    /// Maximum time to wait for actor workers after shutdown is requested.
    ///
    /// Workers still running after `grace` are listed in
    /// `RuntimeError::GraceExceeded`.
    pub grace: Duration,

    /// Capacity of the report bus broadcast ring buffer.
    ///
    /// Observers lagging more than `bus_capacity` reports skip older ones.
    pub bus_capacity: usize,

    /// Idle poll backoff for actor workers.
    pub idle: BackoffPolicy,

    /// What an actor does when dispatching an event fails.
    pub fault: FaultPolicy,

    /// How guard verdicts for undefined payload fields are interpreted.
    pub missing_field: MissingFieldPolicy,

    /// When `true`, a state with children must flag one as initial or have a child
    /// named `Init`; otherwise the first registered child is used.
    pub strict_initial: bool,
}

impl StageConfig {
    /// Returns the bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the shutdown grace as an `Option`.
    ///
    /// - `None` → no wait
    /// - `Some(d)` → wait up to `d`
    #[inline]
    pub fn shutdown_grace(&self) -> Option<Duration> {
        if self.grace == Duration::ZERO {
            None
        } else {
            Some(self.grace)
        }
    }
}

impl Default for StageConfig {
    /// Default configuration:
    ///
    /// - `grace = 5s`
    /// - `bus_capacity = 1024`
    /// - `idle = BackoffPolicy::default()` (1ms doubling to 20ms)
    /// - `fault = FaultPolicy::Isolate`
    /// - `missing_field = MissingFieldPolicy::NoMatch`
    /// - `strict_initial = false`
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(5),
            bus_capacity: 1024,
            idle: BackoffPolicy::default(),
            fault: FaultPolicy::default(),
            missing_field: MissingFieldPolicy::default(),
            strict_initial: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_interpreted() {
        let cfg = StageConfig {
            grace: Duration::ZERO,
            bus_capacity: 0,
            ..StageConfig::default()
        };
        assert_eq!(cfg.shutdown_grace(), None);
        assert_eq!(cfg.bus_capacity_clamped(), 1);
        assert_eq!(StageConfig::default().shutdown_grace(), Some(Duration::from_secs(5)));
    }
}

//! # Runtime reports.
//!
//! A [`Report`] describes one thing the runtime did: a state was entered, a timer
//! fired, an event went unhandled, a dispatch failed, shutdown began. Reports are
//! informational; nothing in the runtime depends on them being delivered.
//!
//! ## Ordering guarantees
//! Every report carries a global monotonically increasing `seq`. Reports published
//! by one actor are sent in the order the actor produced them.
//!
//! ## Example
//! ```rust
//! use hsmstage::{Report, ReportKind};
//!
//! let r = Report::new(ReportKind::StateEntered)
//!     .with_actor("Door")
//!     .with_machine("Main")
//!     .with_state("Main.Closed");
//!
//! assert_eq!(r.kind, ReportKind::StateEntered);
//! assert_eq!(r.state.as_deref(), Some("Main.Closed"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

static REPORT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    // === Stage ===
    /// Actor was set up and its subscriptions registered.
    ///
    /// Sets: `actor`
    ActorMounted,

    /// Shutdown requested (OS signal, cancellation or an aborting actor).
    ShutdownRequested,

    /// All actor workers stopped within the grace period.
    AllStoppedWithin,

    /// Grace period exceeded; `reason` lists the stuck actors.
    GraceExceeded,

    // === State machines ===
    /// State entered.
    ///
    /// Sets: `actor`, `machine`, `state` (dotted path from the machine root)
    StateEntered,

    /// State exited.
    ///
    /// Sets: `actor`, `machine`, `state`
    StateExited,

    /// No machine of the actor handled an event.
    ///
    /// Sets: `actor`, `event`
    EventUnhandled,

    /// Dispatch failed; under `FaultPolicy::Isolate` the actor keeps running.
    ///
    /// Sets: `actor`, `event`, `reason`
    DispatchFailed,

    // === Timers ===
    /// Sets: `actor`, `machine`, `state`, `timer`
    TimerStarted,

    /// Sets: `actor`, `machine`, `state`, `timer`
    TimerStopped,

    /// Timer expired and its event was injected.
    ///
    /// Sets: `actor`, `machine`, `timer`, `event`
    TimerFired,

    // === Observers ===
    /// Report dropped for an observer (queue full or closed).
    ///
    /// Sets: `observer`, `reason`
    ObserverOverflow,

    /// Observer panicked while handling a report.
    ///
    /// Sets: `observer`, `reason`
    ObserverPanicked,
}

/// Runtime report with optional metadata.
#[derive(Clone, Debug)]
pub struct Report {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    pub kind: ReportKind,
    pub actor: Option<Arc<str>>,
    pub machine: Option<Arc<str>>,
    /// Dotted state path from the machine root.
    pub state: Option<Arc<str>>,
    pub timer: Option<Arc<str>>,
    /// Destination address of the event involved.
    pub event: Option<Arc<str>>,
    /// Observer name for observer reports.
    pub observer: Option<&'static str>,
    /// Human-readable reason (errors, overflow details, stuck actors).
    pub reason: Option<Arc<str>>,
}

impl Report {
    /// Creates a report of `kind` with the current timestamp and next sequence number.
    pub fn new(kind: ReportKind) -> Self {
        Self {
            seq: REPORT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            actor: None,
            machine: None,
            state: None,
            timer: None,
            event: None,
            observer: None,
            reason: None,
        }
    }

    #[inline]
    pub fn with_actor(mut self, actor: impl Into<Arc<str>>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    #[inline]
    pub fn with_machine(mut self, machine: impl Into<Arc<str>>) -> Self {
        self.machine = Some(machine.into());
        self
    }

    #[inline]
    pub fn with_state(mut self, state: impl Into<Arc<str>>) -> Self {
        self.state = Some(state.into());
        self
    }

    #[inline]
    pub fn with_timer(mut self, timer: impl Into<Arc<str>>) -> Self {
        self.timer = Some(timer.into());
        self
    }

    #[inline]
    pub fn with_event(mut self, event: impl Into<Arc<str>>) -> Self {
        self.event = Some(event.into());
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates an observer overflow report.
    pub fn observer_overflow(observer: &'static str, reason: &'static str) -> Self {
        let mut r = Report::new(ReportKind::ObserverOverflow).with_reason(reason);
        r.observer = Some(observer);
        r
    }

    /// Creates an observer panic report.
    pub fn observer_panicked(observer: &'static str, info: String) -> Self {
        let mut r = Report::new(ReportKind::ObserverPanicked).with_reason(info);
        r.observer = Some(observer);
        r
    }

    #[inline]
    pub fn is_observer_overflow(&self) -> bool {
        matches!(self.kind, ReportKind::ObserverOverflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = Report::new(ReportKind::ActorMounted);
        let b = Report::new(ReportKind::ActorMounted);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn observer_reports_carry_name_and_reason() {
        let r = Report::observer_overflow("tracker", "full");
        assert!(r.is_observer_overflow());
        assert_eq!(r.observer, Some("tracker"));
        assert_eq!(r.reason.as_deref(), Some("full"));
    }
}

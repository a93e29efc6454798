//! # LogWriter: reports rendered through `tracing`.
//!
//! ```text
//! INFO  actor mounted               actor=Door
//! DEBUG state entered               actor=Door machine=Main state=Main.Closed
//! DEBUG timer fired                 actor=Door machine=Main timer=Tick event=Lab.Door.Main.Tick
//! WARN  event unhandled             actor=Door event=Lab.Door.Main.Kick
//! ERROR dispatch failed             actor=Door event=... reason="state 'X' not found ..."
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, trace, warn};

use super::observer::Observe;
use super::report::{Report, ReportKind};

/// Report writer observer.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Observe for LogWriter {
    async fn on_report(&self, r: &Report) {
        let actor = r.actor.as_deref().unwrap_or("-");
        let machine = r.machine.as_deref().unwrap_or("-");
        let state = r.state.as_deref().unwrap_or("-");
        let timer = r.timer.as_deref().unwrap_or("-");
        let event = r.event.as_deref().unwrap_or("-");
        let reason = r.reason.as_deref().unwrap_or("-");

        match r.kind {
            ReportKind::ActorMounted => info!(seq = r.seq, actor, "actor mounted"),
            ReportKind::ShutdownRequested => info!(seq = r.seq, "shutdown requested"),
            ReportKind::AllStoppedWithin => info!(seq = r.seq, "all actors stopped within grace"),
            ReportKind::GraceExceeded => warn!(seq = r.seq, stuck = reason, "grace exceeded"),
            ReportKind::StateEntered => debug!(seq = r.seq, actor, machine, state, "state entered"),
            ReportKind::StateExited => debug!(seq = r.seq, actor, machine, state, "state exited"),
            ReportKind::EventUnhandled => warn!(seq = r.seq, actor, event, "event unhandled"),
            ReportKind::DispatchFailed => {
                error!(seq = r.seq, actor, event, reason, "dispatch failed")
            }
            ReportKind::TimerStarted => {
                trace!(seq = r.seq, actor, machine, state, timer, "timer started")
            }
            ReportKind::TimerStopped => {
                trace!(seq = r.seq, actor, machine, state, timer, "timer stopped")
            }
            ReportKind::TimerFired => {
                debug!(seq = r.seq, actor, machine, timer, event, "timer fired")
            }
            ReportKind::ObserverOverflow => warn!(
                seq = r.seq,
                observer = r.observer.unwrap_or("unknown"),
                reason,
                "observer dropped report"
            ),
            ReportKind::ObserverPanicked => error!(
                seq = r.seq,
                observer = r.observer.unwrap_or("unknown"),
                reason,
                "observer panicked"
            ),
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}

//! # State-owned timers.
//!
//! A timer belongs to one state. Starting it resolves its parameters (explicit
//! override, else the declared default; the event name falls back to the timer
//! name) and spawns a wait on the tokio runtime. On expiry the timer injects its
//! event into the stage queue exactly like `Context::signal` would.
//!
//! ```text
//! start ──► spawn ──► select! { token.cancelled() ─► exit
//!                               tick             ─► lock gate
//!                                                   ├─ cancelled? ─► exit
//!                                                   └─ enqueue event, report TimerFired
//!                                                      (periodic: loop, one-shot: exit) }
//! stop  ──► lock gate ─► token.cancel()
//! ```
//!
//! The gate makes `stop` atomic with respect to a firing: once `stop` returns no
//! further event from that run reaches the stage.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::address::{Address, Scope};
use crate::core::StageHandle;
use crate::error::TimerError;
use crate::event::{Event, Payload};
use crate::observe::{Report, ReportKind};

use super::spec::{TimerSpec, TimerStart};

/// Parameters of one run.
#[derive(Clone, Debug)]
struct Resolved {
    interval: Duration,
    periodic: bool,
    event: Address,
    payload: Payload,
}

struct Running {
    token: CancellationToken,
    gate: Arc<Mutex<()>>,
}

impl Running {
    fn cancel(&self) {
        let _gate = self.gate.lock().unwrap_or_else(|e| e.into_inner());
        self.token.cancel();
    }
}

pub(crate) struct Timer {
    spec: TimerSpec,
    last: Option<Resolved>,
    running: Option<Running>,
}

impl Timer {
    pub(crate) fn new(spec: TimerSpec) -> Self {
        Self {
            spec,
            last: None,
            running: None,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.spec.name
    }

    pub(crate) fn autostart(&self) -> bool {
        self.spec.autostart
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        self.running.is_some()
    }

    fn resolve(
        &self,
        start: TimerStart,
        scope: &Scope,
        state: &str,
    ) -> Result<Resolved, TimerError> {
        let interval = start
            .interval
            .or(self.spec.interval)
            .ok_or_else(|| TimerError::NoInterval {
                timer: self.spec.name.clone(),
                state: state.to_string(),
            })?;
        if interval.is_zero() {
            return Err(TimerError::ZeroInterval {
                timer: self.spec.name.clone(),
                state: state.to_string(),
            });
        }
        let name = start
            .event
            .as_deref()
            .or(self.spec.event.as_deref())
            .unwrap_or(&self.spec.name);
        let event = scope.resolve(name).map_err(|source| TimerError::BadEvent {
            timer: self.spec.name.clone(),
            source,
        })?;

        Ok(Resolved {
            interval,
            periodic: start.periodic.unwrap_or(self.spec.periodic),
            event,
            payload: start.payload.unwrap_or_else(|| self.spec.payload.clone()),
        })
    }

    /// Resolves parameters and (re)starts the timer. A running timer is stopped first.
    pub(crate) fn start(
        &mut self,
        start: TimerStart,
        scope: &Scope,
        state: &str,
        stage: &StageHandle,
    ) -> Result<(), TimerError> {
        let resolved = self.resolve(start, scope, state)?;
        self.launch(resolved, scope, state, stage);
        Ok(())
    }

    /// Stop, then start again with the last resolved parameters (or the defaults
    /// if the timer never ran).
    pub(crate) fn restart(
        &mut self,
        scope: &Scope,
        state: &str,
        stage: &StageHandle,
    ) -> Result<(), TimerError> {
        self.stop(scope, state, stage);
        let resolved = match self.last.clone() {
            Some(last) => last,
            None => self.resolve(TimerStart::default(), scope, state)?,
        };
        self.launch(resolved, scope, state, stage);
        Ok(())
    }

    /// Cancels the pending wait. Idempotent.
    pub(crate) fn stop(&mut self, scope: &Scope, state: &str, stage: &StageHandle) {
        if let Some(running) = self.running.take() {
            running.cancel();
            trace!(timer = %self.spec.name, state, "timer stopped");
            stage.report(self.report(ReportKind::TimerStopped, scope).with_state(state));
        }
    }

    fn report(&self, kind: ReportKind, scope: &Scope) -> Report {
        Report::new(kind)
            .with_actor(scope.actor())
            .with_machine(scope.machine())
            .with_timer(self.spec.name.as_str())
    }

    fn launch(&mut self, resolved: Resolved, scope: &Scope, state: &str, stage: &StageHandle) {
        if let Some(running) = self.running.take() {
            running.cancel();
        }

        let token = stage.runtime_token().child_token();
        let gate = Arc::new(Mutex::new(()));
        let origin = scope.origin();
        let actor: Arc<str> = Arc::from(scope.actor());
        let machine: Arc<str> = Arc::from(scope.machine());
        let timer: Arc<str> = Arc::from(self.spec.name.as_str());

        let task_token = token.clone();
        let task_gate = Arc::clone(&gate);
        let task_stage = stage.clone();
        let run = resolved.clone();

        tokio::spawn(async move {
            let fire = || -> bool {
                let _gate = task_gate.lock().unwrap_or_else(|e| e.into_inner());
                if task_token.is_cancelled() {
                    return false;
                }
                let ev = Event::new(origin.clone(), run.event.clone(), run.payload.clone());
                if task_stage.enqueue(ev).is_err() {
                    return false;
                }
                task_stage.report(
                    Report::new(ReportKind::TimerFired)
                        .with_actor(Arc::clone(&actor))
                        .with_machine(Arc::clone(&machine))
                        .with_timer(Arc::clone(&timer))
                        .with_event(run.event.to_string()),
                );
                true
            };

            if run.periodic {
                let mut ticks = time::interval_at(Instant::now() + run.interval, run.interval);
                ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = task_token.cancelled() => break,
                        _ = ticks.tick() => {
                            if !fire() {
                                break;
                            }
                        }
                    }
                }
            } else {
                tokio::select! {
                    _ = task_token.cancelled() => {}
                    _ = time::sleep(run.interval) => {
                        fire();
                    }
                }
            }
        });

        trace!(
            timer = %self.spec.name,
            state,
            interval = ?resolved.interval,
            periodic = resolved.periodic,
            "timer started"
        );
        stage.report(self.report(ReportKind::TimerStarted, scope).with_state(state));
        self.last = Some(resolved);
        self.running = Some(Running { token, gate });
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel();
        }
    }
}

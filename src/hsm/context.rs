//! # Callback context.
//!
//! A [`Context`] is handed to every entry/exit hook and handler action. It names
//! the stage, actor, machine and state the callback belongs to, exposes the event
//! being processed, and is the only way callbacks act on the runtime.
//!
//! `signal`, `reply` and `mount` take effect immediately. `goto`, `reset` and the
//! timer operations are queued and applied in call order once the callback
//! returns, so a callback always runs to completion against the tree it started in.

use std::collections::VecDeque;

use serde_json::Value;

use crate::actor::ActorSpec;
use crate::address::{Address, Scope};
use crate::core::StageHandle;
use crate::error::{DispatchError, UnknownField};
use crate::event::{Event, Payload};

use super::machine::StateId;
use super::spec::TimerStart;

/// Deferred structural change requested by a callback.
#[derive(Debug)]
pub(crate) enum Command {
    Goto { origin: StateId, target: String },
    Reset,
    StartTimer { origin: StateId, timer: String, start: TimerStart },
    StopTimer { origin: StateId, timer: String },
    RestartTimer { origin: StateId, timer: String },
}

/// Per-callback view of the runtime.
pub struct Context<'a> {
    scope: &'a Scope,
    state: &'a str,
    origin: StateId,
    event: &'a Event,
    stage: &'a StageHandle,
    pending: &'a mut VecDeque<Command>,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        scope: &'a Scope,
        state: &'a str,
        origin: StateId,
        event: &'a Event,
        stage: &'a StageHandle,
        pending: &'a mut VecDeque<Command>,
    ) -> Self {
        Self {
            scope,
            state,
            origin,
            event,
            stage,
            pending,
        }
    }

    pub fn stage(&self) -> &str {
        self.scope.stage()
    }

    pub fn actor(&self) -> &str {
        self.scope.actor()
    }

    pub fn machine(&self) -> &str {
        self.scope.machine()
    }

    /// State owning the running hook or handler.
    pub fn state(&self) -> &str {
        self.state
    }

    /// Event being processed. Entry/exit hooks see a synthetic event with an empty
    /// name whose origin is this machine.
    pub fn event(&self) -> &Event {
        self.event
    }

    pub fn payload(&self) -> &Payload {
        self.event.payload()
    }

    pub fn field(&self, name: &str) -> Result<&Value, UnknownField> {
        self.event.field(name)
    }

    pub fn field_str(&self, name: &str) -> Result<&str, UnknownField> {
        self.event.field_str(name)
    }

    /// Sends an event; missing leading segments of `to` come from this machine.
    pub fn signal(&self, to: &str, payload: Payload) -> Result<(), DispatchError> {
        let to = self.scope.resolve(to)?;
        self.send(to, payload)
    }

    /// Sends an event back to the machine the current event came from; missing
    /// leading segments of `to` come from the event's origin.
    pub fn reply(&self, to: &str, payload: Payload) -> Result<(), DispatchError> {
        let to = Address::resolve(to, &self.event.from().scope())?;
        self.send(to, payload)
    }

    fn send(&self, to: Address, payload: Payload) -> Result<(), DispatchError> {
        self.stage
            .enqueue(Event::new(self.scope.origin(), to, payload))
    }

    /// Transition to `target`: the nearest state, from this one upward, that has
    /// a child with that name decides where the transition happens.
    pub fn goto(&mut self, target: impl Into<String>) {
        self.pending.push_back(Command::Goto {
            origin: self.origin,
            target: target.into(),
        });
    }

    /// Leave the whole machine and enter it again from its initial states.
    pub fn reset(&mut self) {
        self.pending.push_back(Command::Reset);
    }

    /// Starts (or restarts from scratch) a timer of this state or an ancestor
    /// using its defaults.
    pub fn start_timer(&mut self, timer: impl Into<String>) {
        self.start_timer_with(timer, TimerStart::default());
    }

    pub fn start_timer_with(&mut self, timer: impl Into<String>, start: TimerStart) {
        self.pending.push_back(Command::StartTimer {
            origin: self.origin,
            timer: timer.into(),
            start,
        });
    }

    /// Cancels a timer; stopping a stopped timer is a no-op.
    pub fn stop_timer(&mut self, timer: impl Into<String>) {
        self.pending.push_back(Command::StopTimer {
            origin: self.origin,
            timer: timer.into(),
        });
    }

    /// Stops a timer and starts it with its last parameters.
    pub fn restart_timer(&mut self, timer: impl Into<String>) {
        self.pending.push_back(Command::RestartTimer {
            origin: self.origin,
            timer: timer.into(),
        });
    }

    /// Mounts a new actor on this stage.
    pub fn mount(&self, actor: ActorSpec) -> Result<(), DispatchError> {
        self.stage.mount(actor)?;
        Ok(())
    }

    /// Builds the error for a failure reported by user code.
    pub fn fail(&self, reason: impl Into<String>) -> DispatchError {
        DispatchError::Action {
            machine: self.scope.machine().to_string(),
            state: self.state.to_string(),
            reason: reason.into(),
        }
    }
}

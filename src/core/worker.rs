//! # ActorWorker: the task driving one actor.
//!
//! Each mounted actor is driven by one worker task, the only code touching the
//! actor's machines once the stage runs.
//!
//! ```text
//! run(token):
//!   setup actor if not done yet
//!   loop {
//!     ├─► token cancelled?                 → exit
//!     ├─► mailbox.try_recv()
//!     │     ├─ Ok(ev)         → dispatch ─► fault policy ─► yield_now
//!     │     ├─ Empty          → select! { cancelled → exit
//!     │     │                             recv      → dispatch
//!     │     │                             sleep(idle.next(n)) }
//!     │     └─ Disconnected   → exit
//! }
//! ```
//!
//! ## Rules
//! - Events of one actor are processed strictly in queue order.
//! - A handler action always runs to completion; cancellation is observed
//!   between events only.
//! - On a failed dispatch `FaultPolicy::Isolate` logs, reports and continues;
//!   `FaultPolicy::Abort` records the failure and cancels the whole stage.

use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::actor::Actor;
use crate::error::{DispatchError, RuntimeError};
use crate::event::Event;
use crate::observe::{Report, ReportKind};
use crate::policies::FaultPolicy;

use super::handle::StageHandle;

pub(crate) struct ActorWorker {
    actor: Actor,
    mailbox: mpsc::UnboundedReceiver<Event>,
    stage: StageHandle,
}

impl ActorWorker {
    pub(crate) fn new(
        actor: Actor,
        mailbox: mpsc::UnboundedReceiver<Event>,
        stage: StageHandle,
    ) -> Self {
        Self { actor, mailbox, stage }
    }

    /// Runs until cancelled, the mailbox closes, or an aborting fault.
    pub(crate) async fn run(mut self, token: CancellationToken) {
        let name = Arc::clone(self.actor.name());
        if !self.actor.is_ready() {
            if let Err(err) = self.actor.setup(&self.stage) {
                self.setup_failed(err);
                return;
            }
        }

        let idle = self.stage.config().idle;
        let mut idle_polls: u32 = 0;

        loop {
            if token.is_cancelled() {
                break;
            }
            match self.mailbox.try_recv() {
                Ok(ev) => {
                    idle_polls = 0;
                    if self.handle(ev).is_break() {
                        break;
                    }
                    tokio::task::yield_now().await;
                }
                Err(TryRecvError::Empty) => {
                    let wait = idle.next(idle_polls);
                    idle_polls = idle_polls.saturating_add(1);
                    tokio::select! {
                        _ = token.cancelled() => break,
                        msg = self.mailbox.recv() => match msg {
                            Some(ev) => {
                                idle_polls = 0;
                                if self.handle(ev).is_break() {
                                    break;
                                }
                            }
                            None => break,
                        },
                        _ = time::sleep(wait) => {}
                    }
                }
                Err(TryRecvError::Disconnected) => break,
            }
        }
        debug!(actor = %name, "worker stopped");
    }

    fn handle(&mut self, ev: Event) -> ControlFlow<()> {
        let err = match self.actor.dispatch(&ev, &self.stage) {
            Ok(_) => return ControlFlow::Continue(()),
            Err(err) => err,
        };

        let actor = self.actor.name();
        error!(
            actor = %actor,
            event = %ev.to(),
            label = err.as_label(),
            error = %err,
            "dispatch failed"
        );
        self.stage.report(
            Report::new(ReportKind::DispatchFailed)
                .with_actor(Arc::clone(actor))
                .with_event(ev.to().to_string())
                .with_reason(err.to_string()),
        );

        match self.stage.config().fault {
            FaultPolicy::Isolate => ControlFlow::Continue(()),
            FaultPolicy::Abort => {
                self.stage.fail(RuntimeError::ActorFailed {
                    actor: actor.to_string(),
                    source: err,
                });
                ControlFlow::Break(())
            }
        }
    }

    fn setup_failed(&self, err: DispatchError) {
        let actor = self.actor.name();
        error!(actor = %actor, label = err.as_label(), error = %err, "actor setup failed");
        self.stage.report(
            Report::new(ReportKind::DispatchFailed)
                .with_actor(Arc::clone(actor))
                .with_reason(err.to_string()),
        );
        match self.stage.config().fault {
            FaultPolicy::Isolate => {
                self.stage.unmount(actor);
            }
            FaultPolicy::Abort => self.stage.fail(RuntimeError::Setup {
                actor: actor.to_string(),
                source: err,
            }),
        }
    }
}

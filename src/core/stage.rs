//! # Stage: router loop, actor workers, and graceful shutdown.
//!
//! The [`Stage`] owns the stage queue and drives the whole runtime: it sets up
//! every mounted actor, runs the routing loop, spawns one worker per actor and
//! waits for shutdown.
//!
//! ## Architecture
//! ```text
//! Context::signal / reply, timers, StageHandle::signal
//!          │
//!          ▼
//!   [stage queue] ──► routing loop ──► Router::publish(ev)
//!                                          │   (registration order, once per actor)
//!                      ┌───────────────────┼───────────────────┐
//!                      ▼                   ▼                   ▼
//!                 [mailbox A]         [mailbox B]         [mailbox N]
//!                      │                   │                   │
//!                 ActorWorker A       ActorWorker B       ActorWorker N
//!                      └──► Machine::dispatch (every machine of the actor)
//!
//! Reports: machines / workers / stage ──► Bus ──► report listener ──► ObserverSet
//!
//! Shutdown path:
//!   OS signal | run_until token | StageHandle::shutdown | FaultPolicy::Abort
//!        └─► Bus.publish(ShutdownRequested)
//!        └─► runtime token cancelled (workers, timers, routing loop)
//!        └─► wait_all_with_grace(cfg.grace):
//!               ├─ all joined      → AllStoppedWithin
//!               └─ grace exceeded  → GraceExceeded, RuntimeError::GraceExceeded { stuck }
//! ```
//!
//! ## Example
//! ```rust
//! use hsmstage::{ActorSpec, MachineSpec, Outcome, Payload, Stage, StageConfig, StateSpec};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let done = CancellationToken::new();
//!     let stop = done.clone();
//!
//!     let stage = Stage::builder("Lab", StageConfig::default())
//!         .actor(ActorSpec::new("Recv").machine(MachineSpec::new("Main").state(
//!             StateSpec::new("Init").on("Ping", move |_ctx| {
//!                 stop.cancel();
//!                 Ok(Outcome::Handled)
//!             }),
//!         )))
//!         .build()?;
//!
//!     stage.handle().signal("Recv.Main.Ping", Payload::new())?;
//!     stage.run_until(done).await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::RuntimeError;
use crate::event::Event;
use crate::observe::{Observe, ObserverSet, Report, ReportKind};

use super::builder::StageBuilder;
use super::config::StageConfig;
use super::handle::StageHandle;
use super::shutdown;

/// Minimum time given to observers to drain after the stage stopped.
const LISTENER_DRAIN: Duration = Duration::from_secs(1);

/// Runtime hosting actors and routing their events.
pub struct Stage {
    handle: StageHandle,
    inbox: mpsc::UnboundedReceiver<Event>,
    listener: JoinHandle<()>,
    listener_stop: CancellationToken,
}

impl Stage {
    /// Starts building a stage named `name`.
    pub fn builder(name: impl Into<String>, cfg: StageConfig) -> StageBuilder {
        StageBuilder::new(name, cfg)
    }

    pub(crate) fn new(
        handle: StageHandle,
        inbox: mpsc::UnboundedReceiver<Event>,
        observers: Vec<Arc<dyn Observe>>,
    ) -> Self {
        let listener_stop = CancellationToken::new();
        let listener = Self::report_listener(&handle, observers, listener_stop.clone());
        Self {
            handle,
            inbox,
            listener,
            listener_stop,
        }
    }

    /// Handle for injecting events, mounting actors and requesting shutdown.
    pub fn handle(&self) -> StageHandle {
        self.handle.clone()
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// Drives every mounted actor that is not set up yet into its initial states.
    ///
    /// Called by `run`; calling it earlier surfaces setup failures before the
    /// stage runs. Must be called inside a tokio runtime (autostart timers spawn).
    pub fn setup(&self) -> Result<(), RuntimeError> {
        Self::setup_all(&self.handle)
    }

    /// Runs until an OS termination signal, `StageHandle::shutdown`, or an
    /// aborting actor fault, then shuts down gracefully.
    pub async fn run(self) -> Result<(), RuntimeError> {
        self.drive(CancellationToken::new(), true).await
    }

    /// Like [`run`](Self::run) but stops when `token` is cancelled and does not
    /// listen to OS signals.
    pub async fn run_until(self, token: CancellationToken) -> Result<(), RuntimeError> {
        self.drive(token, false).await
    }

    async fn drive(
        self,
        external: CancellationToken,
        os_signals: bool,
    ) -> Result<(), RuntimeError> {
        let Stage {
            handle,
            inbox,
            listener,
            listener_stop,
        } = self;

        let setup = Stage::setup_all(&handle);
        let runtime = handle.runtime_token().clone();

        let router = tokio::spawn(Self::routing_loop(handle.clone(), inbox, runtime.clone()));
        handle.start_workers();
        info!(stage = %handle.name(), actors = handle.actors().len(), "stage running");

        let signal_error = match setup {
            Err(err) => {
                handle.fail(err);
                None
            }
            Ok(()) => {
                let signal = async {
                    if os_signals {
                        shutdown::wait_for_shutdown_signal().await
                    } else {
                        std::future::pending().await
                    }
                };
                tokio::select! {
                    res = signal => res.err(),
                    _ = external.cancelled() => None,
                    _ = runtime.cancelled() => None,
                }
            }
        };

        handle.report(Report::new(ReportKind::ShutdownRequested));
        runtime.cancel();
        let waited = Self::wait_all_with_grace(&handle).await;
        let _ = router.await;

        listener_stop.cancel();
        let _ = time::timeout(handle.config().grace.max(LISTENER_DRAIN), listener).await;

        if let Some(err) = signal_error {
            return Err(RuntimeError::Signal(err));
        }
        if let Some(failure) = handle.take_failure() {
            return Err(failure);
        }
        waited
    }

    fn setup_all(handle: &StageHandle) -> Result<(), RuntimeError> {
        let registry = handle.registry();
        while let Some((mut actor, mailbox)) = registry.take_unready() {
            let result = actor.setup(handle);
            let name = actor.name().to_string();
            registry.put_back(actor, mailbox);
            if let Err(source) = result {
                return Err(RuntimeError::Setup { actor: name, source });
            }
        }
        Ok(())
    }

    /// Dequeues events and publishes them through the router.
    async fn routing_loop(
        handle: StageHandle,
        mut inbox: mpsc::UnboundedReceiver<Event>,
        token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                msg = inbox.recv() => match msg {
                    Some(ev) => {
                        let delivered = handle.router().publish(&ev);
                        if delivered == 0 {
                            debug!(event = %ev.to(), "event matched no subscriber");
                        }
                    }
                    None => break,
                },
            }
        }
    }

    /// Forwards bus reports to the observers until `stop`, then drains them.
    fn report_listener(
        handle: &StageHandle,
        observers: Vec<Arc<dyn Observe>>,
        stop: CancellationToken,
    ) -> JoinHandle<()> {
        let mut rx = handle.reports();
        let set = ObserverSet::new(observers, handle.bus().clone());

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    msg = rx.recv() => match msg {
                        Ok(report) => set.emit(report),
                        Err(RecvError::Lagged(n)) => {
                            warn!(skipped = n, "report listener lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = stop.cancelled() => {
                        while let Ok(report) = rx.try_recv() {
                            set.emit(report);
                        }
                        break;
                    }
                }
            }
            set.shutdown().await;
        })
    }

    /// Waits for every actor worker within the configured grace period.
    async fn wait_all_with_grace(handle: &StageHandle) -> Result<(), RuntimeError> {
        let grace = handle.config().grace;
        let mut workers = handle.registry().drain_running();

        let all_joined = match handle.config().shutdown_grace() {
            Some(limit) => {
                let done = async {
                    for (_, h) in workers.iter_mut() {
                        let _ = (&mut h.join).await;
                    }
                };
                time::timeout(limit, done).await.is_ok()
            }
            None => workers.iter().all(|(_, h)| h.join.is_finished()),
        };
        if all_joined {
            handle.report(Report::new(ReportKind::AllStoppedWithin));
            return Ok(());
        }

        let mut stuck: Vec<String> = workers
            .iter()
            .filter(|(_, h)| !h.join.is_finished())
            .map(|(name, _)| name.to_string())
            .collect();
        stuck.sort_unstable();
        for (_, h) in &workers {
            h.join.abort();
        }
        handle.report(Report::new(ReportKind::GraceExceeded).with_reason(stuck.join(",")));
        Err(RuntimeError::GraceExceeded { grace, stuck })
    }
}

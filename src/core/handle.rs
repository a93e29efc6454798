//! # StageHandle: shared access to a stage.
//!
//! A cheap clonable handle onto the state every part of a stage shares: the
//! stage queue, the router, the actor registry, the report bus and the runtime
//! cancellation token. Machines use it to send events and start timers; callers
//! outside the stage use it to inject events, mount actors at runtime and request
//! shutdown.

use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard};

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::actor::{Actor, ActorSpec};
use crate::address::Address;
use crate::error::{AddressError, ConfigError, DispatchError, NodeKind, RuntimeError};
use crate::event::{Event, Payload};
use crate::hsm::valid_name;
use crate::observe::{Bus, Report};
use crate::routing::Router;

use super::config::StageConfig;
use super::registry::{Handle, Registry, Slot};
use super::worker::ActorWorker;

struct Shared {
    name: Arc<str>,
    cfg: StageConfig,
    inbox: mpsc::UnboundedSender<Event>,
    router: RwLock<Router>,
    registry: Registry,
    bus: Bus,
    token: CancellationToken,
    failure: Mutex<Option<RuntimeError>>,
}

/// Clonable handle onto a stage.
#[derive(Clone)]
pub struct StageHandle {
    shared: Arc<Shared>,
}

impl StageHandle {
    /// Creates the shared state of a stage; the receiver is the stage queue.
    pub(crate) fn new(
        name: &str,
        cfg: StageConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Event>), ConfigError> {
        if !valid_name(name) {
            return Err(ConfigError::InvalidName {
                kind: NodeKind::Stage,
                name: name.to_string(),
                parent_kind: NodeKind::Stage,
                parent: "-".to_string(),
            });
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Shared {
            name: Arc::from(name),
            router: RwLock::new(Router::new(cfg.missing_field)),
            bus: Bus::new(cfg.bus_capacity_clamped()),
            cfg,
            inbox: tx,
            registry: Registry::new(),
            token: CancellationToken::new(),
            failure: Mutex::new(None),
        };
        Ok((
            Self {
                shared: Arc::new(shared),
            },
            rx,
        ))
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn config(&self) -> &StageConfig {
        &self.shared.cfg
    }

    /// Injects an event from outside any machine.
    ///
    /// `to` must name at least `actor.machine.event`; a missing stage segment is
    /// this stage. Replies to such an event reach no one.
    pub fn signal(&self, to: &str, payload: Payload) -> Result<(), DispatchError> {
        if to.split('.').count() < 3 {
            return Err(AddressError::Incomplete {
                input: to.to_string(),
            }
            .into());
        }
        let origin = Address::new(Arc::clone(&self.shared.name), "", "", "");
        let to = Address::resolve(to, &origin.scope())?;
        self.enqueue(Event::new(origin, to, payload))
    }

    /// Queues a fully addressed event for routing.
    pub fn enqueue(&self, ev: Event) -> Result<(), DispatchError> {
        self.shared
            .inbox
            .send(ev)
            .map_err(|_| DispatchError::StageClosed {
                stage: self.shared.name.to_string(),
            })
    }

    /// Mounts an actor: compiles it, registers its subscriptions and hands it to
    /// a worker (immediately when the stage is running, at `run` otherwise).
    ///
    /// A runtime-mounted actor is driven into its initial states by its worker
    /// before it processes any event.
    pub fn mount(&self, spec: ActorSpec) -> Result<(), ConfigError> {
        let actor = Actor::compile(spec, &self.shared.name, &self.shared.cfg)?;
        let name = Arc::clone(actor.name());

        let mut reg = self.shared.registry.lock();
        if reg.slots.contains_key(&name) {
            return Err(ConfigError::ActorExists {
                actor: name.to_string(),
                stage: self.shared.name.to_string(),
            });
        }

        let (tx, mailbox) = mpsc::unbounded_channel();
        {
            let mut router = self.shared.router.write().unwrap_or_else(|e| e.into_inner());
            router.attach(Arc::clone(&name), tx);
            for sub in actor.subscriptions() {
                router.subscribe(sub);
            }
        }

        let slot = if reg.running {
            Slot::Running(self.spawn_worker(actor, mailbox))
        } else {
            Slot::Staged { actor, mailbox }
        };
        reg.slots.insert(Arc::clone(&name), slot);
        info!(stage = %self.shared.name, actor = %name, "actor mounted");
        Ok(())
    }

    /// Removes an actor and its subscriptions. Returns false if it was not mounted.
    pub fn unmount(&self, actor: &str) -> bool {
        let removed = self.shared.registry.remove(actor);
        if removed {
            let mut router = self.shared.router.write().unwrap_or_else(|e| e.into_inner());
            router.detach(actor);
            debug!(stage = %self.shared.name, actor, "actor unmounted");
        }
        removed
    }

    /// Sorted names of mounted actors.
    pub fn actors(&self) -> Vec<String> {
        self.shared.registry.list()
    }

    /// Receiver of every report published after this call.
    pub fn reports(&self) -> broadcast::Receiver<Report> {
        self.shared.bus.subscribe()
    }

    /// Requests a graceful shutdown of a running stage.
    pub fn shutdown(&self) {
        self.shared.token.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.token.is_cancelled()
    }

    // ---------------------------
    // Crate internals
    // ---------------------------

    pub(crate) fn report(&self, report: Report) {
        self.shared.bus.publish(report);
    }

    pub(crate) fn bus(&self) -> &Bus {
        &self.shared.bus
    }

    pub(crate) fn runtime_token(&self) -> &CancellationToken {
        &self.shared.token
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.shared.registry
    }

    pub(crate) fn router(&self) -> RwLockReadGuard<'_, Router> {
        self.shared.router.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Records the first fatal failure and cancels the stage.
    pub(crate) fn fail(&self, err: RuntimeError) {
        {
            let mut failure = self.shared.failure.lock().unwrap_or_else(|e| e.into_inner());
            if failure.is_none() {
                *failure = Some(err);
            }
        }
        self.shared.token.cancel();
    }

    pub(crate) fn take_failure(&self) -> Option<RuntimeError> {
        self.shared
            .failure
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    /// Marks the registry running and spawns a worker for every staged actor.
    pub(crate) fn start_workers(&self) {
        let mut reg = self.shared.registry.lock();
        reg.running = true;
        let staged: Vec<Arc<str>> = reg
            .slots
            .iter()
            .filter(|(_, s)| matches!(s, Slot::Staged { .. }))
            .map(|(n, _)| Arc::clone(n))
            .collect();
        for name in staged {
            if let Some(Slot::Staged { actor, mailbox }) = reg.slots.remove(&name) {
                let handle = self.spawn_worker(actor, mailbox);
                reg.slots.insert(name, Slot::Running(handle));
            }
        }
    }

    fn spawn_worker(&self, actor: Actor, mailbox: mpsc::UnboundedReceiver<Event>) -> Handle {
        let cancel = self.shared.token.child_token();
        let worker = ActorWorker::new(actor, mailbox, self.clone());
        let join = tokio::spawn(worker.run(cancel.clone()));
        Handle { join, cancel }
    }
}

impl std::fmt::Debug for StageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageHandle")
            .field("name", &self.shared.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
impl StageHandle {
    /// Stage state with no running loop, for unit tests driving machines by hand.
    pub(crate) fn detached(name: &str, cfg: StageConfig) -> (Self, mpsc::UnboundedReceiver<Event>) {
        match Self::new(name, cfg) {
            Ok(pair) => pair,
            Err(e) => panic!("invalid test stage: {e}"),
        }
    }
}

//! # Actor registry.
//!
//! Owns every mounted actor of a stage, in one of two slots:
//!
//! ```text
//! mount ──► Staged { actor, mailbox }   (stage not running yet)
//!              │ Stage::setup: taken out, set up with the lock released, put back
//!              ▼
//!           Running { join, cancel }     (Stage::run, or mount while running)
//! ```
//!
//! ## Rules
//! - Actor names are unique per stage; a second mount of a name is rejected.
//! - The registry lock is never held while user callbacks run, so hooks may mount
//!   further actors.
//! - Lock order is registry → router.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::actor::Actor;
use crate::event::Event;

/// Handle to a running actor worker.
pub(crate) struct Handle {
    pub(crate) join: JoinHandle<()>,
    pub(crate) cancel: CancellationToken,
}

pub(crate) enum Slot {
    Staged {
        actor: Actor,
        mailbox: mpsc::UnboundedReceiver<Event>,
    },
    /// Taken out for setup.
    Busy,
    Running(Handle),
}

pub(crate) struct Inner {
    pub(crate) slots: HashMap<Arc<str>, Slot>,
    pub(crate) running: bool,
}

pub(crate) struct Registry {
    inner: Mutex<Inner>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                slots: HashMap::new(),
                running: false,
            }),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Takes out one staged actor that still needs setup.
    pub(crate) fn take_unready(&self) -> Option<(Actor, mpsc::UnboundedReceiver<Event>)> {
        let mut inner = self.lock();
        let name = inner.slots.iter().find_map(|(name, slot)| match slot {
            Slot::Staged { actor, .. } if !actor.is_ready() => Some(Arc::clone(name)),
            _ => None,
        })?;
        match inner.slots.insert(name, Slot::Busy) {
            Some(Slot::Staged { actor, mailbox }) => Some((actor, mailbox)),
            _ => None,
        }
    }

    /// Puts back an actor taken with [`take_unready`](Self::take_unready).
    ///
    /// The actor is dropped if it was unmounted in the meantime.
    pub(crate) fn put_back(&self, actor: Actor, mailbox: mpsc::UnboundedReceiver<Event>) {
        let mut inner = self.lock();
        if let Some(slot) = inner.slots.get_mut(actor.name()) {
            if matches!(slot, Slot::Busy) {
                *slot = Slot::Staged { actor, mailbox };
            }
        }
    }

    /// Removes an actor; cancels its worker if running. Returns false when unknown.
    pub(crate) fn remove(&self, name: &str) -> bool {
        let mut inner = self.lock();
        match inner.slots.remove(name) {
            Some(Slot::Running(handle)) => {
                handle.cancel.cancel();
                true
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Sorted names of mounted actors.
    pub(crate) fn list(&self) -> Vec<String> {
        let inner = self.lock();
        let mut names: Vec<String> = inner.slots.keys().map(|k| k.to_string()).collect();
        names.sort_unstable();
        names
    }

    /// Drains every running handle (used once, at shutdown).
    pub(crate) fn drain_running(&self) -> Vec<(Arc<str>, Handle)> {
        let mut inner = self.lock();
        inner.running = false;
        let names: Vec<Arc<str>> = inner
            .slots
            .iter()
            .filter(|(_, s)| matches!(s, Slot::Running(_)))
            .map(|(n, _)| Arc::clone(n))
            .collect();
        names
            .into_iter()
            .filter_map(|n| match inner.slots.remove(&n) {
                Some(Slot::Running(h)) => Some((n, h)),
                _ => None,
            })
            .collect()
    }
}

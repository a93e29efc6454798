//! # StateTracker: active state per machine.
//!
//! Keeps, for every `actor.machine`, the dotted path of the deepest state entered
//! and not yet exited, by listening to `StateEntered` / `StateExited` reports.
//!
//! ```text
//! on_report(r):
//!   ├─ StateEntered(path) → current[actor.machine] = path
//!   ├─ StateExited(path)  → current[actor.machine] = parent(path), or removed at the root
//!   └─ otherwise: ignore
//! ```

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::observer::Observe;
use super::report::{Report, ReportKind};

/// Tracks the active leaf of every machine on a stage.
pub struct StateTracker {
    inner: RwLock<BTreeMap<String, String>>,
    capacity: usize,
}

impl StateTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BTreeMap::new()),
            capacity: 4096,
        }
    }

    /// Configure the queue capacity for this observer.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Active state path of `actor.machine`, if the machine is entered.
    #[must_use]
    pub fn active(&self, actor: &str, machine: &str) -> Option<String> {
        let g = self.inner.read().unwrap_or_else(|e| e.into_inner());
        g.get(&format!("{actor}.{machine}")).cloned()
    }

    /// Sorted `(actor.machine, state path)` pairs.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, String)> {
        let g = self.inner.read().unwrap_or_else(|e| e.into_inner());
        g.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    fn key(report: &Report) -> Option<String> {
        match (report.actor.as_deref(), report.machine.as_deref()) {
            (Some(actor), Some(machine)) => Some(format!("{actor}.{machine}")),
            _ => None,
        }
    }
}

#[async_trait]
impl Observe for StateTracker {
    async fn on_report(&self, report: &Report) {
        let (Some(key), Some(path)) = (Self::key(report), report.state.as_deref()) else {
            return;
        };
        match report.kind {
            ReportKind::StateEntered => {
                let mut g = self.inner.write().unwrap_or_else(|e| e.into_inner());
                g.insert(key, path.to_string());
            }
            ReportKind::StateExited => {
                let mut g = self.inner.write().unwrap_or_else(|e| e.into_inner());
                match path.rsplit_once('.') {
                    Some((parent, _)) => {
                        g.insert(key, parent.to_string());
                    }
                    None => {
                        g.remove(&key);
                    }
                }
            }
            _ => {}
        }
    }

    fn name(&self) -> &'static str {
        "StateTracker"
    }

    fn queue_capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

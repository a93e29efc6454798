//! # Report bus.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] carrying [`Report`]s
//! from machines, actor workers and the stage to any number of listeners.
//!
//! ```text
//! Publishers (many):                      Listener (one per stage):
//!   Machine (enter/exit, timers) ──┐
//!   ActorWorker (faults)         ──┼──► Bus ──► report listener ──► ObserverSet
//!   Stage (mount, shutdown)      ──┘                (plus any StageHandle::reports())
//! ```
//!
//! ## Rules
//! - `publish()` never blocks.
//! - The ring buffer is shared by all receivers; slow receivers see `Lagged(n)`.
//! - Reports published with no receiver attached are lost.

use tokio::sync::broadcast;

use super::report::Report;

/// Broadcast channel for runtime reports. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Report>,
}

impl Bus {
    /// Creates a new bus; capacity is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Report>(capacity.max(1));
        Self { tx }
    }

    /// Publishes a report to all active receivers.
    pub fn publish(&self, report: Report) {
        let _ = self.tx.send(report);
    }

    /// New receiver observing reports sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Report> {
        self.tx.subscribe()
    }
}

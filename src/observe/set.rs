//! # Non-blocking fan-out of reports to observers.
//!
//! ```text
//! emit(report)
//!     │
//!     ├──► [queue 1] ──► worker 1 ──► observer1.on_report()
//!     │    (bounded)         └──────► panic → ObserverPanicked
//!     ├──► [queue 2] ──► worker 2 ──► observer2.on_report()
//!     └──► [queue N] ──► worker N ──► observerN.on_report()
//! ```
//!
//! ## Rules
//! - `emit()` returns immediately (`try_send`).
//! - Per-observer FIFO; no ordering across observers.
//! - Overflow drops the report for that observer only and publishes `ObserverOverflow`
//!   (never for an overflow report itself).
//! - A panicking observer is reported and keeps receiving later reports.

use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use super::bus::Bus;
use super::observer::Observe;
use super::report::Report;

struct ObserverChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Report>>,
}

/// Fan-out coordinator for report observers.
pub struct ObserverSet {
    channels: Vec<ObserverChannel>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl ObserverSet {
    /// Creates the set and spawns one worker per observer.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn Observe>>, bus: Bus) -> Self {
        let mut channels = Vec::with_capacity(observers.len());
        let mut workers = Vec::with_capacity(observers.len());

        for obs in observers {
            let cap = obs.queue_capacity().max(1);
            let name = obs.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Report>>(cap);
            let bus_for_worker = bus.clone();

            let handle = tokio::spawn(async move {
                while let Some(report) = rx.recv().await {
                    let fut = obs.on_report(report.as_ref());
                    if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        let any = &*panic_err;
                        let info = if let Some(msg) = any.downcast_ref::<&'static str>() {
                            (*msg).to_string()
                        } else if let Some(msg) = any.downcast_ref::<String>() {
                            msg.clone()
                        } else {
                            "unknown panic".to_string()
                        };
                        bus_for_worker.publish(Report::observer_panicked(obs.name(), info));
                    }
                }
            });
            channels.push(ObserverChannel { name, sender: tx });
            workers.push(handle);
        }
        Self {
            channels,
            workers,
            bus,
        }
    }

    /// Emits a report to all observers without waiting for them.
    pub fn emit(&self, report: Report) {
        let report = Arc::new(report);
        let is_overflow = report.is_observer_overflow();

        for channel in &self.channels {
            let reason = match channel.sender.try_send(Arc::clone(&report)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            if !is_overflow {
                self.bus.publish(Report::observer_overflow(channel.name, reason));
            }
        }
    }

    /// Closes every queue and waits for the workers to drain.
    pub async fn shutdown(self) {
        drop(self.channels);
        for h in self.workers {
            let _ = h.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::ReportKind;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<ReportKind>>);

    #[async_trait]
    impl Observe for Collect {
        async fn on_report(&self, report: &Report) {
            self.0.lock().unwrap().push(report.kind);
        }
        fn name(&self) -> &'static str {
            "collect"
        }
    }

    struct Explode;

    #[async_trait]
    impl Observe for Explode {
        async fn on_report(&self, _report: &Report) {
            panic!("boom");
        }
        fn name(&self) -> &'static str {
            "explode"
        }
    }

    #[tokio::test]
    async fn panicking_observer_does_not_affect_others() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let collect = Arc::new(Collect::default());
        let set = ObserverSet::new(vec![collect.clone(), Arc::new(Explode)], bus);

        set.emit(Report::new(ReportKind::ActorMounted));
        set.emit(Report::new(ReportKind::StateEntered));
        set.shutdown().await;

        assert_eq!(
            *collect.0.lock().unwrap(),
            vec![ReportKind::ActorMounted, ReportKind::StateEntered]
        );
        let panicked = rx.recv().await.unwrap();
        assert_eq!(panicked.kind, ReportKind::ObserverPanicked);
        assert_eq!(panicked.observer, Some("explode"));
        assert_eq!(panicked.reason.as_deref(), Some("boom"));
    }
}

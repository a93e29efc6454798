//! # Runtime reports and their observers.
//!
//! ```text
//! Machine / ActorWorker / Stage ── publish(Report) ──► Bus
//!                                                      │
//!                                   report listener ◄──┘
//!                                         │
//!                                   ObserverSet::emit
//!                          ┌──────────────┼──────────────┐
//!                          ▼              ▼              ▼
//!                    StateTracker     LogWriter       custom Observe
//! ```
//!
//! ## Implementing an observer
//! ```no_run
//! use hsmstage::{Observe, Report, ReportKind};
//! use async_trait::async_trait;
//!
//! struct Unhandled;
//!
//! #[async_trait]
//! impl Observe for Unhandled {
//!     async fn on_report(&self, r: &Report) {
//!         if r.kind == ReportKind::EventUnhandled {
//!             // alert ...
//!         }
//!     }
//!     fn name(&self) -> &'static str { "unhandled" }
//! }
//! ```

mod bus;
#[cfg(feature = "logging")]
mod log;
mod observer;
mod report;
mod set;
mod tracker;

pub(crate) use bus::Bus;
#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use observer::Observe;
pub use report::{Report, ReportKind};
pub(crate) use set::ObserverSet;
pub use tracker::StateTracker;

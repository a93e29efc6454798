//! # hsmstage
//!
//! **hsmstage** runs hierarchical state machines inside actors and wires the
//! actors together through an addressed, wildcard-matchable publish/subscribe
//! stage.
//!
//! Every event is addressed `stage.actor.machine.event`. Handlers subscribe to
//! address patterns (any segment may be `*`); the stage routes each event to
//! every matching actor once, and each actor dispatches it into its machines,
//! deepest active state first.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  ┌───────────────────────────────────────────────────────────────────┐
//!  │  Stage "Lab"                                                      │
//!  │                                                                   │
//!  │   [stage queue] ──► routing loop ──► Router (subscriptions)       │
//!  │         ▲                               │ once per actor          │
//!  │         │               ┌───────────────┼───────────────┐         │
//!  │         │               ▼               ▼               ▼         │
//!  │         │         ┌──────────┐    ┌──────────┐    ┌──────────┐    │
//!  │         │         │ Actor A  │    │ Actor B  │    │ Actor N  │    │
//!  │         │         │ worker   │    │ worker   │    │ worker   │    │
//!  │         │         │ Machine… │    │ Machine… │    │ Machine… │    │
//!  │         │         └────┬─────┘    └────┬─────┘    └────┬─────┘    │
//!  │         └── signal / reply / timers ───┴───────────────┘          │
//!  └───────────────────────────────────────────────────────────────────┘
//!                │ reports
//!                ▼
//!          Bus ──► ObserverSet ──► StateTracker, LogWriter, custom Observe
//! ```
//!
//! ### A machine
//! ```text
//! Door (root)
//!  ├── Closed  (initial)      on "Open"  → goto("Opened")
//!  └── Opened                 timer AutoClose (5s, autostart)
//!       ├── Init              on "AutoClose" → goto("Closed")
//!       └── Held
//! ```
//! Entering `Door` enters `Closed`; `goto("Opened")` leaves `Closed` and enters
//! `Opened` then `Opened.Init`, starting `AutoClose`; leaving `Opened` stops it.
//!
//! ## Features
//! | Area | Description | Key types |
//! |---|---|---|
//! | **Addresses** | Four-segment addresses, wildcards, resolution | [`Address`], [`Scope`] |
//! | **Events** | Addressed events with JSON payloads | [`Event`], [`Payload`] |
//! | **State trees** | Tree builders | [`MachineSpec`], [`StateSpec`], [`TimerSpec`] |
//! | **Callbacks** | Signals, transitions, timers, mounting | [`Context`], [`Outcome`] |
//! | **Guards** | Payload predicates | [`Guard`], [`Verdict`], [`MissingFieldPolicy`] |
//! | **Actors** | Actor descriptions and reusable actor kinds | [`ActorSpec`], [`ActorKind`] |
//! | **Runtime** | Stage, handle, configuration | [`Stage`], [`StageHandle`], [`StageConfig`] |
//! | **Observability** | Reports and observers | [`Report`], [`Observe`], [`StateTracker`] |
//! | **Errors** | Labelled errors | [`ConfigError`], [`DispatchError`], [`RuntimeError`] |
//!
//! ## Optional features
//! - `logging`: exports [`LogWriter`], an observer writing reports through `tracing`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use hsmstage::{
//!     ActorSpec, MachineSpec, Outcome, Payload, Stage, StageConfig, StateSpec, StateTracker,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let done = CancellationToken::new();
//!     let finished = done.clone();
//!     let tracker = Arc::new(StateTracker::new());
//!
//!     let steps = MachineSpec::new("Main")
//!         .state(StateSpec::new("Init").on_enter(|ctx| {
//!             ctx.goto("Next");
//!             Ok(())
//!         }))
//!         .state(StateSpec::new("Next").on("Go", |ctx| {
//!             ctx.goto("Done");
//!             Ok(Outcome::Handled)
//!         }))
//!         .state(StateSpec::new("Done").on_enter(move |_ctx| {
//!             finished.cancel();
//!             Ok(())
//!         }));
//!
//!     let stage = Stage::builder("Lab", StageConfig::default())
//!         .actor(ActorSpec::new("Stepper").machine(steps))
//!         .observer(tracker.clone())
//!         .build()?;
//!
//!     stage.handle().signal("Stepper.Main.Go", Payload::new())?;
//!     stage.run_until(done).await?;
//!     Ok(())
//! }
//! ```

mod actor;
mod address;
mod core;
mod error;
mod event;
mod hsm;
mod observe;
mod policies;
mod routing;

// ---- Public re-exports ----

pub use actor::{ActorKind, ActorSpec, BuildStep};
pub use address::{Address, Scope, WILDCARD, segment_matches};
pub use crate::core::{Stage, StageBuilder, StageConfig, StageHandle};
pub use error::{
    AddressError, ConfigError, DispatchError, NodeKind, RuntimeError, TimerError, UnknownField,
};
pub use event::{Event, Payload};
pub use hsm::{
    Action, Context, HandlerSpec, Hook, INIT_STATE, MachineSpec, Outcome, StateSpec, TimerSpec,
    TimerStart,
};
pub use observe::{Observe, Report, ReportKind, StateTracker};
pub use policies::{BackoffPolicy, FaultPolicy, JitterPolicy, MissingFieldPolicy};
pub use routing::{Guard, GuardContext, Verdict, guard};

// Optional: expose a simple built-in logger observer (demo/reference).
#[cfg(feature = "logging")]
pub use observe::LogWriter;

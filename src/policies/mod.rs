//! Runtime policies.
//!
//! ## Contents
//! - [`BackoffPolicy`] how long an idle actor worker waits between queue polls
//! - [`JitterPolicy`]  randomization of those waits so idle actors do not wake in lockstep
//! - [`FaultPolicy`]   what an actor does when a dispatch fails
//! - [`MissingFieldPolicy`] what a guard touching an undefined field means
//!
//! ## Quick wiring
//! ```text
//! StageConfig { idle: BackoffPolicy, fault: FaultPolicy, missing_field: MissingFieldPolicy }
//!      └─► core::worker::ActorWorker uses:
//!           - idle.next(idle_polls) to bound the wait on an empty queue
//!           - fault to decide isolate/abort on DispatchError
//!      └─► routing::Router and hsm::Machine use missing_field for guard verdicts
//! ```
//!
//! ## Defaults
//! - `BackoffPolicy::default()` → first=1ms, factor=2.0, max=20ms, jitter=None.
//! - `FaultPolicy::Isolate`.
//! - `MissingFieldPolicy::NoMatch`.

mod backoff;
mod fault;
mod jitter;

pub use backoff::BackoffPolicy;
pub use fault::{FaultPolicy, MissingFieldPolicy};
pub use jitter::JitterPolicy;

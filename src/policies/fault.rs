//! # Fault and guard policies for actors.
//!
//! [`FaultPolicy`] decides what happens to an actor when dispatching an event into
//! one of its machines fails (unknown `goto` target, timer misuse, user error).
//!
//! - [`FaultPolicy::Isolate`] the failing event is dropped, the error is logged and
//!   reported, and the actor keeps draining its queue (default).
//! - [`FaultPolicy::Abort`] the whole stage shuts down and
//!   [`Stage::run`](crate::Stage::run) returns
//!   [`RuntimeError::ActorFailed`](crate::RuntimeError::ActorFailed).
//!
//! [`MissingFieldPolicy`] decides what a guard that touched an undefined payload
//! field means:
//!
//! ```text
//! guard(ctx) ── Ok(true)  ─► Verdict::Match
//!            ── Ok(false) ─► Verdict::NoMatch
//!            ── Err(UnknownField) ─► Verdict::FieldMissing ─► MissingFieldPolicy
//!                                                              ├─ NoMatch (default)
//!                                                              ├─ Match
//!                                                              └─ Fail
//! ```

/// What an actor does when a dispatch fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FaultPolicy {
    /// Contain the failure to the event being processed (default).
    #[default]
    Isolate,
    /// Stop the stage and surface the error from `run`.
    Abort,
}

/// How a guard's `FieldMissing` verdict is interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MissingFieldPolicy {
    /// The guarded handler/subscription does not apply (historical behavior).
    #[default]
    NoMatch,
    /// The guarded handler/subscription applies anyway.
    Match,
    /// Handler guards fail the dispatch with `DispatchError::UnknownField`.
    ///
    /// Router guards cannot fail a publish; they fall back to `NoMatch` and warn.
    Fail,
}

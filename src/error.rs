//! Error types used by the stage runtime and state machines.
//!
//! - [`ConfigError`] — structural problems found while building the tree or
//!   mounting an actor; fatal to startup.
//! - [`DispatchError`] — failures inside a single event dispatch (unknown `goto`
//!   target, timer misuse, undefined payload field, user action failure).
//! - [`RuntimeError`] — failures of the runtime as a whole, returned by
//!   [`Stage::run`](crate::Stage::run).
//!
//! All enums provide `as_label` (stable snake_case) for logs.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Kind of tree node, used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Stage,
    Actor,
    Machine,
    State,
    Handler,
    Timer,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeKind::Stage => "stage",
            NodeKind::Actor => "actor",
            NodeKind::Machine => "machine",
            NodeKind::State => "state",
            NodeKind::Handler => "handler",
            NodeKind::Timer => "timer",
        })
    }
}

/// Malformed address string.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("address {input:?} has {count} segments; at most 4 are allowed")]
    TooManySegments { input: String, count: usize },

    #[error("address {input:?} contains an empty segment")]
    EmptySegment { input: String },

    #[error("address {input:?} is not fully qualified (stage.actor.machine.event)")]
    Incomplete { input: String },
}

/// Access to an undefined payload field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("field '{field}' not found in event {event}")]
pub struct UnknownField {
    /// Requested field name.
    pub field: String,
    /// Destination address of the event that lacked it.
    pub event: String,
}

/// # Structural errors in the stage tree.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Two siblings share a name.
    #[error("duplicate {kind} '{name}' in {parent_kind} '{parent}'")]
    Duplicate {
        kind: NodeKind,
        name: String,
        parent_kind: NodeKind,
        parent: String,
    },

    /// More than one child is flagged as initial.
    #[error("state '{parent}' flags both '{first}' and '{second}' as initial")]
    MultipleInitial {
        parent: String,
        first: String,
        second: String,
    },

    /// A state has children but no initial designation (strict mode only).
    #[error("state '{parent}' has children but no initial state (flag one or name it \"Init\")")]
    NoInitialState { parent: String },

    /// Name is empty or contains a reserved character (`.` or `*`).
    #[error("invalid {kind} name {name:?} in {parent_kind} '{parent}'")]
    InvalidName {
        kind: NodeKind,
        name: String,
        parent_kind: NodeKind,
        parent: String,
    },

    /// Handler pattern or timer event name does not parse.
    #[error("bad address in {kind} '{name}' of '{parent}': {source}")]
    Address {
        kind: NodeKind,
        name: String,
        parent: String,
        #[source]
        source: AddressError,
    },

    /// An actor with this name is already mounted.
    #[error("actor '{actor}' already exists on stage '{stage}'")]
    ActorExists { actor: String, stage: String },
}

impl ConfigError {
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Duplicate { .. } => "config_duplicate",
            ConfigError::MultipleInitial { .. } => "config_multiple_initial",
            ConfigError::NoInitialState { .. } => "config_no_initial_state",
            ConfigError::InvalidName { .. } => "config_invalid_name",
            ConfigError::Address { .. } => "config_bad_address",
            ConfigError::ActorExists { .. } => "config_actor_exists",
        }
    }
}

/// # Timer misuse.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// No timer with this name in the calling state or any ancestor.
    #[error("unknown timer '{timer}' (looked up from state '{state}' of machine '{machine}')")]
    Unknown {
        timer: String,
        state: String,
        machine: String,
    },

    /// Neither an override nor a default interval is set.
    #[error("timer '{timer}' in state '{state}' has no interval")]
    NoInterval { timer: String, state: String },

    /// Interval resolved to zero.
    #[error("timer '{timer}' in state '{state}' has a zero interval")]
    ZeroInterval { timer: String, state: String },

    /// The event name does not resolve to an address.
    #[error("timer '{timer}' has a bad event name: {source}")]
    BadEvent {
        timer: String,
        #[source]
        source: AddressError,
    },
}

/// # Errors raised while dispatching one event.
///
/// Fatal to the dispatch in progress; how the owning actor reacts is decided by
/// [`FaultPolicy`](crate::FaultPolicy).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DispatchError {
    /// A `goto` target was not found walking up to the machine root.
    #[error("state '{target}' not found from state '{from}' in machine '{machine}'")]
    StateNotFound {
        target: String,
        from: String,
        machine: String,
    },

    #[error(transparent)]
    Timer(#[from] TimerError),

    #[error(transparent)]
    UnknownField(#[from] UnknownField),

    #[error(transparent)]
    Address(#[from] AddressError),

    /// Failure reported by user code.
    #[error("action failed in {machine}.{state}: {reason}")]
    Action {
        machine: String,
        state: String,
        reason: String,
    },

    /// Mounting an actor from a callback failed.
    #[error(transparent)]
    Mount(#[from] ConfigError),

    /// The stage queue is gone (runtime already shut down).
    #[error("stage '{stage}' is closed")]
    StageClosed { stage: String },
}

impl DispatchError {
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::StateNotFound { .. } => "dispatch_state_not_found",
            DispatchError::Timer(_) => "dispatch_timer",
            DispatchError::UnknownField(_) => "dispatch_unknown_field",
            DispatchError::Address(_) => "dispatch_bad_address",
            DispatchError::Action { .. } => "dispatch_action_failed",
            DispatchError::Mount(e) => e.as_label(),
            DispatchError::StageClosed { .. } => "dispatch_stage_closed",
        }
    }
}

/// # Errors produced by the stage runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Initial transition of an actor failed during setup.
    #[error("setup of actor '{actor}' failed: {source}")]
    Setup {
        actor: String,
        #[source]
        source: DispatchError,
    },

    /// An actor failed under `FaultPolicy::Abort`.
    #[error("actor '{actor}' failed: {source}")]
    ActorFailed {
        actor: String,
        #[source]
        source: DispatchError,
    },

    /// Shutdown grace period was exceeded; listed actors were still running.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded { grace: Duration, stuck: Vec<String> },

    /// OS signal listener could not be installed.
    #[error("signal handler: {0}")]
    Signal(#[from] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use hsmstage::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Config(e) => e.as_label(),
            RuntimeError::Setup { .. } => "runtime_setup_failed",
            RuntimeError::ActorFailed { .. } => "runtime_actor_failed",
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Signal(_) => "runtime_signal",
        }
    }
}

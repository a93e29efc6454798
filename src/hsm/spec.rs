//! # Declarative description of state trees.
//!
//! State trees are described with plain builder values and compiled into a
//! running machine when their actor is mounted. Nothing is registered implicitly:
//! children, handlers and timers are attached to the value they belong to.
//!
//! ```rust
//! use std::time::Duration;
//! use hsmstage::{MachineSpec, Outcome, StateSpec, TimerSpec};
//!
//! let door = MachineSpec::new("Door")
//!     .state(
//!         StateSpec::new("Closed")
//!             .initial()
//!             .on("Open", |ctx| {
//!                 ctx.goto("Opened");
//!                 Ok(Outcome::Handled)
//!             }),
//!     )
//!     .state(
//!         StateSpec::new("Opened")
//!             .timer(TimerSpec::new("AutoClose").after(Duration::from_secs(5)).autostart())
//!             .on("AutoClose", |ctx| {
//!                 ctx.goto("Closed");
//!                 Ok(Outcome::Handled)
//!             }),
//!     );
//! # let _ = door;
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{DispatchError, UnknownField};
use crate::event::Payload;
use crate::routing::{Guard, GuardContext};

use super::context::Context;

/// Reserved name of the implicit initial child.
pub const INIT_STATE: &str = "Init";

/// Entry or exit hook.
pub type Hook = Arc<dyn Fn(&mut Context<'_>) -> Result<(), DispatchError> + Send + Sync>;

/// Handler action.
pub type Action = Arc<dyn Fn(&mut Context<'_>) -> Result<Outcome, DispatchError> + Send + Sync>;

/// What a handler did with the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Consumed; ancestors do not see it.
    Handled,
    /// Let the enclosing states try their handlers as well.
    Up,
}

/// Handler: address pattern, optional guard and an action.
#[derive(Clone)]
pub struct HandlerSpec {
    pub(crate) name: String,
    pub(crate) pattern: String,
    pub(crate) guard: Option<Guard>,
    pub(crate) action: Action,
}

impl HandlerSpec {
    /// Handler for events matching `pattern` (1 to 4 segments, resolved against the
    /// machine). Its name defaults to the pattern.
    pub fn new<F>(pattern: impl Into<String>, action: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> Result<Outcome, DispatchError> + Send + Sync + 'static,
    {
        let pattern = pattern.into();
        Self {
            name: pattern.clone(),
            pattern,
            guard: None,
            action: Arc::new(action),
        }
    }

    /// Overrides the handler name (needed when one state has two handlers for the
    /// same pattern).
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn when<G>(mut self, guard: G) -> Self
    where
        G: Fn(&GuardContext<'_>) -> Result<bool, UnknownField> + Send + Sync + 'static,
    {
        self.guard = Some(Arc::new(guard));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for HandlerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerSpec")
            .field("name", &self.name)
            .field("pattern", &self.pattern)
            .field("guarded", &self.guard.is_some())
            .finish()
    }
}

/// Timer declaration with its defaults.
#[derive(Clone, Debug)]
pub struct TimerSpec {
    pub(crate) name: String,
    pub(crate) interval: Option<Duration>,
    pub(crate) periodic: bool,
    pub(crate) autostart: bool,
    pub(crate) event: Option<String>,
    pub(crate) payload: Payload,
}

impl TimerSpec {
    /// One-shot timer with no default interval; its event is named after the timer.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interval: None,
            periodic: false,
            autostart: false,
            event: None,
            payload: Payload::new(),
        }
    }

    /// Periodic timer firing every `interval`.
    #[must_use]
    pub fn every(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self.periodic = true;
        self
    }

    /// One-shot timer firing once after `interval`.
    #[must_use]
    pub fn after(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self.periodic = false;
        self
    }

    /// Start when the owning state is entered.
    #[must_use]
    pub fn autostart(mut self) -> Self {
        self.autostart = true;
        self
    }

    /// Event name (1 to 4 segments) injected on expiry.
    #[must_use]
    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    #[must_use]
    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Per-start overrides of a timer's defaults.
#[derive(Clone, Debug, Default)]
pub struct TimerStart {
    pub(crate) interval: Option<Duration>,
    pub(crate) periodic: Option<bool>,
    pub(crate) event: Option<String>,
    pub(crate) payload: Option<Payload>,
}

impl TimerStart {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    #[must_use]
    pub fn periodic(mut self, periodic: bool) -> Self {
        self.periodic = Some(periodic);
        self
    }

    #[must_use]
    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    #[must_use]
    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// One state: hooks, children, handlers and timers.
#[derive(Clone)]
pub struct StateSpec {
    pub(crate) name: String,
    pub(crate) initial: bool,
    pub(crate) enter: Option<Hook>,
    pub(crate) exit: Option<Hook>,
    pub(crate) children: Vec<StateSpec>,
    pub(crate) handlers: Vec<HandlerSpec>,
    pub(crate) timers: Vec<TimerSpec>,
}

impl StateSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initial: false,
            enter: None,
            exit: None,
            children: Vec::new(),
            handlers: Vec::new(),
            timers: Vec::new(),
        }
    }

    /// Flags this state as the initial child of its parent.
    #[must_use]
    pub fn initial(mut self) -> Self {
        self.initial = true;
        self
    }

    #[must_use]
    pub fn on_enter<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> Result<(), DispatchError> + Send + Sync + 'static,
    {
        self.enter = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn on_exit<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> Result<(), DispatchError> + Send + Sync + 'static,
    {
        self.exit = Some(Arc::new(hook));
        self
    }

    /// Adds an unguarded handler.
    #[must_use]
    pub fn on<F>(self, pattern: impl Into<String>, action: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> Result<Outcome, DispatchError> + Send + Sync + 'static,
    {
        self.handler(HandlerSpec::new(pattern, action))
    }

    /// Adds a guarded handler.
    #[must_use]
    pub fn on_when<G, F>(self, pattern: impl Into<String>, guard: G, action: F) -> Self
    where
        G: Fn(&GuardContext<'_>) -> Result<bool, UnknownField> + Send + Sync + 'static,
        F: Fn(&mut Context<'_>) -> Result<Outcome, DispatchError> + Send + Sync + 'static,
    {
        self.handler(HandlerSpec::new(pattern, action).when(guard))
    }

    #[must_use]
    pub fn handler(mut self, handler: HandlerSpec) -> Self {
        self.handlers.push(handler);
        self
    }

    #[must_use]
    pub fn state(mut self, child: StateSpec) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn timer(mut self, timer: TimerSpec) -> Self {
        self.timers.push(timer);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for StateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSpec")
            .field("name", &self.name)
            .field("initial", &self.initial)
            .field("children", &self.children)
            .field("handlers", &self.handlers)
            .field("timers", &self.timers)
            .finish()
    }
}

/// A machine: the root state of a tree, named after the machine.
#[derive(Clone, Debug)]
pub struct MachineSpec {
    pub(crate) root: StateSpec,
}

impl MachineSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            root: StateSpec::new(name),
        }
    }

    #[must_use]
    pub fn state(mut self, child: StateSpec) -> Self {
        self.root = self.root.state(child);
        self
    }

    /// Timer owned by the root; it stays available in every state.
    #[must_use]
    pub fn timer(mut self, timer: TimerSpec) -> Self {
        self.root = self.root.timer(timer);
        self
    }

    /// Handler on the root, tried after every active state passed on the event.
    #[must_use]
    pub fn on<F>(mut self, pattern: impl Into<String>, action: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> Result<Outcome, DispatchError> + Send + Sync + 'static,
    {
        self.root = self.root.on(pattern, action);
        self
    }

    #[must_use]
    pub fn on_when<G, F>(mut self, pattern: impl Into<String>, guard: G, action: F) -> Self
    where
        G: Fn(&GuardContext<'_>) -> Result<bool, UnknownField> + Send + Sync + 'static,
        F: Fn(&mut Context<'_>) -> Result<Outcome, DispatchError> + Send + Sync + 'static,
    {
        self.root = self.root.on_when(pattern, guard, action);
        self
    }

    #[must_use]
    pub fn handler(mut self, handler: HandlerSpec) -> Self {
        self.root = self.root.handler(handler);
        self
    }

    #[must_use]
    pub fn on_enter<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> Result<(), DispatchError> + Send + Sync + 'static,
    {
        self.root = self.root.on_enter(hook);
        self
    }

    #[must_use]
    pub fn on_exit<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> Result<(), DispatchError> + Send + Sync + 'static,
    {
        self.root = self.root.on_exit(hook);
        self
    }

    pub fn name(&self) -> &str {
        &self.root.name
    }
}

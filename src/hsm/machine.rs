//! # Hierarchical state machine.
//!
//! A [`Machine`] is a compiled [`MachineSpec`]: an arena of state nodes with the
//! root (named after the machine) at index 0. Parents are indices, so walking up
//! the tree is a loop over `parent` links.
//!
//! ## Enter / leave
//! ```text
//! enter(S): hook(S) ─► report ─► autostart timers(S) ─► active(S) = initial(S) ─► enter(initial)
//! leave(S): leave(active(S)) ─► stop all timers(S) ─► hook(S) ─► report ─► active(S) = none
//! ```
//!
//! ## Transitions
//! `goto(target)` from state S walks S, parent(S), ... up to the root and stops at
//! the first node with an immediate child named `target`; that node's active child
//! is left and `target` is entered. Reaching past the root is `StateNotFound`.
//!
//! ## Dispatch
//! Deepest active state first. At each level the first handler whose pattern
//! matches and whose guard passes runs; `Outcome::Handled` consumes the event,
//! `Outcome::Up` lets the parent level try.
//!
//! Transitions and timer operations requested by callbacks are queued and applied
//! FIFO after the callback (or the whole enter/leave chain) returns.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::address::{Address, Scope, WILDCARD};
use crate::core::{StageConfig, StageHandle};
use crate::error::{ConfigError, DispatchError, NodeKind, TimerError};
use crate::event::Event;
use crate::observe::{Report, ReportKind};
use crate::policies::MissingFieldPolicy;
use crate::routing::{Guard, GuardContext, Subscription, Verdict};

use super::context::{Command, Context};
use super::spec::{Action, Hook, INIT_STATE, MachineSpec, Outcome, StateSpec, TimerStart};
use super::timer::Timer;

/// Index of a state node inside its machine.
pub(crate) type StateId = usize;

const ROOT: StateId = 0;

struct Handler {
    name: String,
    pattern: Address,
    guard: Option<Guard>,
    action: Action,
}

struct StateNode {
    name: Arc<str>,
    /// Dotted path from the root, root included.
    path: Arc<str>,
    parent: Option<StateId>,
    children: Vec<StateId>,
    initial: Option<StateId>,
    active: Option<StateId>,
    enter: Option<Hook>,
    exit: Option<Hook>,
    handlers: Vec<Handler>,
    timers: Vec<Timer>,
}

#[derive(Clone, Copy)]
enum HookKind {
    Enter,
    Exit,
}

/// Returns true for names usable as state, handler, timer, machine or actor names.
pub(crate) fn valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('.') && name != WILDCARD && !name.contains('*')
}

pub(crate) struct Machine {
    scope: Scope,
    nodes: Vec<StateNode>,
    entered: bool,
    missing_field: MissingFieldPolicy,
}

impl Machine {
    /// Compiles `spec` for the machine addressed by `scope`.
    pub(crate) fn compile(
        spec: MachineSpec,
        scope: Scope,
        cfg: &StageConfig,
    ) -> Result<Self, ConfigError> {
        let mut machine = Self {
            scope,
            nodes: Vec::new(),
            entered: false,
            missing_field: cfg.missing_field,
        };
        machine.add_state(spec.root, None, cfg.strict_initial)?;
        Ok(machine)
    }

    fn add_state(
        &mut self,
        spec: StateSpec,
        parent: Option<StateId>,
        strict: bool,
    ) -> Result<StateId, ConfigError> {
        let StateSpec {
            name,
            initial: _,
            enter,
            exit,
            children,
            handlers,
            timers,
        } = spec;

        let path: Arc<str> = match parent {
            Some(p) => Arc::from(format!("{}.{}", self.nodes[p].path, name)),
            None => Arc::from(name.as_str()),
        };
        let kind = if parent.is_some() { NodeKind::State } else { NodeKind::Machine };

        let mut compiled_handlers = Vec::with_capacity(handlers.len());
        let mut seen = HashSet::new();
        for h in handlers {
            if !seen.insert(h.name.clone()) {
                return Err(ConfigError::Duplicate {
                    kind: NodeKind::Handler,
                    name: h.name,
                    parent_kind: kind,
                    parent: name,
                });
            }
            let pattern = self.scope.resolve(&h.pattern).map_err(|source| ConfigError::Address {
                kind: NodeKind::Handler,
                name: h.name.clone(),
                parent: path.to_string(),
                source,
            })?;
            compiled_handlers.push(Handler {
                name: h.name,
                pattern,
                guard: h.guard,
                action: h.action,
            });
        }

        let mut compiled_timers = Vec::with_capacity(timers.len());
        let mut seen = HashSet::new();
        for t in timers {
            if !valid_name(&t.name) {
                return Err(ConfigError::InvalidName {
                    kind: NodeKind::Timer,
                    name: t.name,
                    parent_kind: kind,
                    parent: name,
                });
            }
            if !seen.insert(t.name.clone()) {
                return Err(ConfigError::Duplicate {
                    kind: NodeKind::Timer,
                    name: t.name,
                    parent_kind: kind,
                    parent: name,
                });
            }
            if let Some(event) = &t.event {
                self.scope.resolve(event).map_err(|source| ConfigError::Address {
                    kind: NodeKind::Timer,
                    name: t.name.clone(),
                    parent: path.to_string(),
                    source,
                })?;
            }
            compiled_timers.push(Timer::new(t));
        }

        let initial = Self::pick_initial(&name, &children, strict)?;

        let id = self.nodes.len();
        self.nodes.push(StateNode {
            name: Arc::from(name.as_str()),
            path,
            parent,
            children: Vec::with_capacity(children.len()),
            initial: None,
            active: None,
            enter,
            exit,
            handlers: compiled_handlers,
            timers: compiled_timers,
        });

        let mut seen = HashSet::new();
        for (i, child) in children.into_iter().enumerate() {
            if !valid_name(&child.name) {
                return Err(ConfigError::InvalidName {
                    kind: NodeKind::State,
                    name: child.name,
                    parent_kind: kind,
                    parent: name,
                });
            }
            if !seen.insert(child.name.clone()) {
                return Err(ConfigError::Duplicate {
                    kind: NodeKind::State,
                    name: child.name,
                    parent_kind: kind,
                    parent: name,
                });
            }
            let child_id = self.add_state(child, Some(id), strict)?;
            self.nodes[id].children.push(child_id);
            if initial == Some(i) {
                self.nodes[id].initial = Some(child_id);
            }
        }
        Ok(id)
    }

    /// Index of the initial child: explicit flag, else `Init`, else the first child.
    fn pick_initial(
        parent: &str,
        children: &[StateSpec],
        strict: bool,
    ) -> Result<Option<usize>, ConfigError> {
        let mut flagged: Option<usize> = None;
        for (i, c) in children.iter().enumerate().filter(|(_, c)| c.initial) {
            if let Some(first) = flagged {
                return Err(ConfigError::MultipleInitial {
                    parent: parent.to_string(),
                    first: children[first].name.clone(),
                    second: c.name.clone(),
                });
            }
            flagged = Some(i);
        }
        if flagged.is_some() {
            return Ok(flagged);
        }
        if let Some(i) = children.iter().position(|c| c.name == INIT_STATE) {
            return Ok(Some(i));
        }
        if children.is_empty() {
            return Ok(None);
        }
        if strict {
            return Err(ConfigError::NoInitialState {
                parent: parent.to_string(),
            });
        }
        Ok(Some(0))
    }

    pub(crate) fn name(&self) -> &str {
        self.scope.machine()
    }

    /// One subscription per handler, in tree order.
    pub(crate) fn subscriptions(&self) -> Vec<Subscription> {
        let subscriber: Arc<str> = Arc::from(self.scope.actor());
        self.nodes
            .iter()
            .flat_map(|n| n.handlers.iter())
            .map(|h| Subscription {
                pattern: h.pattern.clone(),
                subscriber: Arc::clone(&subscriber),
                scope: self.scope.clone(),
                guard: h.guard.clone(),
            })
            .collect()
    }

    /// Names of the active states from the root down to the leaf.
    #[cfg(test)]
    pub(crate) fn active_path(&self) -> Vec<&str> {
        if !self.entered {
            return Vec::new();
        }
        let mut path = vec![&*self.nodes[ROOT].name];
        let mut cur = self.nodes[ROOT].active;
        while let Some(id) = cur {
            path.push(&self.nodes[id].name);
            cur = self.nodes[id].active;
        }
        path
    }

    fn is_active(&self, id: StateId) -> bool {
        if !self.entered {
            return false;
        }
        let mut cur = id;
        while let Some(parent) = self.nodes[cur].parent {
            if self.nodes[parent].active != Some(cur) {
                return false;
            }
            cur = parent;
        }
        true
    }

    // ---------------------------
    // Public operations
    // ---------------------------

    /// Leaves the machine if entered, then enters it from the root.
    pub(crate) fn reset(&mut self, stage: &StageHandle) -> Result<(), DispatchError> {
        let mut pending = VecDeque::new();
        self.reset_with(stage, &mut pending)?;
        self.drain(stage, &mut pending)
    }

    /// Dispatches `ev`; returns whether some handler consumed it.
    pub(crate) fn dispatch(
        &mut self,
        ev: &Event,
        stage: &StageHandle,
    ) -> Result<bool, DispatchError> {
        if !self.entered {
            return Ok(false);
        }
        let mut pending = VecDeque::new();
        let handled = self.dispatch_at(ROOT, ev, stage, &mut pending)?;
        self.drain(stage, &mut pending)?;
        Ok(handled)
    }

    // ---------------------------
    // Internals
    // ---------------------------

    fn reset_with(
        &mut self,
        stage: &StageHandle,
        pending: &mut VecDeque<Command>,
    ) -> Result<(), DispatchError> {
        if self.entered {
            self.leave_chain(ROOT, stage, pending)?;
        }
        self.entered = true;
        self.enter_chain(ROOT, stage, pending)
    }

    fn dispatch_at(
        &self,
        id: StateId,
        ev: &Event,
        stage: &StageHandle,
        pending: &mut VecDeque<Command>,
    ) -> Result<bool, DispatchError> {
        let node = &self.nodes[id];
        if let Some(child) = node.active {
            if self.dispatch_at(child, ev, stage, pending)? {
                return Ok(true);
            }
        }

        for h in &node.handlers {
            if !h.pattern.matches(ev.to()) {
                continue;
            }
            let gctx = GuardContext::new(&self.scope, Some(&*node.name), ev);
            if !Verdict::of(h.guard.as_ref(), &gctx).resolve(self.missing_field)? {
                continue;
            }
            trace!(
                machine = %self.scope.machine(),
                state = %node.path,
                handler = %h.name,
                event = %ev.to(),
                "handler"
            );
            let mut ctx = Context::new(&self.scope, &node.name, id, ev, stage, pending);
            return match (h.action)(&mut ctx)? {
                Outcome::Handled => Ok(true),
                Outcome::Up => Ok(false),
            };
        }
        Ok(false)
    }

    fn run_hook(
        &self,
        id: StateId,
        which: HookKind,
        stage: &StageHandle,
        pending: &mut VecDeque<Command>,
    ) -> Result<(), DispatchError> {
        let node = &self.nodes[id];
        let hook = match which {
            HookKind::Enter => node.enter.as_ref(),
            HookKind::Exit => node.exit.as_ref(),
        };
        if let Some(hook) = hook {
            let ev = Event::lifecycle(&self.scope);
            let mut ctx = Context::new(&self.scope, &node.name, id, &ev, stage, pending);
            hook(&mut ctx)?;
        }
        Ok(())
    }

    fn report(&self, stage: &StageHandle, kind: ReportKind, id: StateId) {
        stage.report(
            Report::new(kind)
                .with_actor(self.scope.actor())
                .with_machine(self.scope.machine())
                .with_state(Arc::clone(&self.nodes[id].path)),
        );
    }

    fn enter_chain(
        &mut self,
        id: StateId,
        stage: &StageHandle,
        pending: &mut VecDeque<Command>,
    ) -> Result<(), DispatchError> {
        self.run_hook(id, HookKind::Enter, stage, pending)?;
        debug!(machine = %self.scope.machine(), state = %self.nodes[id].path, "enter");
        self.report(stage, ReportKind::StateEntered, id);

        for idx in 0..self.nodes[id].timers.len() {
            if self.nodes[id].timers[idx].autostart() {
                self.start_timer_at(id, idx, TimerStart::default(), stage)?;
            }
        }

        if let Some(initial) = self.nodes[id].initial {
            self.nodes[id].active = Some(initial);
            self.enter_chain(initial, stage, pending)?;
        }
        Ok(())
    }

    fn leave_chain(
        &mut self,
        id: StateId,
        stage: &StageHandle,
        pending: &mut VecDeque<Command>,
    ) -> Result<(), DispatchError> {
        if let Some(child) = self.nodes[id].active.take() {
            self.leave_chain(child, stage, pending)?;
        }

        let node = &mut self.nodes[id];
        for timer in &mut node.timers {
            timer.stop(&self.scope, &node.path, stage);
        }

        self.run_hook(id, HookKind::Exit, stage, pending)?;
        debug!(machine = %self.scope.machine(), state = %self.nodes[id].path, "exit");
        self.report(stage, ReportKind::StateExited, id);
        Ok(())
    }

    fn goto(
        &mut self,
        origin: StateId,
        target: &str,
        stage: &StageHandle,
        pending: &mut VecDeque<Command>,
    ) -> Result<(), DispatchError> {
        let mut cur = Some(origin);
        while let Some(id) = cur {
            let found = self.nodes[id]
                .children
                .iter()
                .copied()
                .find(|&c| &*self.nodes[c].name == target);

            if let Some(next) = found {
                if !self.is_active(id) {
                    warn!(
                        machine = %self.scope.machine(),
                        state = %self.nodes[origin].path,
                        target,
                        "transition requested from a state that is no longer active; ignored"
                    );
                    return Ok(());
                }
                if let Some(current) = self.nodes[id].active.take() {
                    self.leave_chain(current, stage, pending)?;
                }
                self.nodes[id].active = Some(next);
                return self.enter_chain(next, stage, pending);
            }
            cur = self.nodes[id].parent;
        }

        Err(DispatchError::StateNotFound {
            target: target.to_string(),
            from: self.nodes[origin].name.to_string(),
            machine: self.scope.machine().to_string(),
        })
    }

    /// Finds `timer` in `origin` or its nearest ancestor owning one with that name.
    fn locate_timer(&self, origin: StateId, timer: &str) -> Result<(StateId, usize), TimerError> {
        let mut cur = Some(origin);
        while let Some(id) = cur {
            if let Some(idx) = self.nodes[id].timers.iter().position(|t| t.name() == timer) {
                return Ok((id, idx));
            }
            cur = self.nodes[id].parent;
        }
        Err(TimerError::Unknown {
            timer: timer.to_string(),
            state: self.nodes[origin].name.to_string(),
            machine: self.scope.machine().to_string(),
        })
    }

    /// Timers only run while their owning state is active; a start queued by a
    /// callback whose state has been left since is dropped.
    fn owner_active(&self, id: StateId, timer: &str) -> bool {
        if self.is_active(id) {
            return true;
        }
        warn!(
            machine = %self.scope.machine(),
            state = %self.nodes[id].path,
            timer,
            "timer start requested for a state that is no longer active; ignored"
        );
        false
    }

    fn start_timer_at(
        &mut self,
        id: StateId,
        idx: usize,
        start: TimerStart,
        stage: &StageHandle,
    ) -> Result<(), DispatchError> {
        let node = &mut self.nodes[id];
        node.timers[idx].start(start, &self.scope, &node.path, stage)?;
        Ok(())
    }

    fn drain(
        &mut self,
        stage: &StageHandle,
        pending: &mut VecDeque<Command>,
    ) -> Result<(), DispatchError> {
        while let Some(cmd) = pending.pop_front() {
            match cmd {
                Command::Goto { origin, target } => self.goto(origin, &target, stage, pending)?,
                Command::Reset => self.reset_with(stage, pending)?,
                Command::StartTimer { origin, timer, start } => {
                    let (id, idx) = self.locate_timer(origin, &timer)?;
                    if self.owner_active(id, &timer) {
                        self.start_timer_at(id, idx, start, stage)?;
                    }
                }
                Command::StopTimer { origin, timer } => {
                    let (id, idx) = self.locate_timer(origin, &timer)?;
                    let node = &mut self.nodes[id];
                    node.timers[idx].stop(&self.scope, &node.path, stage);
                }
                Command::RestartTimer { origin, timer } => {
                    let (id, idx) = self.locate_timer(origin, &timer)?;
                    if !self.owner_active(id, &timer) {
                        continue;
                    }
                    let node = &mut self.nodes[id];
                    node.timers[idx].restart(&self.scope, &node.path, stage)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use tokio::sync::mpsc;

    use crate::event::Payload;
    use crate::hsm::{StateSpec, TimerSpec};

    type Log = Arc<Mutex<Vec<String>>>;

    fn log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    /// State whose entry and exit hooks append to `log`.
    fn traced(name: &str, log: &Log) -> StateSpec {
        let (enter, exit) = (log.clone(), log.clone());
        StateSpec::new(name)
            .on_enter(move |ctx| {
                enter.lock().unwrap().push(format!("enter {}", ctx.state()));
                Ok(())
            })
            .on_exit(move |ctx| {
                exit.lock().unwrap().push(format!("exit {}", ctx.state()));
                Ok(())
            })
    }

    type Compiled = (Machine, StageHandle, mpsc::UnboundedReceiver<Event>);

    fn compile_with(spec: MachineSpec, cfg: StageConfig) -> Result<Compiled, ConfigError> {
        let (stage, inbox) = StageHandle::detached("Lab", cfg);
        let machine = Machine::compile(spec, Scope::new("Lab", "Door", "Main"), stage.config())?;
        Ok((machine, stage, inbox))
    }

    fn started(spec: MachineSpec) -> (Machine, StageHandle, mpsc::UnboundedReceiver<Event>) {
        let (mut m, stage, inbox) = compile_with(spec, StageConfig::default()).unwrap();
        m.reset(&stage).unwrap();
        (m, stage, inbox)
    }

    fn ev(name: &str) -> Event {
        Event::new(
            Address::new("Lab", "Peer", "Ctl", ""),
            Address::new("Lab", "Door", "Main", name),
            Payload::new(),
        )
    }

    fn goto_on(state: StateSpec, event: &str, target: &'static str) -> StateSpec {
        state.on(event, move |ctx| {
            ctx.goto(target);
            Ok(Outcome::Handled)
        })
    }

    #[test]
    fn enter_chain_ends_on_one_leaf_entering_each_ancestor_once() {
        let l = log();
        let spec = MachineSpec::new("Main")
            .state(traced("A", &l).state(traced("X", &l)).state(traced("Init", &l)))
            .state(traced("B", &l));
        let (m, _stage, _inbox) = started(spec);

        assert_eq!(entries(&l), vec!["enter A", "enter Init"]);
        assert_eq!(m.active_path(), vec!["Main", "A", "Init"]);
    }

    #[test]
    fn explicit_flag_beats_init_and_first_child() {
        let spec = MachineSpec::new("Main")
            .state(StateSpec::new("First"))
            .state(StateSpec::new("Init"))
            .state(StateSpec::new("Flagged").initial());
        let (m, _stage, _inbox) = started(spec);
        assert_eq!(m.active_path(), vec!["Main", "Flagged"]);

        let spec = MachineSpec::new("Main")
            .state(StateSpec::new("First"))
            .state(StateSpec::new("Second"));
        let (m, _stage, _inbox) = started(spec);
        assert_eq!(m.active_path(), vec!["Main", "First"]);
    }

    #[test]
    fn structural_errors_are_rejected() {
        let cfg = StageConfig::default;

        let two_flags = MachineSpec::new("Main")
            .state(StateSpec::new("A").initial())
            .state(StateSpec::new("B").initial());
        assert!(matches!(
            compile_with(two_flags, cfg()),
            Err(ConfigError::MultipleInitial { ref first, ref second, .. })
                if first == "A" && second == "B"
        ));

        let twins = MachineSpec::new("Main")
            .state(StateSpec::new("A"))
            .state(StateSpec::new("A"));
        assert!(matches!(
            compile_with(twins, cfg()),
            Err(ConfigError::Duplicate { kind: NodeKind::State, .. })
        ));

        let dotted = MachineSpec::new("Main").state(StateSpec::new("a.b"));
        assert!(matches!(
            compile_with(dotted, cfg()),
            Err(ConfigError::InvalidName { kind: NodeKind::State, .. })
        ));

        let bad_pattern = MachineSpec::new("Main").on("a..b", |_| Ok(Outcome::Handled));
        assert!(matches!(
            compile_with(bad_pattern, cfg()),
            Err(ConfigError::Address { kind: NodeKind::Handler, .. })
        ));

        let twin_timers = MachineSpec::new("Main")
            .timer(TimerSpec::new("T"))
            .timer(TimerSpec::new("T"));
        assert!(matches!(
            compile_with(twin_timers, cfg()),
            Err(ConfigError::Duplicate { kind: NodeKind::Timer, .. })
        ));
    }

    #[test]
    fn strict_mode_requires_an_initial_designation() {
        let strict = StageConfig {
            strict_initial: true,
            ..StageConfig::default()
        };
        let spec = MachineSpec::new("Main")
            .state(StateSpec::new("A"))
            .state(StateSpec::new("B"));
        assert!(matches!(
            compile_with(spec, strict.clone()),
            Err(ConfigError::NoInitialState { .. })
        ));

        let spec = MachineSpec::new("Main")
            .state(StateSpec::new("A"))
            .state(StateSpec::new("Init"));
        assert!(compile_with(spec, strict).is_ok());
    }

    #[test]
    fn goto_resolves_to_the_nearest_ancestor_with_that_child() {
        let spec = MachineSpec::new("Main")
            .state(
                StateSpec::new("A")
                    .state(goto_on(StateSpec::new("X"), "Go", "Y"))
                    .state(goto_on(StateSpec::new("Y"), "Go", "Missing")),
            )
            .state(StateSpec::new("Y"));
        let (mut m, stage, _inbox) = started(spec);
        assert_eq!(m.active_path(), vec!["Main", "A", "X"]);

        assert!(m.dispatch(&ev("Go"), &stage).unwrap());
        assert_eq!(m.active_path(), vec!["Main", "A", "Y"]);

        let err = m.dispatch(&ev("Go"), &stage).unwrap_err();
        match err {
            DispatchError::StateNotFound { target, from, machine } => {
                assert_eq!(
                    (target.as_str(), from.as_str(), machine.as_str()),
                    ("Missing", "Y", "Main")
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn transition_leaves_innermost_first_then_enters() {
        let l = log();
        let spec = MachineSpec::new("Main")
            .state(goto_on(traced("A", &l).state(traced("Inner", &l)), "Go", "B"))
            .state(traced("B", &l));
        let (mut m, stage, _inbox) = started(spec);
        l.lock().unwrap().clear();

        assert!(m.dispatch(&ev("Go"), &stage).unwrap());
        assert_eq!(entries(&l), vec!["exit Inner", "exit A", "enter B"]);
        assert_eq!(m.active_path(), vec!["Main", "B"]);
    }

    #[test]
    fn deepest_state_first_and_up_passes_to_the_parent() {
        let l = log();
        let (inner, outer, root) = (l.clone(), l.clone(), l.clone());
        let spec = MachineSpec::new("Main")
            .on("Ping", move |_| {
                root.lock().unwrap().push("root".into());
                Ok(Outcome::Handled)
            })
            .state(
                StateSpec::new("A")
                    .on("Ping", move |_| {
                        outer.lock().unwrap().push("outer".into());
                        Ok(Outcome::Handled)
                    })
                    .state(StateSpec::new("Leaf").on("Ping", move |_| {
                        inner.lock().unwrap().push("inner".into());
                        Ok(Outcome::Up)
                    })),
            );
        let (mut m, stage, _inbox) = started(spec);

        assert!(m.dispatch(&ev("Ping"), &stage).unwrap());
        assert_eq!(entries(&l), vec!["inner", "outer"]);
        assert!(!m.dispatch(&ev("Pong"), &stage).unwrap());
    }

    #[test]
    fn first_matching_handler_of_a_level_decides() {
        let l = log();
        let (first, second) = (l.clone(), l.clone());
        let spec = MachineSpec::new("Main").state(
            StateSpec::new("Init")
                .on("*", move |_| {
                    first.lock().unwrap().push("any".into());
                    Ok(Outcome::Up)
                })
                .on("Ping", move |_| {
                    second.lock().unwrap().push("ping".into());
                    Ok(Outcome::Handled)
                }),
        );
        let (mut m, stage, _inbox) = started(spec);

        assert!(!m.dispatch(&ev("Ping"), &stage).unwrap());
        assert_eq!(entries(&l), vec!["any"]);
    }

    #[test]
    fn guard_with_missing_field_follows_policy() {
        let spec = || {
            MachineSpec::new("Main").state(StateSpec::new("Init").on_when(
                "Line",
                |g| Ok(g.field_str("line")? == "quit"),
                |_| Ok(Outcome::Handled),
            ))
        };

        let (mut m, stage, _inbox) = started(spec());
        assert!(!m.dispatch(&ev("Line"), &stage).unwrap());

        let quit = Event::new(
            Address::new("Lab", "Peer", "Ctl", ""),
            Address::new("Lab", "Door", "Main", "Line"),
            Payload::new().with("line", "quit"),
        );
        assert!(m.dispatch(&quit, &stage).unwrap());

        let fail = StageConfig {
            missing_field: MissingFieldPolicy::Fail,
            ..StageConfig::default()
        };
        let (mut m, stage, _inbox) = compile_with(spec(), fail).unwrap();
        m.reset(&stage).unwrap();
        assert!(matches!(
            m.dispatch(&ev("Line"), &stage),
            Err(DispatchError::UnknownField(ref e)) if e.field == "line"
        ));
    }

    #[test]
    fn reset_leaves_everything_and_reenters_initial_states() {
        let l = log();
        let spec = MachineSpec::new("Main")
            .state(goto_on(traced("Init", &l), "Go", "Other"))
            .state(traced("Other", &l).on("Reset", |ctx| {
                ctx.reset();
                Ok(Outcome::Handled)
            }));
        let (mut m, stage, _inbox) = started(spec);
        m.dispatch(&ev("Go"), &stage).unwrap();
        l.lock().unwrap().clear();

        m.dispatch(&ev("Reset"), &stage).unwrap();
        assert_eq!(entries(&l), vec!["exit Other", "enter Init"]);
        assert_eq!(m.active_path(), vec!["Main", "Init"]);
    }

    #[test]
    fn hooks_see_a_lifecycle_event_from_their_own_machine() {
        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        let spec = MachineSpec::new("Main").state(StateSpec::new("Init").on_enter(move |ctx| {
            let ev = ctx.event();
            *slot.lock().unwrap() = Some((ev.name().to_string(), ev.from().to_string()));
            Ok(())
        }));
        let _m = started(spec);
        assert_eq!(
            seen.lock().unwrap().clone(),
            Some((String::new(), "Lab.Door.Main.".to_string()))
        );
    }

    #[test]
    fn signal_and_reply_resolve_against_different_origins() {
        let spec = MachineSpec::new("Main").state(StateSpec::new("Init").on("Ping", |ctx| {
            ctx.signal("Log", Payload::new())?;
            ctx.signal("Other.Ping", Payload::new())?;
            ctx.reply("Pong", Payload::new().with("n", 1))?;
            Ok(Outcome::Handled)
        }));
        let (mut m, stage, mut inbox) = started(spec);
        m.dispatch(&ev("Ping"), &stage).unwrap();

        let to: Vec<String> = std::iter::from_fn(|| inbox.try_recv().ok())
            .map(|e| e.to().to_string())
            .collect();
        assert_eq!(
            to,
            vec!["Lab.Door.Main.Log", "Lab.Door.Other.Ping", "Lab.Peer.Ctl.Pong"]
        );
    }

    #[test]
    fn transition_from_an_exit_hook_of_a_left_state_is_ignored() {
        let spec = MachineSpec::new("Main")
            .state(
                goto_on(StateSpec::new("A"), "Go", "B").on_exit(|ctx| {
                    ctx.goto("Init");
                    Ok(())
                })
                .state(StateSpec::new("Init")),
            )
            .state(StateSpec::new("B"));
        let (mut m, stage, _inbox) = started(spec);
        m.dispatch(&ev("Go"), &stage).unwrap();
        assert_eq!(m.active_path(), vec!["Main", "B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_timer_fires_while_active_and_never_after_leaving() {
        let spec = MachineSpec::new("Main")
            .state(
                goto_on(StateSpec::new("Ticking"), "Stop", "Idle")
                    .timer(TimerSpec::new("Tick").every(Duration::from_millis(10)).autostart()),
            )
            .state(StateSpec::new("Idle"));
        let (mut m, stage, mut inbox) = started(spec);

        tokio::time::sleep(Duration::from_millis(55)).await;
        let mut fired = 0;
        while let Ok(e) = inbox.try_recv() {
            assert_eq!(e.to().to_string(), "Lab.Door.Main.Tick");
            fired += 1;
        }
        assert!(fired >= 2, "fired {fired} times");

        m.dispatch(&ev("Stop"), &stage).unwrap();
        assert!(!m.nodes[1].timers[0].is_running());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(inbox.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn start_overrides_and_restart_reuse_parameters() {
        let spec = MachineSpec::new("Main")
            .timer(TimerSpec::new("Once").payload(Payload::new().with("k", "default")))
            .state(
                StateSpec::new("Init")
                    .on("Arm", |ctx| {
                        ctx.start_timer_with(
                            "Once",
                            TimerStart::new()
                                .interval(Duration::from_millis(5))
                                .event("Other.Ping"),
                        );
                        Ok(Outcome::Handled)
                    })
                    .on("Again", |ctx| {
                        ctx.restart_timer("Once");
                        ctx.stop_timer("Once");
                        ctx.stop_timer("Once");
                        ctx.restart_timer("Once");
                        Ok(Outcome::Handled)
                    }),
            );
        let (mut m, stage, mut inbox) = started(spec);

        m.dispatch(&ev("Arm"), &stage).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let e = inbox.try_recv().unwrap();
        assert_eq!(e.to().to_string(), "Lab.Door.Other.Ping");
        assert_eq!(e.field_str("k").unwrap(), "default");
        assert!(inbox.try_recv().is_err());

        m.dispatch(&ev("Again"), &stage).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(inbox.try_recv().unwrap().name(), "Ping");
        assert!(inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn timer_misuse_is_a_dispatch_error() {
        let spec = MachineSpec::new("Main")
            .timer(TimerSpec::new("Bare"))
            .state(
                StateSpec::new("Init")
                    .on("Unknown", |ctx| {
                        ctx.start_timer("Nope");
                        Ok(Outcome::Handled)
                    })
                    .on("Bare", |ctx| {
                        ctx.start_timer("Bare");
                        Ok(Outcome::Handled)
                    })
                    .on("Zero", |ctx| {
                        ctx.start_timer_with("Bare", TimerStart::new().interval(Duration::ZERO));
                        Ok(Outcome::Handled)
                    }),
            );
        let (mut m, stage, _inbox) = started(spec);

        assert!(matches!(
            m.dispatch(&ev("Unknown"), &stage),
            Err(DispatchError::Timer(TimerError::Unknown { ref timer, .. })) if timer == "Nope"
        ));
        assert!(matches!(
            m.dispatch(&ev("Bare"), &stage),
            Err(DispatchError::Timer(TimerError::NoInterval { .. }))
        ));
        assert!(matches!(
            m.dispatch(&ev("Zero"), &stage),
            Err(DispatchError::Timer(TimerError::ZeroInterval { .. }))
        ));
    }

    #[test]
    fn one_subscription_per_handler() {
        let spec = MachineSpec::new("Main")
            .on("*.*.*.*", |_| Ok(Outcome::Up))
            .state(StateSpec::new("Init").on("Ping", |_| Ok(Outcome::Handled)));
        let (m, _stage, _inbox) = compile_with(spec, StageConfig::default()).unwrap();
        let subs = m.subscriptions();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].pattern, Address::any());
        assert_eq!(subs[1].pattern.to_string(), "Lab.Door.Main.Ping");
        assert!(subs.iter().all(|s| &*s.subscriber == "Door"));
    }

    fn drained(inbox: &mut mpsc::UnboundedReceiver<Event>) -> usize {
        std::iter::from_fn(|| inbox.try_recv().ok()).count()
    }

    #[tokio::test(start_paused = true)]
    async fn timer_start_queued_behind_a_transition_is_dropped() {
        let spec = MachineSpec::new("Main")
            .state(
                StateSpec::new("A")
                    .timer(TimerSpec::new("T").every(Duration::from_millis(10)))
                    .on("Go", |ctx| {
                        ctx.goto("B");
                        ctx.start_timer("T");
                        Ok(Outcome::Handled)
                    })
                    .on("Again", |ctx| {
                        ctx.goto("B");
                        ctx.restart_timer("T");
                        Ok(Outcome::Handled)
                    }),
            )
            .state(goto_on(StateSpec::new("B"), "Back", "A"));
        let (mut m, stage, mut inbox) = started(spec);

        m.dispatch(&ev("Go"), &stage).unwrap();
        assert_eq!(m.active_path(), vec!["Main", "B"]);
        assert!(!m.nodes[1].timers[0].is_running());

        m.dispatch(&ev("Back"), &stage).unwrap();
        m.dispatch(&ev("Again"), &stage).unwrap();
        assert!(!m.nodes[1].timers[0].is_running());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(drained(&mut inbox), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exit_hook_cannot_start_a_timer_of_the_state_being_left() {
        let spec = MachineSpec::new("Main")
            .state(
                goto_on(StateSpec::new("A"), "Go", "B")
                    .timer(TimerSpec::new("T").every(Duration::from_millis(10)))
                    .on_exit(|ctx| {
                        ctx.start_timer("T");
                        Ok(())
                    }),
            )
            .state(StateSpec::new("B"));
        let (mut m, stage, mut inbox) = started(spec);

        m.dispatch(&ev("Go"), &stage).unwrap();
        assert_eq!(m.active_path(), vec!["Main", "B"]);
        assert!(!m.nodes[1].timers[0].is_running());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(drained(&mut inbox), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_an_ancestor_stops_manually_started_timers_below_it() {
        let spec = MachineSpec::new("Main")
            .state(
                goto_on(StateSpec::new("Outer"), "Leave", "Away").state(
                    StateSpec::new("Inner")
                        .timer(TimerSpec::new("T").every(Duration::from_millis(10)))
                        .on("Arm", |ctx| {
                            ctx.start_timer("T");
                            Ok(Outcome::Handled)
                        }),
                ),
            )
            .state(StateSpec::new("Away"));
        let (mut m, stage, mut inbox) = started(spec);
        assert_eq!(m.active_path(), vec!["Main", "Outer", "Inner"]);
        assert!(!m.nodes[2].timers[0].is_running());

        m.dispatch(&ev("Arm"), &stage).unwrap();
        assert!(m.nodes[2].timers[0].is_running());
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(drained(&mut inbox) >= 2);

        m.dispatch(&ev("Leave"), &stage).unwrap();
        assert_eq!(m.active_path(), vec!["Main", "Away"]);
        assert!(!m.nodes[2].timers[0].is_running());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(drained(&mut inbox), 0);
    }
}

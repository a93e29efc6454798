//! # Compiled actor.
//!
//! An [`Actor`] owns its machines. It is driven by exactly one worker, which is
//! the only code ever touching the machines after setup.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::address::Scope;
use crate::core::{StageConfig, StageHandle};
use crate::error::{ConfigError, DispatchError, NodeKind};
use crate::event::Event;
use crate::hsm::{Machine, valid_name};
use crate::observe::{Report, ReportKind};
use crate::routing::Subscription;

use super::spec::ActorSpec;

pub(crate) struct Actor {
    name: Arc<str>,
    machines: Vec<Machine>,
    ready: bool,
}

impl Actor {
    /// Validates `spec` and compiles its machines for `stage`.
    pub(crate) fn compile(
        spec: ActorSpec,
        stage: &str,
        cfg: &StageConfig,
    ) -> Result<Self, ConfigError> {
        if !valid_name(&spec.name) {
            return Err(ConfigError::InvalidName {
                kind: NodeKind::Actor,
                name: spec.name,
                parent_kind: NodeKind::Stage,
                parent: stage.to_string(),
            });
        }

        let mut seen = HashSet::new();
        let mut machines = Vec::with_capacity(spec.machines.len());
        for m in spec.machines {
            let name = m.name().to_string();
            if !valid_name(&name) {
                return Err(ConfigError::InvalidName {
                    kind: NodeKind::Machine,
                    name,
                    parent_kind: NodeKind::Actor,
                    parent: spec.name,
                });
            }
            if !seen.insert(name.clone()) {
                return Err(ConfigError::Duplicate {
                    kind: NodeKind::Machine,
                    name,
                    parent_kind: NodeKind::Actor,
                    parent: spec.name,
                });
            }
            let scope = Scope::new(stage, spec.name.as_str(), name.as_str());
            machines.push(Machine::compile(m, scope, cfg)?);
        }

        Ok(Self {
            name: Arc::from(spec.name),
            machines,
            ready: false,
        })
    }

    pub(crate) fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.ready
    }

    /// Subscriptions of every handler of every machine.
    pub(crate) fn subscriptions(&self) -> Vec<Subscription> {
        self.machines.iter().flat_map(|m| m.subscriptions()).collect()
    }

    /// Drives every machine into its initial configuration.
    pub(crate) fn setup(&mut self, stage: &StageHandle) -> Result<(), DispatchError> {
        for m in &mut self.machines {
            m.reset(stage)?;
        }
        self.ready = true;
        stage.report(Report::new(ReportKind::ActorMounted).with_actor(Arc::clone(&self.name)));
        Ok(())
    }

    /// Dispatches `ev` into every machine in order. Returns whether any consumed it.
    pub(crate) fn dispatch(
        &mut self,
        ev: &Event,
        stage: &StageHandle,
    ) -> Result<bool, DispatchError> {
        let mut handled = false;
        for m in &mut self.machines {
            handled |= m.dispatch(ev, stage)?;
        }
        if !handled {
            debug!(actor = %self.name, event = %ev.to(), "event unhandled");
            stage.report(
                Report::new(ReportKind::EventUnhandled)
                    .with_actor(Arc::clone(&self.name))
                    .with_event(ev.to().to_string()),
            );
        }
        Ok(handled)
    }

    #[cfg(test)]
    pub(crate) fn machine(&self, name: &str) -> Option<&Machine> {
        self.machines.iter().find(|m| m.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::event::Payload;
    use crate::hsm::{MachineSpec, Outcome, StateSpec};

    fn cfg() -> StageConfig {
        StageConfig::default()
    }

    fn ping_to(actor: &str, machine: &str) -> Event {
        Event::new(
            Address::new("Lab", "Peer", "Main", ""),
            Address::new("Lab", actor, machine, "Ping"),
            Payload::new(),
        )
    }

    fn pinged(name: &str) -> MachineSpec {
        MachineSpec::new(name).state(StateSpec::new("Init").on("Ping", |_| Ok(Outcome::Handled)))
    }

    #[test]
    fn duplicate_and_invalid_names_are_rejected() {
        let twins = ActorSpec::new("Door").machine(pinged("Main")).machine(pinged("Main"));
        assert!(matches!(
            Actor::compile(twins, "Lab", &cfg()),
            Err(ConfigError::Duplicate { kind: NodeKind::Machine, .. })
        ));

        let starred = ActorSpec::new("Do*r");
        assert!(matches!(
            Actor::compile(starred, "Lab", &cfg()),
            Err(ConfigError::InvalidName { kind: NodeKind::Actor, .. })
        ));

        let dotted = ActorSpec::new("Door").machine(pinged("A.B"));
        assert!(matches!(
            Actor::compile(dotted, "Lab", &cfg()),
            Err(ConfigError::InvalidName { kind: NodeKind::Machine, .. })
        ));
    }

    #[test]
    fn handlers_subscribe_in_their_own_machine_scope() {
        let spec = ActorSpec::new("Door").machine(pinged("Main")).machine(pinged("Aux"));
        let actor = Actor::compile(spec, "Lab", &cfg()).unwrap();
        let patterns: Vec<String> = actor
            .subscriptions()
            .iter()
            .map(|s| s.pattern.to_string())
            .collect();
        assert_eq!(patterns, vec!["Lab.Door.Main.Ping", "Lab.Door.Aux.Ping"]);
    }

    #[tokio::test]
    async fn setup_enters_every_machine_and_reports_mount() {
        let (stage, _inbox) = StageHandle::detached("Lab", cfg());
        let mut reports = stage.reports();
        let spec = ActorSpec::new("Door").machine(pinged("Main")).machine(pinged("Aux"));
        let mut actor = Actor::compile(spec, "Lab", stage.config()).unwrap();
        assert!(!actor.is_ready());

        actor.setup(&stage).unwrap();
        assert!(actor.is_ready());
        assert_eq!(actor.machine("Main").unwrap().active_path(), vec!["Main", "Init"]);
        assert_eq!(actor.machine("Aux").unwrap().active_path(), vec!["Aux", "Init"]);

        let mut kinds = Vec::new();
        while let Ok(r) = reports.try_recv() {
            kinds.push(r.kind);
        }
        assert_eq!(kinds.last(), Some(&ReportKind::ActorMounted));
        assert_eq!(kinds.iter().filter(|k| **k == ReportKind::StateEntered).count(), 4);
    }

    #[tokio::test]
    async fn unhandled_events_are_reported() {
        let (stage, _inbox) = StageHandle::detached("Lab", cfg());
        let spec = ActorSpec::new("Door").machine(pinged("Main"));
        let mut actor = Actor::compile(spec, "Lab", stage.config()).unwrap();
        actor.setup(&stage).unwrap();
        let mut reports = stage.reports();

        assert!(actor.dispatch(&ping_to("Door", "Main"), &stage).unwrap());
        assert!(!actor.dispatch(&ping_to("Door", "Other"), &stage).unwrap());

        let r = reports.try_recv().unwrap();
        assert_eq!(r.kind, ReportKind::EventUnhandled);
        assert_eq!(r.event.as_deref(), Some("Lab.Door.Other.Ping"));
        assert!(reports.try_recv().is_err());
    }
}

//! # Actor descriptions and actor kinds.
//!
//! [`ActorSpec`] is the description of one actor: a name and its machines.
//!
//! [`ActorKind`] describes a *family* of actors sharing the same machines, for
//! code that creates actors on demand (one per accepted connection, one per
//! device). A kind is a `const` value made of build steps; a kind may extend a
//! parent kind, whose steps run first.
//!
//! ```rust
//! use hsmstage::{ActorKind, ActorSpec, MachineSpec, Outcome, StateSpec};
//!
//! fn echo(spec: ActorSpec) -> ActorSpec {
//!     spec.machine(MachineSpec::new("Echo").state(StateSpec::new("Init").on("Line", |ctx| {
//!         ctx.reply("Line", ctx.payload().clone())?;
//!         Ok(Outcome::Handled)
//!     })))
//! }
//!
//! fn audit(spec: ActorSpec) -> ActorSpec {
//!     spec.machine(MachineSpec::new("Audit"))
//! }
//!
//! static SESSION: ActorKind = ActorKind::new("Session", &[echo]);
//! static AUDITED: ActorKind = ActorKind::new("AuditedSession", &[audit]).extends(&SESSION);
//!
//! let spec = AUDITED.instantiate("conn-1");
//! assert_eq!(spec.machine_names(), vec!["Echo", "Audit"]);
//! ```

use crate::hsm::MachineSpec;

/// Description of one actor.
#[derive(Clone, Debug)]
pub struct ActorSpec {
    pub(crate) name: String,
    pub(crate) machines: Vec<MachineSpec>,
}

impl ActorSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            machines: Vec::new(),
        }
    }

    /// Adds a machine; machines receive every event in the order they were added.
    #[must_use]
    pub fn machine(mut self, machine: MachineSpec) -> Self {
        self.machines.push(machine);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn machine_names(&self) -> Vec<&str> {
        self.machines.iter().map(|m| m.name()).collect()
    }
}

/// One build step of an [`ActorKind`].
pub type BuildStep = fn(ActorSpec) -> ActorSpec;

/// Const descriptor of a family of actors.
#[derive(Debug)]
pub struct ActorKind {
    name: &'static str,
    parent: Option<&'static ActorKind>,
    steps: &'static [BuildStep],
}

impl ActorKind {
    pub const fn new(name: &'static str, steps: &'static [BuildStep]) -> Self {
        Self {
            name,
            parent: None,
            steps,
        }
    }

    /// Runs `parent`'s steps before this kind's own.
    pub const fn extends(mut self, parent: &'static ActorKind) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Builds the description of a new actor of this kind.
    pub fn instantiate(&self, name: impl Into<String>) -> ActorSpec {
        let base = match self.parent {
            Some(parent) => parent.instantiate(name),
            None => ActorSpec::new(name),
        };
        self.steps.iter().fold(base, |spec, step| step(spec))
    }
}

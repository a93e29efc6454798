//! Actors: named owners of state machines.

#[allow(clippy::module_inception)]
mod actor;
mod spec;

pub(crate) use actor::Actor;
pub use spec::{ActorKind, ActorSpec, BuildStep};

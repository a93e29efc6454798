//! Hierarchical state machines: declarative specs, the compiled machine, the
//! callback context and state-owned timers.

mod context;
mod machine;
mod spec;
mod timer;

pub use context::Context;
pub(crate) use machine::{Machine, valid_name};
pub use spec::{
    Action, HandlerSpec, Hook, INIT_STATE, MachineSpec, Outcome, StateSpec, TimerSpec, TimerStart,
};

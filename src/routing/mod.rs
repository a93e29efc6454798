//! Event routing: subscriptions, guards and per-publish deduplication.

mod guard;
mod router;

pub use guard::{Guard, GuardContext, Verdict, guard};
pub(crate) use router::{Router, Subscription};

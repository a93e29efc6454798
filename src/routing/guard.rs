//! # Guards and their verdicts.
//!
//! A [`Guard`] is a predicate over a [`GuardContext`]. It returns
//! `Result<bool, UnknownField>`: reading an undefined payload field through
//! [`GuardContext::field`] and propagating with `?` yields a
//! [`Verdict::FieldMissing`], which is resolved by
//! [`MissingFieldPolicy`](crate::MissingFieldPolicy).
//!
//! ```rust
//! use hsmstage::{guard, GuardContext};
//!
//! let long_lines = guard(|ctx: &GuardContext<'_>| {
//!     Ok(ctx.field_str("line")?.len() > 80)
//! });
//! # let _ = long_lines;
//! ```

use std::sync::Arc;

use serde_json::Value;

use crate::address::Scope;
use crate::error::UnknownField;
use crate::event::Event;
use crate::policies::MissingFieldPolicy;

/// Shared guard predicate.
pub type Guard = Arc<dyn Fn(&GuardContext<'_>) -> Result<bool, UnknownField> + Send + Sync>;

/// Wraps a closure into a [`Guard`].
pub fn guard<F>(f: F) -> Guard
where
    F: Fn(&GuardContext<'_>) -> Result<bool, UnknownField> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Read-only view handed to guards.
///
/// Router guards see the subscribing machine's scope and no state; handler guards
/// additionally see the name of the state owning the handler.
pub struct GuardContext<'a> {
    scope: &'a Scope,
    state: Option<&'a str>,
    event: &'a Event,
}

impl<'a> GuardContext<'a> {
    pub(crate) fn new(scope: &'a Scope, state: Option<&'a str>, event: &'a Event) -> Self {
        Self {
            scope,
            state,
            event,
        }
    }

    pub fn stage(&self) -> &str {
        self.scope.stage()
    }

    pub fn actor(&self) -> &str {
        self.scope.actor()
    }

    pub fn machine(&self) -> &str {
        self.scope.machine()
    }

    /// Owning state, `None` when evaluated by the router.
    pub fn state(&self) -> Option<&str> {
        self.state
    }

    pub fn event(&self) -> &Event {
        self.event
    }

    /// Payload field of the event; `Err` when undefined.
    pub fn field(&self, name: &str) -> Result<&Value, UnknownField> {
        self.event.field(name)
    }

    pub fn field_str(&self, name: &str) -> Result<&str, UnknownField> {
        self.event.field_str(name)
    }
}

/// Outcome of evaluating a guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Match,
    NoMatch,
    /// The guard read a field the event does not carry.
    FieldMissing(UnknownField),
}

impl Verdict {
    /// Evaluates an optional guard; no guard always matches.
    pub(crate) fn of(guard: Option<&Guard>, ctx: &GuardContext<'_>) -> Self {
        match guard {
            None => Verdict::Match,
            Some(g) => g(ctx).into(),
        }
    }

    /// Resolves the verdict to a yes/no under `policy`.
    ///
    /// Only `MissingFieldPolicy::Fail` can produce an error.
    pub fn resolve(self, policy: MissingFieldPolicy) -> Result<bool, UnknownField> {
        match (self, policy) {
            (Verdict::Match, _) => Ok(true),
            (Verdict::NoMatch, _) => Ok(false),
            (Verdict::FieldMissing(_), MissingFieldPolicy::NoMatch) => Ok(false),
            (Verdict::FieldMissing(_), MissingFieldPolicy::Match) => Ok(true),
            (Verdict::FieldMissing(e), MissingFieldPolicy::Fail) => Err(e),
        }
    }
}

impl From<Result<bool, UnknownField>> for Verdict {
    fn from(r: Result<bool, UnknownField>) -> Self {
        match r {
            Ok(true) => Verdict::Match,
            Ok(false) => Verdict::NoMatch,
            Err(e) => Verdict::FieldMissing(e),
        }
    }
}

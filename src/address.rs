//! # Four-part hierarchical addresses.
//!
//! Every event carries a destination [`Address`] made of four segments:
//!
//! ```text
//!   stage . actor . machine . event
//! ```
//!
//! Each segment is either a name or the wildcard `*`. Two addresses match when
//! every pair of segments is equal or at least one side of the pair is `*`.
//!
//! ## Contextual resolution
//! Address strings written by users may carry fewer than four segments. They are
//! right-aligned onto the event slot and the missing leading segments are taken
//! from the caller's [`Scope`] (never from wildcards):
//!
//! ```text
//! scope = Lab.Sender.Main
//!
//!   "Ping"                 → Lab.Sender.Main.Ping
//!   "Other.Ping"           → Lab.Sender.Other.Ping
//!   "Recv.Other.Ping"      → Lab.Recv.Other.Ping
//!   "*.*.*.*"              → *.*.*.*
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::AddressError;

/// Wildcard segment value.
pub const WILDCARD: &str = "*";

/// Number of segments in a fully resolved address.
const SEGMENTS: usize = 4;

/// Returns true when two segments match (equal, or either side is `*`).
#[inline]
pub fn segment_matches(a: &str, b: &str) -> bool {
    a == WILDCARD || b == WILDCARD || a == b
}

/// Fully resolved `(stage, actor, machine, event)` key.
///
/// Cheap to clone: each segment is an `Arc<str>`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Address {
    stage: Arc<str>,
    actor: Arc<str>,
    machine: Arc<str>,
    event: Arc<str>,
}

impl Address {
    /// Builds an address from its four segments.
    ///
    /// No validation is performed; use [`Address::parse`] for untrusted input.
    pub fn new(
        stage: impl Into<Arc<str>>,
        actor: impl Into<Arc<str>>,
        machine: impl Into<Arc<str>>,
        event: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            stage: stage.into(),
            actor: actor.into(),
            machine: machine.into(),
            event: event.into(),
        }
    }

    /// Address matching every event of every machine on every stage.
    pub fn any() -> Self {
        Self::new(WILDCARD, WILDCARD, WILDCARD, WILDCARD)
    }

    /// Parses a fully qualified `stage.actor.machine.event` string.
    ///
    /// The event segment may be empty (origin addresses render as `S.A.M.`);
    /// every other segment must be non-empty.
    ///
    /// # Example
    /// ```
    /// use hsmstage::Address;
    ///
    /// let a = Address::parse("Lab.Sender.Main.Ping").unwrap();
    /// assert_eq!(a.event(), "Ping");
    /// assert_eq!(Address::parse(&a.to_string()).unwrap(), a);
    /// ```
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let parts: Vec<&str> = input.split('.').collect();
        if parts.len() > SEGMENTS {
            return Err(AddressError::TooManySegments {
                input: input.to_string(),
                count: parts.len(),
            });
        }
        if parts.len() < SEGMENTS {
            return Err(AddressError::Incomplete {
                input: input.to_string(),
            });
        }
        if parts[..SEGMENTS - 1].iter().any(|p| p.is_empty()) {
            return Err(AddressError::EmptySegment {
                input: input.to_string(),
            });
        }
        Ok(Self::new(parts[0], parts[1], parts[2], parts[3]))
    }

    /// Parses a 1..=4 segment string and fills missing leading segments from `scope`.
    pub fn resolve(input: &str, scope: &Scope) -> Result<Self, AddressError> {
        let parts: Vec<&str> = input.split('.').collect();
        if parts.len() > SEGMENTS {
            return Err(AddressError::TooManySegments {
                input: input.to_string(),
                count: parts.len(),
            });
        }
        if parts.iter().any(|p| p.is_empty()) {
            return Err(AddressError::EmptySegment {
                input: input.to_string(),
            });
        }

        let mut slots: [Option<Arc<str>>; SEGMENTS] = [None, None, None, None];
        let offset = SEGMENTS - parts.len();
        for (i, part) in parts.iter().enumerate() {
            slots[offset + i] = Some(Arc::from(*part));
        }
        let [stage, actor, machine, event] = slots;

        Ok(Self {
            stage: stage.unwrap_or_else(|| scope.stage.clone()),
            actor: actor.unwrap_or_else(|| scope.actor.clone()),
            machine: machine.unwrap_or_else(|| scope.machine.clone()),
            event: event.unwrap_or_else(|| Arc::from("")),
        })
    }

    #[inline]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    #[inline]
    pub fn actor(&self) -> &str {
        &self.actor
    }

    #[inline]
    pub fn machine(&self) -> &str {
        &self.machine
    }

    #[inline]
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Scope (stage/actor/machine) this address points into.
    pub fn scope(&self) -> Scope {
        Scope {
            stage: self.stage.clone(),
            actor: self.actor.clone(),
            machine: self.machine.clone(),
        }
    }

    /// Per-segment wildcard match. Symmetric.
    pub fn matches(&self, other: &Address) -> bool {
        segment_matches(&self.stage, &other.stage)
            && segment_matches(&self.actor, &other.actor)
            && segment_matches(&self.machine, &other.machine)
            && segment_matches(&self.event, &other.event)
    }

    /// True when no segment is a wildcard.
    pub fn is_concrete(&self) -> bool {
        [self.stage(), self.actor(), self.machine(), self.event()]
            .iter()
            .all(|s| *s != WILDCARD)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.stage, self.actor, self.machine, self.event
        )
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

/// The `(stage, actor, machine)` triple a callback runs in.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Scope {
    stage: Arc<str>,
    actor: Arc<str>,
    machine: Arc<str>,
}

impl Scope {
    pub fn new(
        stage: impl Into<Arc<str>>,
        actor: impl Into<Arc<str>>,
        machine: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            stage: stage.into(),
            actor: actor.into(),
            machine: machine.into(),
        }
    }

    #[inline]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    #[inline]
    pub fn actor(&self) -> &str {
        &self.actor
    }

    #[inline]
    pub fn machine(&self) -> &str {
        &self.machine
    }

    /// Origin address of this scope (empty event segment).
    pub fn origin(&self) -> Address {
        Address {
            stage: self.stage.clone(),
            actor: self.actor.clone(),
            machine: self.machine.clone(),
            event: Arc::from(""),
        }
    }

    /// Resolves `input` against this scope. See [`Address::resolve`].
    pub fn resolve(&self, input: &str) -> Result<Address, AddressError> {
        Address::resolve(input, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> Scope {
        Scope::new("Lab", "Sender", "Main")
    }

    fn samples() -> Vec<Address> {
        vec![
            Address::new("Lab", "Sender", "Main", "Ping"),
            Address::new("Lab", "Sender", "Main", "Pong"),
            Address::new("Lab", "Recv", "Main", "Ping"),
            Address::new("Lab", "*", "Main", "Ping"),
            Address::new("*", "*", "*", "*"),
            Address::new("Other", "Sender", "*", "Ping"),
            Address::new("Lab", "Sender", "Main", "*"),
        ]
    }

    #[test]
    fn short_names_resolve_against_scope() {
        let s = scope();
        assert_eq!(
            s.resolve("Ping").unwrap(),
            Address::new("Lab", "Sender", "Main", "Ping")
        );
        assert_eq!(
            s.resolve("Aux.Ping").unwrap(),
            Address::new("Lab", "Sender", "Aux", "Ping")
        );
        assert_eq!(
            s.resolve("Recv.Aux.Ping").unwrap(),
            Address::new("Lab", "Recv", "Aux", "Ping")
        );
        assert_eq!(
            s.resolve("Far.Recv.Aux.Ping").unwrap(),
            Address::new("Far", "Recv", "Aux", "Ping")
        );
    }

    #[test]
    fn wildcards_are_kept_verbatim_never_filled_in() {
        let a = scope().resolve("*.Ping").unwrap();
        assert_eq!(a, Address::new("Lab", "Sender", "*", "Ping"));
        assert_eq!(scope().resolve("*.*.*.*").unwrap(), Address::any());
    }

    #[test]
    fn resolve_rejects_bad_input() {
        assert!(matches!(
            scope().resolve("a.b.c.d.e"),
            Err(AddressError::TooManySegments { count: 5, .. })
        ));
        assert!(matches!(
            scope().resolve("a..b"),
            Err(AddressError::EmptySegment { .. })
        ));
        assert!(matches!(
            scope().resolve(""),
            Err(AddressError::EmptySegment { .. })
        ));
    }

    #[test]
    fn matching_is_symmetric() {
        let all = samples();
        for a in &all {
            for b in &all {
                assert_eq!(a.matches(b), b.matches(a), "{a} vs {b}");
            }
        }
    }

    #[test]
    fn concrete_matching_is_equality() {
        let concrete: Vec<Address> = samples().into_iter().filter(|a| a.is_concrete()).collect();
        assert!(concrete.len() >= 3);
        for a in &concrete {
            for b in &concrete {
                assert_eq!(a.matches(b), a == b, "{a} vs {b}");
            }
        }
    }

    #[test]
    fn wildcard_segment_matches_anything() {
        let pattern = Address::new("Lab", "*", "Main", "Ping");
        assert!(pattern.matches(&Address::new("Lab", "Anyone", "Main", "Ping")));
        assert!(!pattern.matches(&Address::new("Lab", "Anyone", "Main", "Pong")));
    }

    #[test]
    fn display_round_trips() {
        for a in samples() {
            assert_eq!(Address::parse(&a.to_string()).unwrap(), a);
        }
        let origin = scope().origin();
        assert_eq!(origin.to_string(), "Lab.Sender.Main.");
        assert_eq!(origin.to_string().parse::<Address>().unwrap(), origin);
    }

    #[test]
    fn parse_requires_four_segments() {
        assert!(matches!(
            Address::parse("Main.Ping"),
            Err(AddressError::Incomplete { .. })
        ));
        assert!(matches!(
            Address::parse(".Sender.Main.Ping"),
            Err(AddressError::EmptySegment { .. })
        ));
    }
}

//! # Addressed events and their payload.
//!
//! An [`Event`] travels from an origin [`Address`] (event segment empty) to a fully
//! resolved destination. Its [`Payload`] is an opaque string-keyed map of JSON values.
//!
//! Field access is explicit: [`Event::field`] returns `Err(UnknownField)` for an
//! undefined field instead of panicking, so guards can turn a missing field into a
//! no-match verdict (see [`Verdict`](crate::Verdict)).
//!
//! ## Example
//! ```rust
//! use hsmstage::{Address, Event, Payload};
//!
//! let ev = Event::new(
//!     Address::new("Lab", "Sender", "Main", ""),
//!     Address::new("Lab", "Recv", "Main", "Ping"),
//!     Payload::new().with("count", 3),
//! );
//! assert_eq!(ev.name(), "Ping");
//! assert_eq!(ev.field("count").unwrap().as_i64(), Some(3));
//! assert!(ev.field("missing").is_err());
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::address::{Address, Scope};
use crate::error::UnknownField;

/// Key/value payload carried by an [`Event`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload {
    fields: Map<String, Value>,
}

impl Payload {
    /// Empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the payload with `key` set to `value`.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Sets `key`, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    /// Looks up `key`; `None` when undefined.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Merges `other` into `self`; keys from `other` win.
    pub fn merge(&mut self, other: Payload) {
        for (k, v) in other.fields {
            self.fields.insert(k, v);
        }
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Payload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Addressed message routed by the stage.
///
/// The payload is shared behind an `Arc`: the router clones events once per
/// delivered actor, which only bumps reference counts.
#[derive(Clone, Debug)]
pub struct Event {
    from: Address,
    to: Address,
    payload: Arc<Payload>,
}

impl Event {
    pub fn new(from: Address, to: Address, payload: Payload) -> Self {
        Self {
            from,
            to,
            payload: Arc::new(payload),
        }
    }

    /// Synthetic event handed to entry/exit hooks: empty event name, addressed to and
    /// from the machine's own scope.
    pub(crate) fn lifecycle(scope: &Scope) -> Self {
        let origin = scope.origin();
        Self::new(origin.clone(), origin, Payload::new())
    }

    /// Origin address (event segment is empty).
    #[inline]
    pub fn from(&self) -> &Address {
        &self.from
    }

    /// Fully resolved destination address.
    #[inline]
    pub fn to(&self) -> &Address {
        &self.to
    }

    /// Event name (last segment of the destination).
    #[inline]
    pub fn name(&self) -> &str {
        self.to.event()
    }

    #[inline]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Defined/undefined lookup of a payload field.
    pub fn field(&self, name: &str) -> Result<&Value, UnknownField> {
        self.payload.get(name).ok_or_else(|| UnknownField {
            field: name.to_string(),
            event: self.to.to_string(),
        })
    }

    /// String field shortcut; a field holding a non-string counts as undefined.
    pub fn field_str(&self, name: &str) -> Result<&str, UnknownField> {
        self.field(name)?.as_str().ok_or_else(|| UnknownField {
            field: name.to_string(),
            event: self.to.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ping(payload: Payload) -> Event {
        let scope = Scope::new("Lab", "Sender", "Main");
        Event::new(scope.origin(), scope.resolve("Ping").unwrap(), payload)
    }

    #[test]
    fn defined_fields_are_returned() {
        let ev = ping(Payload::new().with("line", "hello").with("n", 2));
        assert_eq!(ev.field_str("line").unwrap(), "hello");
        assert_eq!(ev.field("n").unwrap().as_u64(), Some(2));
        assert_eq!(ev.name(), "Ping");
        assert_eq!(ev.from().event(), "");
    }

    #[test]
    fn undefined_field_is_an_error_naming_field_and_event() {
        let ev = ping(Payload::new());
        let err = ev.field("line").unwrap_err();
        assert_eq!(err.field, "line");
        assert_eq!(err.event, "Lab.Sender.Main.Ping");
        assert!(err.to_string().contains("line"));
    }

    #[test]
    fn non_string_field_is_undefined_for_field_str() {
        let ev = ping(Payload::new().with("n", 2));
        assert!(ev.field_str("n").is_err());
    }

    #[test]
    fn merge_overrides_existing_keys() {
        let mut base = Payload::new().with("a", 1).with("b", 1);
        base.merge(Payload::new().with("b", 2));
        assert_eq!(base.get("a"), Some(&Value::from(1)));
        assert_eq!(base.get("b"), Some(&Value::from(2)));
        assert_eq!(base.len(), 2);
    }
}

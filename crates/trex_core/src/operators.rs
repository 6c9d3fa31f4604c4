//! Declarative update operators.
//!
//! An operator placed in an [`Update`] is not stored verbatim. When the update
//! is applied, the operator runs against the field value the transaction sees
//! at that moment, and its result is written instead.

use crate::error::{StoreError, StoreResult};
use crate::value::{Fields, Node, Value, NULL};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// A deferred update command resolved against the live field value.
pub trait Operator: Send + Sync + fmt::Debug {
    /// Name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Computes the new field value from the current one.
    fn execute(&self, current: &Value) -> StoreResult<Value>;
}

/// Appends an item to a list.
#[derive(Debug, Clone)]
pub struct Push {
    item: Value,
}

impl Push {
    /// Creates a push of `item`.
    pub fn new(item: impl Into<Value>) -> Self {
        Self { item: item.into() }
    }
}

impl Operator for Push {
    fn name(&self) -> &'static str {
        "push"
    }

    fn execute(&self, current: &Value) -> StoreResult<Value> {
        let Value::List(items) = current else {
            return Err(StoreError::operator_type(self.name(), current));
        };
        let mut appended = Vec::with_capacity(items.len() + 1);
        appended.extend(items.iter().cloned());
        appended.push(self.item.clone());
        Ok(Value::List(Arc::new(appended)))
    }
}

/// Adds a constant step to a number. Integers saturate.
#[derive(Debug, Clone, Copy)]
pub struct Step {
    name: &'static str,
    delta: i64,
}

impl Step {
    /// Increment by one.
    pub const INC: Step = Step {
        name: "inc",
        delta: 1,
    };

    /// Decrement by one.
    pub const DEC: Step = Step {
        name: "dec",
        delta: -1,
    };
}

impl Operator for Step {
    fn name(&self) -> &'static str {
        self.name
    }

    #[allow(clippy::cast_precision_loss)]
    fn execute(&self, current: &Value) -> StoreResult<Value> {
        match current {
            Value::Integer(n) => Ok(Value::Integer(n.saturating_add(self.delta))),
            Value::Float(n) => Ok(Value::Float(n + self.delta as f64)),
            other => Err(StoreError::operator_type(self.name, other)),
        }
    }
}

/// One field change of an [`Update`].
#[derive(Debug, Clone)]
pub enum Change {
    /// Write the value as is.
    Value(Value),
    /// Write the result of an operator.
    Operator(Arc<dyn Operator>),
}

impl Change {
    /// Wraps a custom operator.
    pub fn operator(op: impl Operator + 'static) -> Self {
        Change::Operator(Arc::new(op))
    }

    /// Resolves this change against the current field value.
    pub fn resolve(&self, current: &Value) -> StoreResult<Value> {
        match self {
            Change::Value(value) => Ok(value.clone()),
            Change::Operator(op) => {
                let value = op.execute(current)?;
                trace!(operator = op.name(), "operator resolved");
                Ok(value)
            }
        }
    }

    /// Returns the operator, if this change is one.
    pub fn as_operator(&self) -> Option<&Arc<dyn Operator>> {
        match self {
            Change::Operator(op) => Some(op),
            Change::Value(_) => None,
        }
    }
}

impl<T: Into<Value>> From<T> for Change {
    fn from(value: T) -> Self {
        Change::Value(value.into())
    }
}

/// Appends `item` to a list field.
pub fn push(item: impl Into<Value>) -> Change {
    Change::operator(Push::new(item))
}

/// Increments a numeric field.
pub fn inc() -> Change {
    Change::operator(Step::INC)
}

/// Decrements a numeric field.
pub fn dec() -> Change {
    Change::operator(Step::DEC)
}

/// A partial field map to merge into a slice.
///
/// ```
/// use trex_core::{inc, push, Update};
///
/// let update = Update::new()
///     .set("name", "Ada")
///     .set("visits", inc())
///     .set("tags", push("math"));
/// assert_eq!(update.len(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Update {
    changes: BTreeMap<String, Change>,
}

impl Update {
    /// Creates an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field change.
    #[must_use]
    pub fn set(mut self, field: impl Into<String>, change: impl Into<Change>) -> Self {
        self.changes.insert(field.into(), change.into());
        self
    }

    /// Returns the number of changed fields.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns true if no field is changed.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Iterates over field changes in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Change)> {
        self.changes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Resolves every change against the fields of `target`.
    pub fn resolve(&self, target: &Node) -> StoreResult<Fields> {
        self.changes
            .iter()
            .map(|(field, change)| {
                let current = target.get(field).unwrap_or(&NULL);
                Ok((field.clone(), change.resolve(current)?))
            })
            .collect()
    }
}

impl From<Fields> for Update {
    fn from(fields: Fields) -> Self {
        fields.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<Change>> FromIterator<(K, V)> for Update {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            changes: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;

    #[test]
    fn push_appends_without_mutating() {
        let old = Value::from(vec![1, 2]);
        let new = push(3).resolve(&old).unwrap();

        assert_eq!(new, Value::from(vec![1, 2, 3]));
        assert_eq!(old, Value::from(vec![1, 2]));
        assert!(!new.same(&old));
    }

    #[test]
    fn steps_on_numbers() {
        assert_eq!(inc().resolve(&Value::from(1)).unwrap(), Value::from(2));
        assert_eq!(dec().resolve(&Value::from(1)).unwrap(), Value::from(0));
        assert_eq!(inc().resolve(&Value::from(0.5)).unwrap(), Value::from(1.5));
        assert_eq!(
            inc().resolve(&Value::Integer(i64::MAX)).unwrap(),
            Value::Integer(i64::MAX)
        );
    }

    #[test]
    fn type_mismatch_is_an_error() {
        let err = inc().resolve(&Value::from("x")).unwrap_err();
        assert!(matches!(
            err,
            StoreError::OperatorType {
                operator: "inc",
                found: "text"
            }
        ));

        let err = push(1).resolve(&Value::from(Node::empty())).unwrap_err();
        assert!(matches!(
            err,
            StoreError::OperatorType {
                operator: "push",
                found: "map"
            }
        ));
    }

    #[test]
    fn update_resolves_against_target() {
        let target = Node::new(fields! { "count" => 4, "items" => vec!["a"] });
        let update = Update::new()
            .set("count", inc())
            .set("items", push("b"))
            .set("name", "x");

        let fields = update.resolve(&target).unwrap();
        assert_eq!(fields["count"], Value::from(5));
        assert_eq!(fields["items"], Value::from(vec!["a", "b"]));
        assert_eq!(fields["name"], Value::from("x"));
    }

    #[test]
    fn update_from_fields() {
        let update = Update::from(fields! { "a" => 1, "b" => true });
        assert_eq!(update.len(), 2);
        assert!(update.iter().all(|(_, change)| change.as_operator().is_none()));
    }
}

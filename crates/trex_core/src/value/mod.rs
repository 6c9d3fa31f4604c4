//! The state tree value model.
//!
//! State is a graph of [`Value`]s whose maps are [`Node`]s: reference-counted,
//! immutable-once-shared field maps carrying a version stamp. Two values are
//! the *same* when they are identical (pointer-equal maps and lists, equal
//! scalars); they are *equal* when they are structurally equal.

mod convert;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Field map of a node.
pub type Fields = BTreeMap<String, Value>;

pub(crate) static NULL: Value = Value::Null;

/// A dynamic state value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Null or absent value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// Text string.
    Text(Arc<str>),
    /// Sequence of values. Replaced wholesale, never merged.
    List(Arc<Vec<Value>>),
    /// Nested map.
    Map(Node),
}

impl Value {
    /// Returns a short name of the value kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a float; integers are widened.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as text, if it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as a list, if it is one.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Get this value as a node, if it is a map.
    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Map(node) => Some(node),
            _ => None,
        }
    }

    /// Identity comparison.
    ///
    /// Maps and lists are the same only when they are the same allocation;
    /// scalars compare by value. A differing result means "changed".
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Map(a), Value::Map(b)) => Node::ptr_eq(a, b),
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
            (Value::Text(a), Value::Text(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

#[derive(Clone, Default)]
struct NodeData {
    version: u64,
    epoch: u64,
    fields: Fields,
}

/// A map node of the state tree.
///
/// Cloning a `Node` is cheap and shares the underlying map. A node that has
/// been published is never mutated; writers produce new nodes and relink
/// their ancestors.
#[derive(Clone, Default)]
pub struct Node(Arc<NodeData>);

impl Node {
    /// Creates a node with the given fields and version zero.
    pub fn new(fields: Fields) -> Self {
        Self(Arc::new(NodeData {
            version: 0,
            epoch: 0,
            fields,
        }))
    }

    /// Creates an empty node.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the version stamp, incremented each time this node is cloned for a write.
    pub fn version(&self) -> u64 {
        self.0.version
    }

    /// Gets a field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.fields.get(field)
    }

    /// Returns true if the field is present.
    pub fn contains(&self, field: &str) -> bool {
        self.0.fields.contains_key(field)
    }

    /// Returns all fields.
    pub fn fields(&self) -> &Fields {
        &self.0.fields
    }

    /// Iterates over fields in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.0.fields.len()
    }

    /// Returns true if the node has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.fields.is_empty()
    }

    /// Returns true if both handles point at the same node.
    pub fn ptr_eq(a: &Node, b: &Node) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.0.epoch
    }

    /// Returns true when no other handle shares this node.
    pub(crate) fn is_unique(&mut self) -> bool {
        Arc::get_mut(&mut self.0).is_some()
    }

    /// Copies the node for a write in `epoch`, bumping its version.
    pub(crate) fn forked(&self, epoch: u64) -> Node {
        Node(Arc::new(NodeData {
            version: self.0.version + 1,
            epoch,
            fields: self.0.fields.clone(),
        }))
    }

    /// Copies a node already forked in `epoch`, keeping its version.
    pub(crate) fn copied(&self) -> Node {
        Node(Arc::new(NodeData::clone(&self.0)))
    }

    /// Raises the version above `floor`, copying the node if it is shared.
    pub(crate) fn raise_version(&mut self, floor: u64) {
        if self.0.version <= floor {
            Arc::make_mut(&mut self.0).version = floor + 1;
        }
    }

    /// Mutable access to the fields of a uniquely owned node.
    pub(crate) fn fields_mut(&mut self) -> &mut Fields {
        &mut Arc::make_mut(&mut self.0).fields
    }

    /// Returns a new node with `field` set, outside any transaction.
    pub(crate) fn with_field(&self, field: &str, value: Value) -> Node {
        let mut node = self.forked(0);
        node.fields_mut().insert(field.to_string(), value);
        node
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Node::ptr_eq(self, other) || self.0.fields == other.0.fields
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{} ", self.0.version)?;
        f.debug_map().entries(self.0.fields.iter()).finish()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Node {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Node::new(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;

    #[test]
    fn same_is_identity_for_maps() {
        let a = Node::new(fields! { "id" => 1 });
        let b = Node::new(fields! { "id" => 1 });

        assert_eq!(a, b);
        assert!(!Value::Map(a.clone()).same(&Value::Map(b)));
        assert!(Value::Map(a.clone()).same(&Value::Map(a)));
    }

    #[test]
    fn same_is_value_equality_for_scalars() {
        assert!(Value::from(3).same(&Value::from(3)));
        assert!(Value::from("x").same(&Value::from("x")));
        assert!(!Value::from(3).same(&Value::from(3.0)));
        assert!(Value::Null.same(&Value::Null));
    }

    #[test]
    fn forked_bumps_version_and_copied_keeps_it() {
        let node = Node::new(fields! { "a" => 1 });
        let forked = node.forked(9);
        assert_eq!(forked.version(), 1);
        assert_eq!(forked.epoch(), 9);
        assert!(!Node::ptr_eq(&node, &forked));

        let copied = forked.copied();
        assert_eq!(copied.version(), 1);
        assert_eq!(copied.epoch(), 9);
    }

    #[test]
    fn uniqueness_tracks_sharing() {
        let mut node = Node::new(fields! { "a" => 1 });
        assert!(node.is_unique());
        let reader = node.clone();
        assert!(!node.is_unique());
        drop(reader);
        assert!(node.is_unique());
    }

    #[test]
    fn with_field_leaves_original_untouched() {
        let node = Node::new(fields! { "a" => 1 });
        let updated = node.with_field("b", Value::from(2));
        assert!(node.get("b").is_none());
        assert_eq!(updated.get("b"), Some(&Value::from(2)));
        assert_eq!(updated.version(), 1);
    }

    #[test]
    fn kind_names() {
        assert_eq!(Value::Null.kind(), "null");
        assert_eq!(Value::from(vec![1, 2]).kind(), "list");
        assert_eq!(Value::from(Node::empty()).kind(), "map");
    }
}

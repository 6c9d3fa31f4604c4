//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random state trees, paths and
//! updates.

use proptest::prelude::*;
use std::collections::BTreeMap;
use trex_core::{Fields, Node, Path, Value};

/// Strategy for generating a single path segment.
pub fn segment_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,7}").expect("Invalid regex")
}

/// Strategy for generating non-root paths of one to four segments.
pub fn path_strategy() -> impl Strategy<Value = Path> {
    prop::collection::vec(segment_strategy(), 1..5)
        .prop_map(|segments| Path::parse(&segments.join(".")).expect("generated path is valid"))
}

/// Strategy for generating scalar values.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        (-1.0e9f64..1.0e9).prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Value::from),
    ]
}

/// Strategy for generating arbitrary values, maps and lists included.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
            prop::collection::btree_map(segment_strategy(), inner, 0..4)
                .prop_map(|fields| Value::from(Node::new(fields))),
        ]
    })
}

/// Strategy for generating field maps.
pub fn fields_strategy() -> impl Strategy<Value = Fields> {
    prop::collection::btree_map(segment_strategy(), value_strategy(), 0..6)
}

/// Strategy for generating scalar-only field maps.
pub fn scalar_fields_strategy() -> impl Strategy<Value = Fields> {
    prop::collection::btree_map(segment_strategy(), scalar_strategy(), 1..6)
}

/// Strategy for generating map nodes.
pub fn node_strategy() -> impl Strategy<Value = Node> {
    fields_strategy().prop_map(Node::new)
}

/// Strategy for generating a state with two branches, `left` and `right`,
/// each holding scalar fields.
pub fn branched_state_strategy() -> impl Strategy<Value = Node> {
    (scalar_fields_strategy(), scalar_fields_strategy()).prop_map(|(left, right)| {
        let mut fields = BTreeMap::new();
        fields.insert("left".to_string(), Value::from(Node::new(left)));
        fields.insert("right".to_string(), Value::from(Node::new(right)));
        Node::new(fields)
    })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to generate.
    pub cases: u32,
    /// Maximum number of shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a config for quick tests.
    pub fn quick() -> Self {
        Self {
            cases: 64,
            max_shrink_iters: 100,
        }
    }

    /// Creates a config for thorough tests.
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 5000,
        }
    }

    /// Converts to proptest's config.
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

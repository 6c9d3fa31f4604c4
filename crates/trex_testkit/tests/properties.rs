//! Property tests for the versioned tree and operators.

use proptest::prelude::*;
use trex_core::{Node, Operator, Path, Step, Value, VersionedTree};
use trex_testkit::generators::*;

fn branch(node: &Node, name: &str) -> serde_json::Value {
    node.get(name).map(Value::to_json).unwrap_or_default()
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn writes_never_mutate_published_snapshots(
        initial in node_strategy(),
        first in scalar_fields_strategy(),
        second in scalar_fields_strategy(),
    ) {
        let mut tree = VersionedTree::new(initial.clone());
        let before = Value::from(initial.clone()).to_json();

        tree.set_property(&Path::root(), first.clone()).unwrap();
        let reader = tree.current().clone();
        let seen = Value::from(reader.clone()).to_json();
        tree.set_property(&Path::root(), second.clone()).unwrap();

        prop_assert_eq!(Value::from(initial).to_json(), before);
        prop_assert_eq!(Value::from(reader).to_json(), seen);
        for (field, value) in &second {
            prop_assert_eq!(tree.current().get(field).cloned().unwrap_or_default(), value.clone());
        }
    }

    #[test]
    fn disjoint_branches_always_rebase(
        base in branched_state_strategy(),
        left in scalar_fields_strategy(),
        right in scalar_fields_strategy(),
    ) {
        let mut first = VersionedTree::new(base.clone());
        first.set_property(&Path::parse("left").unwrap(), left).unwrap();
        let latest = first.current().clone();

        let mut second = VersionedTree::new(base);
        second.set_property(&Path::parse("right").unwrap(), right).unwrap();
        let local_right = branch(second.current(), "right");

        second.rebase(&latest).unwrap();
        prop_assert!(Node::ptr_eq(second.base(), &latest));
        prop_assert_eq!(branch(second.current(), "left"), branch(&latest, "left"));
        prop_assert_eq!(branch(second.current(), "right"), local_right);
    }

    #[test]
    fn rebase_onto_own_base_is_a_no_op(base in node_strategy(), fields in scalar_fields_strategy()) {
        let mut tree = VersionedTree::new(base.clone());
        tree.set_property(&Path::root(), fields).unwrap();
        let current = tree.current().clone();

        tree.rebase(&base).unwrap();
        prop_assert!(Node::ptr_eq(tree.current(), &current));
    }

    #[test]
    fn inc_then_dec_restores_integers(start in -1_000_000i64..1_000_000, steps in 0usize..16) {
        let mut value = Value::from(start);
        for _ in 0..steps {
            value = Step::INC.execute(&value).unwrap();
        }
        prop_assert_eq!(value.as_i64(), Some(start + steps as i64));
        for _ in 0..steps {
            value = Step::DEC.execute(&value).unwrap();
        }
        prop_assert_eq!(value, Value::from(start));
    }
}

//! Benchmark utilities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use trex_core::{fields, AppStore, Fields, Node, SliceStore, Value};

/// Builds a state with `width` slices of `width` integer fields each.
pub fn wide_state(width: usize) -> Node {
    (0..width)
        .map(|slice| {
            let fields: Fields = (0..width)
                .map(|field| (format!("f{field}"), Value::from(field as i64)))
                .collect();
            (format!("s{slice}"), Value::from(Node::new(fields)))
        })
        .collect()
}

/// Creates an initialized store with `count` counter slices.
pub fn counter_store(count: usize) -> (AppStore, Vec<SliceStore>) {
    let slices: Vec<SliceStore> = (0..count)
        .map(|i| SliceStore::new(&format!("slice{i}"), fields! { "value" => 0 }).unwrap())
        .collect();
    let store = AppStore::new();
    store.init(&slices).unwrap();
    (store, slices)
}

//! # Trex Core
//!
//! Transactional state engine for application state.
//!
//! This crate provides:
//! - A persistent, path-addressed state tree with copy-on-write updates
//! - Transactions that rebase onto concurrent commits and fail only on true
//!   write/write conflicts
//! - Activities that report sync, async and drained completion of a logical
//!   unit of work
//! - A store registry composing independently owned slices, with
//!   subscriptions and reactions
//! - Declarative update operators (`push`, `inc`, `dec`) that survive a rebase
//!
//! ## Example
//!
//! ```
//! use trex_core::{fields, push, AppStore, SliceStore, StoreResult, Update};
//!
//! # fn main() -> StoreResult<()> {
//! let todos = SliceStore::new("todos", fields! { "items" => Vec::<String>::new() })?;
//! let store = AppStore::new();
//! store.init(&[todos.clone()])?;
//!
//! store.activity("add todo", || -> StoreResult<()> {
//!     todos.update(Update::new().set("items", push("write docs")))?;
//!     Ok(())
//! })?;
//!
//! assert_eq!(todos.get("items")?.as_list().map(<[_]>::len), Some(1));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod operators;
mod path;
mod stats;
mod store;
mod tree;
mod types;
mod value;

pub mod activity;
pub mod transaction;

pub use activity::{
    run_inside_activity, run_inside_activity_async, with_activity, ActivityListener,
    ActivityScope, ActivityStats, LifecycleStage, Outcome, TaskKind,
};
pub use config::{Config, ConflictPolicy};
pub use error::{Conflict, ConflictKind, StoreError, StoreResult};
pub use operators::{dec, inc, push, Change, Operator, Push, Step, Update};
pub use path::{Path, ROOT};
pub use stats::{StatsSnapshot, StoreStats};
pub use store::{AppStore, SliceStore, StateListener, Subscription, SYSTEM_PATH};
pub use transaction::{
    run_inside_transaction, run_inside_transaction_async, with_transaction, Transaction,
    TransactionScope, TransactionState,
};
pub use tree::VersionedTree;
pub use types::{ActivityId, ListenerId, TransactionId};
pub use value::{Fields, Node, Value};

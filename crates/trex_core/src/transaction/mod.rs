//! Transactions over the store state.
//!
//! A transaction provides:
//! - **Isolation**: readers inside it see its pending writes; nobody else does
//! - **Atomicity**: an error anywhere in the action publishes nothing
//! - **Optimistic concurrency**: a commit that finds a newer state rebases onto
//!   it and fails only on true write/write conflicts
//!
//! Transactions nest by joining: an inner call on the same logical call chain
//! runs inside the outer transaction, and only the outermost call commits.

mod scope;
mod state;

pub use scope::TransactionScope;
pub use state::{Transaction, TransactionState};

pub(crate) use scope::{run_async, run_sync};

use crate::error::StoreError;
use crate::store::AppStore;
use std::future::Future;

/// Runs `action` inside a transaction on `store`.
///
/// Joins the ambient transaction if there is one. Otherwise a new
/// transaction is started, committed when `action` returns `Ok`, and
/// discarded when it returns `Err`; a commit failure is returned as the
/// action's error.
pub fn run_inside_transaction<T, E, F>(store: &AppStore, action: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: From<StoreError>,
{
    run_sync(store.inner(), action)
}

/// Runs the future produced by `action` inside a transaction on `store`.
///
/// The commit happens after the future resolves with `Ok`.
pub async fn run_inside_transaction_async<T, E, F, Fut>(store: &AppStore, action: F) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<StoreError>,
{
    run_async(store.inner(), action).await
}

/// Wraps `f` so that every call runs inside a transaction on `store`.
///
/// ```
/// use trex_core::{fields, with_transaction, AppStore, SliceStore, StoreResult, Update};
///
/// let store = AppStore::new();
/// let counter = SliceStore::new("counter", fields! { "value" => 0 }).unwrap();
/// store.init(&[counter.clone()]).unwrap();
///
/// let set = with_transaction(&store, move |value: i64| -> StoreResult<()> {
///     counter.update(Update::new().set("value", value))?;
///     Ok(())
/// });
/// set(3).unwrap();
/// ```
pub fn with_transaction<A, T, E, F>(store: &AppStore, f: F) -> impl Fn(A) -> Result<T, E>
where
    F: Fn(A) -> Result<T, E>,
    E: From<StoreError>,
{
    let store = store.clone();
    move |arg| store.transaction(|| f(arg))
}

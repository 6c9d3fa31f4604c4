//! Transaction integration tests: isolation, atomicity, rebase and conflicts.

use parking_lot::Mutex;
use std::sync::Arc;
use trex_core::{
    fields, inc, push, AppStore, Config, ConflictKind, ConflictPolicy, Path, SliceStore,
    StoreError, StoreResult, TransactionScope, TransactionState, Update, Value,
};

fn create_store(config: Config) -> (AppStore, SliceStore, SliceStore) {
    let a = SliceStore::new("a", fields! { "value" => 0, "items" => Vec::<Value>::new() }).unwrap();
    let b = SliceStore::new("b", fields! { "value" => 0 }).unwrap();
    let store = AppStore::with_config(config);
    store.init(&[a.clone(), b.clone()]).unwrap();
    (store, a, b)
}

/// Runs `first` and `second` as interleaved async transactions: both start
/// from the same state, `first` commits before `second`.
async fn interleave<F, G>(store: &AppStore, first: F, second: G) -> (StoreResult<()>, StoreResult<()>)
where
    F: FnOnce() -> StoreResult<()>,
    G: FnOnce() -> StoreResult<()>,
{
    let one = store.transaction_async(|| async move {
        first()?;
        tokio::task::yield_now().await;
        Ok::<(), StoreError>(())
    });
    let two = store.transaction_async(|| async move {
        second()?;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        Ok::<(), StoreError>(())
    });
    tokio::join!(one, two)
}

#[tokio::test]
async fn disjoint_slices_commit_concurrently() {
    let (store, a, b) = create_store(Config::default());

    let (first, second) = interleave(
        &store,
        || a.set("value", 1).map(drop),
        || b.set("value", 2).map(drop),
    )
    .await;

    first.unwrap();
    second.unwrap();
    assert_eq!(a.get("value").unwrap(), Value::from(1));
    assert_eq!(b.get("value").unwrap(), Value::from(2));

    let stats = store.stats();
    assert_eq!(stats.rebases, 1);
    assert_eq!(stats.conflicts, 0);
}

#[tokio::test]
async fn disjoint_fields_of_one_slice_commit_concurrently() {
    let (store, a, _b) = create_store(Config::default());

    let (first, second) = interleave(
        &store,
        || a.set("value", 7).map(drop),
        || a.set("items", push("x")).map(drop),
    )
    .await;

    first.unwrap();
    second.unwrap();
    assert_eq!(a.get("value").unwrap(), Value::from(7));
    assert_eq!(a.get("items").unwrap(), Value::from(vec!["x"]));
}

#[tokio::test]
async fn conflicting_writes_abort_the_later_commit() {
    let (store, a, _b) = create_store(Config::default());

    let (first, second) = interleave(
        &store,
        || a.set("value", 1).map(drop),
        || a.set("value", 2).map(drop),
    )
    .await;

    first.unwrap();
    let err = second.unwrap_err();
    let conflict = err.as_conflict().unwrap();
    assert_eq!(conflict.path, Path::parse("a.value").unwrap());
    assert_eq!(conflict.kind, ConflictKind::ValueWrite);
    assert_eq!(conflict.latest, Value::from(1));
    assert_eq!(conflict.local, Value::from(2));

    assert_eq!(a.get("value").unwrap(), Value::from(1));
    let stats = store.stats();
    assert_eq!(stats.conflicts, 1);
    assert_eq!(stats.transactions_aborted, 1);
}

#[tokio::test]
async fn last_writer_wins_resolves_conflicting_leaves() {
    let config = Config::new().conflict_policy(ConflictPolicy::LastWriterWins);
    let (store, a, b) = create_store(config);

    let (first, second) = interleave(
        &store,
        || {
            a.set("value", 1)?;
            b.set("value", 1).map(drop)
        },
        || a.set("value", 2).map(drop),
    )
    .await;

    first.unwrap();
    second.unwrap();
    assert_eq!(a.get("value").unwrap(), Value::from(2));
    assert_eq!(b.get("value").unwrap(), Value::from(1));
}

#[tokio::test]
async fn identical_writes_do_not_conflict() {
    let (store, a, _b) = create_store(Config::default());

    let (first, second) = interleave(
        &store,
        || a.set("value", 5).map(drop),
        || a.set("value", 5).map(drop),
    )
    .await;

    first.unwrap();
    second.unwrap();
    assert_eq!(a.get("value").unwrap(), Value::from(5));
}

#[tokio::test]
async fn operators_commute_across_rebase() {
    let (store, a, _b) = create_store(Config::default());

    let (first, second) = interleave(
        &store,
        || {
            a.update(Update::new().set("value", inc()).set("items", push("first")))
                .map(drop)
        },
        || {
            a.update(Update::new().set("value", inc()).set("items", push("second")))
                .map(drop)
        },
    )
    .await;

    first.unwrap();
    second.unwrap();
    assert_eq!(a.get("value").unwrap(), Value::from(2));
    assert_eq!(a.get("items").unwrap(), Value::from(vec!["first", "second"]));
}

#[tokio::test]
async fn rebased_commit_survives_the_next_rebase() {
    let slice = SliceStore::new("a", fields! { "x" => 0, "y" => 0, "z" => 0 }).unwrap();
    let store = AppStore::new();
    store.init(&[slice.clone()]).unwrap();
    let a = &slice;
    let (release, released) = tokio::sync::oneshot::channel::<()>();

    // Holds its write to "x" while other commits land.
    let long = store.transaction_async(|| async move {
        a.set("x", 1)?;
        let _ = released.await;
        Ok::<(), StoreError>(())
    });

    let driver = async {
        store.transaction(|| a.set("y", 1).map(drop))?;
        store.transaction(|| a.set("y", 2).map(drop))?;
        let before = store.committed_state().version();

        store
            .transaction_async(|| async move {
                a.set("z", 1)?;
                let _ = release.send(());
                tokio::task::yield_now().await;
                tokio::task::yield_now().await;
                Ok::<(), StoreError>(())
            })
            .await?;
        Ok::<u64, StoreError>(before)
    };

    let (long, driver) = tokio::join!(long, driver);
    long.unwrap();
    let before = driver.unwrap();

    assert_eq!(a.get("x").unwrap(), Value::from(1));
    assert_eq!(a.get("y").unwrap(), Value::from(2));
    assert_eq!(a.get("z").unwrap(), Value::from(1));
    assert!(store.committed_state().version() > before);
    assert_eq!(store.stats().rebases, 2);
}

#[test]
fn failed_action_publishes_nothing() {
    let (store, a, b) = create_store(Config::default());
    let calls = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&calls);
    store.subscribe(move |_, _| *sink.lock() += 1);
    let before = store.state();

    let result: StoreResult<()> = store.transaction(|| {
        a.set("value", 1)?;
        b.set("value", 1)?;
        Err(StoreError::invalid_path("a.value", "rejected by caller"))
    });

    assert!(result.is_err());
    assert!(trex_core::Node::ptr_eq(&store.state(), &before));
    assert_eq!(*calls.lock(), 0);
    assert_eq!(store.stats().transactions_aborted, 1);
}

#[test]
fn nested_transactions_join_the_outer_one() {
    let (store, a, b) = create_store(Config::default());
    let calls = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&calls);
    store.subscribe(move |_, _| *sink.lock() += 1);

    store
        .transaction(|| -> StoreResult<()> {
            let outer = TransactionScope::current().unwrap().id();
            a.set("value", 1)?;
            store.transaction(|| -> StoreResult<()> {
                assert_eq!(TransactionScope::current().unwrap().id(), outer);
                b.set("value", 1)?;
                Ok(())
            })?;
            assert_eq!(b.get("value")?, Value::from(1));
            Ok(())
        })
        .unwrap();

    assert_eq!(*calls.lock(), 1);
    assert_eq!(a.get("value").unwrap(), Value::from(1));
    assert_eq!(b.get("value").unwrap(), Value::from(1));
}

#[test]
fn readers_outside_see_only_committed_state() {
    let (store, a, _b) = create_store(Config::default());
    let outside = store.clone();

    store
        .transaction(|| -> StoreResult<()> {
            a.set("value", 3)?;
            let committed = outside.committed_state();
            let slice = committed.get("a").and_then(Value::as_node).unwrap();
            assert_eq!(slice.get("value"), Some(&Value::from(0)));
            Ok(())
        })
        .unwrap();
}

#[test]
fn committed_scope_rejects_further_updates() {
    let (store, a, _b) = create_store(Config::default());

    let scope = store
        .transaction(|| -> StoreResult<_> {
            a.set("value", 1)?;
            Ok(TransactionScope::current().unwrap())
        })
        .unwrap();

    assert_eq!(scope.state(), TransactionState::Committed);
    let err = scope
        .update(&Path::parse("a").unwrap(), &Update::new().set("value", 2))
        .unwrap_err();
    assert!(matches!(err, StoreError::AlreadyCommitted { .. }));
    assert_eq!(a.get("value").unwrap(), Value::from(1));
}

#[test]
fn empty_transaction_is_a_no_op() {
    let (store, _a, _b) = create_store(Config::default());
    let calls = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&calls);
    store.subscribe(move |_, _| *sink.lock() += 1);
    let before = store.state();

    store.transaction(|| Ok::<_, StoreError>(())).unwrap();

    assert!(trex_core::Node::ptr_eq(&store.state(), &before));
    assert_eq!(*calls.lock(), 0);
    assert_eq!(store.stats().transactions_empty, 1);
}

#[test]
fn subscribers_run_outside_the_committed_transaction() {
    let (store, a, b) = create_store(Config::default());
    let ambient = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&ambient);
    let mirror = b.clone();

    store.subscribe(move |new, old| {
        sink.lock().push(TransactionScope::current().is_some());
        let changed = match (new.get("a"), old.get("a")) {
            (Some(new), Some(old)) => !new.same(old),
            _ => false,
        };
        if changed {
            let value = new
                .get("a")
                .and_then(Value::as_node)
                .and_then(|a| a.get("value"))
                .cloned()
                .unwrap_or_default();
            mirror.set("value", value).unwrap();
        }
    });

    a.set("value", 9).unwrap();

    assert_eq!(b.get("value").unwrap(), Value::from(9));
    assert!(ambient.lock().iter().all(|inside| !inside));
    // init, a's commit, then the subscriber's own commit on b
    assert_eq!(store.stats().transactions_committed, 3);
}

#[test]
fn transactions_of_another_store_are_not_joined() {
    let (store, a, _b) = create_store(Config::default());
    let (other, c, _d) = create_store(Config::default());

    store
        .transaction(|| -> StoreResult<()> {
            a.set("value", 1)?;
            c.set("value", 1)?;
            assert_eq!(other.committed_state(), other.state());
            Ok(())
        })
        .unwrap();

    assert_eq!(c.get("value").unwrap(), Value::from(1));
    assert_eq!(other.stats().transactions_committed, 2);
}

//! trex Example - Contacts Book
//!
//! This example demonstrates:
//! - Registering slices and initializing the store
//! - Updates with declarative operators inside activities
//! - A reaction keeping derived state current
//! - Slice and path subscriptions
//! - Two interleaved async transactions: one rebases cleanly, one conflicts
//!
//! Run with: cargo run -p rust_contacts
//! Set `RUST_LOG=trex_core=debug` to see the commit flow.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use trex_core::activity::{self, TaskKind};
use trex_core::{
    fields, inc, push, ActivityListener, ActivityScope, AppStore, SliceStore, StoreError,
    StoreResult, Update, Value,
};

/// A contact entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Contact {
    name: String,
    email: String,
    favorite: bool,
}

impl Contact {
    fn new(name: &str, email: &str) -> Self {
        Self {
            name: name.to_string(),
            email: email.to_string(),
            favorite: false,
        }
    }
}

/// Prints activity completion to stdout.
struct Printer;

impl ActivityListener for Printer {
    fn on_error(&self, activity: &ActivityScope, error: &str) {
        println!("  [!] {} failed: {}", activity.name(), error);
    }

    fn on_drained(&self, activity: &ActivityScope) {
        let stats = activity.stats();
        println!(
            "  [~] {} drained after {:?} ({} transaction(s))",
            stats.name,
            stats.drain_time.unwrap_or_default(),
            stats.transactions
        );
    }
}

fn add_contact(contacts: &SliceStore, contact: &Contact) -> StoreResult<()> {
    contacts.update(
        Update::new()
            .set("list", push(Value::from_serialize(contact)?))
            .set("added", inc()),
    )?;
    Ok(())
}

fn list_contacts(contacts: &SliceStore) -> StoreResult<Vec<Contact>> {
    contacts.get("list")?.deserialize()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("Contacts Book Example");
    println!("=====================\n");

    let contacts = SliceStore::new(
        "contacts",
        fields! { "list" => Vec::<Value>::new(), "added" => 0, "filter" => "" },
    )?;
    let summary = SliceStore::new("ui.summary", fields! { "count" => 0, "favorites" => 0 })?;

    let source = contacts.clone();
    summary.add_reaction(move |summary| {
        let list = list_contacts(&source)?;
        let favorites = list.iter().filter(|c| c.favorite).count() as i64;
        let count = list.len() as i64;
        if summary.get("count")?.as_i64() != Some(count)
            || summary.get("favorites")?.as_i64() != Some(favorites)
        {
            summary.update(Update::new().set("count", count).set("favorites", favorites))?;
        }
        Ok(())
    });

    let store = AppStore::new();
    store.init(&[contacts.clone(), summary.clone()])?;
    store.register_listener(Arc::new(Printer));
    println!("[OK] Store initialized: {:?}", store.slice_paths());

    let _summary_watch = summary.subscribe(|new, _old| {
        println!(
            "  [#] summary: {} contact(s), {} favorite(s)",
            new.get("count").and_then(Value::as_i64).unwrap_or(0),
            new.get("favorites").and_then(Value::as_i64).unwrap_or(0)
        );
    })?;
    let _filter_watch = contacts.subscribe_to("filter", |new, old| {
        println!("  [#] filter: {:?} -> {:?}", old.as_str(), new.as_str());
    })?;

    // Insert in one activity: both contacts land in a single commit.
    println!("\n[+] Importing contacts...");
    store.activity("import", || {
        store.transaction(|| -> StoreResult<()> {
            add_contact(&contacts, &Contact::new("Ada Lovelace", "ada@example.com"))?;
            add_contact(&contacts, &Contact::new("Alan Turing", "alan@example.com"))?;
            Ok(())
        })
    })?;

    // An async activity with background work: drained fires last.
    println!("\n[+] Syncing favorites in the background...");
    let sync_contacts = contacts.clone();
    store
        .activity_async("sync favorites", || async move {
            activity::spawn(TaskKind::Io, async move {
                activity::sleep(Duration::from_millis(20)).await;
                let result = sync_contacts.update_with(|state| {
                    let mut list: Vec<Contact> = state
                        .get("list")
                        .and_then(|list| list.deserialize().ok())
                        .unwrap_or_default();
                    if let Some(first) = list.first_mut() {
                        first.favorite = true;
                    }
                    let list = Value::from_serialize(&list).unwrap_or_default();
                    Update::new().set("list", list)
                });
                if let Err(err) = result {
                    tracing::warn!(error = %err, "favorite sync failed");
                }
            });
            Ok::<(), StoreError>(())
        })
        .await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Two concurrent edits: pushes commute, filter writes conflict.
    println!("\n[~] Running two concurrent edits...");
    let (left, right) = tokio::join!(
        store.transaction_async(|| async {
            add_contact(&contacts, &Contact::new("Grace Hopper", "grace@example.com"))?;
            contacts.set("filter", "a")?;
            tokio::task::yield_now().await;
            Ok::<(), StoreError>(())
        }),
        store.transaction_async(|| async {
            add_contact(&contacts, &Contact::new("Edsger Dijkstra", "edsger@example.com"))?;
            contacts.set("filter", "e")?;
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            Ok::<(), StoreError>(())
        }),
    );
    println!("  first edit:  {:?}", left.map(|_| "committed"));
    match right {
        Ok(()) => println!("  second edit: committed"),
        Err(err) => println!("  second edit: {err}"),
    }

    println!("\n[*] Contacts:");
    for contact in list_contacts(&contacts)? {
        let star = if contact.favorite { "*" } else { " " };
        println!("  {} {} <{}>", star, contact.name, contact.email);
    }

    let stats = store.stats();
    info!(
        committed = stats.transactions_committed,
        aborted = stats.transactions_aborted,
        rebases = stats.rebases,
        conflicts = stats.conflicts,
        "store statistics"
    );
    println!("\n[#] Summary:");
    println!("  Commits:   {}", stats.transactions_committed);
    println!("  Rebases:   {}", stats.rebases);
    println!("  Conflicts: {}", stats.conflicts);

    Ok(())
}

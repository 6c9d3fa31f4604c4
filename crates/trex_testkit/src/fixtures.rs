//! Test fixtures and store helpers.
//!
//! Provides a store pre-populated with the slices most tests need.

use serde::{Deserialize, Serialize};
use trex_core::{fields, AppStore, Config, SliceStore, Value};

/// Path of the counter slice.
pub const COUNTER: &str = "counter";
/// Path of the auth slice.
pub const AUTH: &str = "auth";
/// Path of the contacts slice.
pub const CONTACTS: &str = "contacts";

/// A contact entry, as stored in the contacts slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
}

impl Contact {
    /// Creates a contact.
    pub fn new(name: &str, email: &str) -> Self {
        Self {
            name: name.to_string(),
            email: email.to_string(),
        }
    }

    /// Converts the contact into a tree value.
    pub fn to_value(&self) -> Value {
        Value::from_serialize(self).expect("contact serializes")
    }
}

/// Creates the counter slice: `{ value: 0, step: 1 }`.
pub fn counter_slice() -> SliceStore {
    SliceStore::new(COUNTER, fields! { "value" => 0, "step" => 1 }).expect("valid counter slice")
}

/// Creates the auth slice: `{ user: null, attempts: 0 }`.
pub fn auth_slice() -> SliceStore {
    SliceStore::new(
        AUTH,
        fields! { "user" => Value::Null, "attempts" => 0 },
    )
    .expect("valid auth slice")
}

/// Creates the contacts slice: `{ list: [], filter: "" }`.
pub fn contacts_slice() -> SliceStore {
    SliceStore::new(
        CONTACTS,
        fields! { "list" => Vec::<Value>::new(), "filter" => "" },
    )
    .expect("valid contacts slice")
}

/// A store with the three fixture slices registered and initialized.
pub struct TestStore {
    /// The store.
    pub store: AppStore,
    /// Counter slice.
    pub counter: SliceStore,
    /// Auth slice.
    pub auth: SliceStore,
    /// Contacts slice.
    pub contacts: SliceStore,
}

impl TestStore {
    /// Creates a fixture store with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a fixture store.
    pub fn with_config(config: Config) -> Self {
        let store = AppStore::with_config(config);
        let counter = counter_slice();
        let auth = auth_slice();
        let contacts = contacts_slice();
        store
            .init(&[counter.clone(), auth.clone(), contacts.clone()])
            .expect("Failed to initialize test store");
        Self {
            store,
            counter,
            auth,
            contacts,
        }
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestStore {
    type Target = AppStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs a test with a fresh fixture store.
pub fn with_test_store<F, R>(f: F) -> R
where
    F: FnOnce(&TestStore) -> R,
{
    let store = TestStore::new();
    f(&store)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use trex_core::{push, StoreResult};

    /// Creates a fixture store whose contacts slice holds `count` contacts.
    pub fn populated_contacts(count: usize) -> TestStore {
        let test_store = TestStore::new();
        test_store
            .store
            .transaction(|| -> StoreResult<()> {
                for i in 0..count {
                    let contact = Contact::new(&format!("contact-{i}"), &format!("c{i}@example.com"));
                    test_store.contacts.set("list", push(contact.to_value()))?;
                }
                Ok(())
            })
            .expect("Failed to populate contacts");
        test_store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_store_is_initialized() {
        let store = TestStore::new();
        assert!(store.is_initialized());
        assert_eq!(store.slice_paths().len(), 4);
        assert_eq!(store.auth.get("user").unwrap(), Value::Null);
    }

    #[test]
    fn populated_contacts_round_trip() {
        let store = scenarios::populated_contacts(3);
        let list = store.contacts.get("list").unwrap();
        let contacts: Vec<Contact> = list.deserialize().unwrap();
        assert_eq!(contacts.len(), 3);
        assert_eq!(contacts[2], Contact::new("contact-2", "c2@example.com"));
    }
}

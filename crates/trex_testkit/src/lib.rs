//! # Trex Testkit
//!
//! Test utilities for trex.
//!
//! This crate provides:
//! - Store fixtures with counter, auth and contacts slices
//! - A recording activity listener
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use trex_testkit::prelude::*;
//!
//! with_test_store(|store| {
//!     store.counter.set("value", trex_core::inc()).unwrap();
//!     assert_eq!(store.counter.get("value").unwrap().as_i64(), Some(1));
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod listener;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::listener::*;
}

pub use fixtures::*;
pub use generators::*;
pub use listener::*;

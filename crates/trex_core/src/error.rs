//! Error types for trex.

use crate::path::Path;
use crate::types::TransactionId;
use crate::value::Value;
use std::fmt;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A path is malformed or resolves through a non-map value.
    #[error("invalid path \"{path}\": {message}")]
    InvalidPath {
        /// The offending path.
        path: String,
        /// Description of the problem.
        message: String,
    },

    /// A slice path overlaps an already registered slice.
    #[error("slice path \"{path}\" conflicts with registered slice \"{existing}\"")]
    PathConflict {
        /// The path being registered.
        path: String,
        /// The registered path it overlaps.
        existing: String,
    },

    /// A slice was used before its store was initialized.
    #[error("slice \"{path}\" is not registered; did you call AppStore::init?")]
    NotInitialized {
        /// Path of the unregistered slice.
        path: String,
    },

    /// Registration attempted after the store was initialized.
    #[error("store is already initialized")]
    AlreadyInitialized,

    /// The slice already belongs to a store.
    #[error("slice \"{path}\" is already registered with a store")]
    SliceAlreadyRegistered {
        /// Path of the slice.
        path: String,
    },

    /// A slice state is not a map.
    #[error("slice \"{path}\" must hold a map, found {found}")]
    InvalidSliceState {
        /// Path of the slice.
        path: String,
        /// Kind of value found instead.
        found: &'static str,
    },

    /// A rebase found a true write/write conflict.
    #[error("{0}")]
    Conflict(Box<Conflict>),

    /// Operation attempted on a committed or aborted transaction.
    #[error("transaction {id} was already committed")]
    AlreadyCommitted {
        /// The transaction.
        id: TransactionId,
    },

    /// Operation attempted on an aborted transaction.
    #[error("transaction {id} was aborted")]
    Aborted {
        /// The transaction.
        id: TransactionId,
    },

    /// An update ran outside a transaction while auto-begin is disabled.
    #[error("no ambient transaction to update \"{path}\"")]
    NoAmbientTransaction {
        /// Path of the slice being updated.
        path: String,
    },

    /// A declarative operator was applied to a value of the wrong kind.
    #[error("operator {operator} cannot be applied to {found}")]
    OperatorType {
        /// Operator name.
        operator: &'static str,
        /// Kind of value found.
        found: &'static str,
    },

    /// Typed conversion into or out of the value tree failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Creates an invalid path error.
    pub fn invalid_path(path: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.to_string(),
            message: message.into(),
        }
    }

    /// Creates a path conflict error.
    pub fn path_conflict(path: &Path, existing: &Path) -> Self {
        Self::PathConflict {
            path: path.to_string(),
            existing: existing.to_string(),
        }
    }

    /// Creates a not initialized error.
    pub fn not_initialized(path: &Path) -> Self {
        Self::NotInitialized {
            path: path.to_string(),
        }
    }

    /// Creates an invalid slice state error.
    pub fn invalid_slice_state(path: &Path, found: &Value) -> Self {
        Self::InvalidSliceState {
            path: path.to_string(),
            found: found.kind(),
        }
    }

    /// Creates a no ambient transaction error.
    pub fn no_ambient_transaction(path: &Path) -> Self {
        Self::NoAmbientTransaction {
            path: path.to_string(),
        }
    }

    /// Creates an operator type error.
    pub fn operator_type(operator: &'static str, found: &Value) -> Self {
        Self::OperatorType {
            operator,
            found: found.kind(),
        }
    }

    /// Returns the conflict if this error is a concurrency conflict.
    pub fn as_conflict(&self) -> Option<&Conflict> {
        match self {
            Self::Conflict(conflict) => Some(conflict),
            _ => None,
        }
    }

    /// Returns true for concurrency conflicts.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns true for setup mistakes (bad paths, overlapping or unregistered slices).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidPath { .. }
                | Self::PathConflict { .. }
                | Self::NotInitialized { .. }
                | Self::AlreadyInitialized
                | Self::SliceAlreadyRegistered { .. }
                | Self::InvalidSliceState { .. }
        )
    }
}

impl From<Conflict> for StoreError {
    fn from(conflict: Conflict) -> Self {
        Self::Conflict(Box::new(conflict))
    }
}

/// Kind of a rebase conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Both sides wrote different values to the same leaf.
    ValueWrite,
    /// One side replaced a subtree with a leaf (or the reverse).
    ShapeChange,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::ValueWrite => f.write_str("concurrent write"),
            ConflictKind::ShapeChange => f.write_str("concurrent shape change"),
        }
    }
}

/// A write/write conflict detected while rebasing.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    /// Path of the conflicting field.
    pub path: Path,
    /// Kind of conflict.
    pub kind: ConflictKind,
    /// Value the transaction started from.
    pub base: Value,
    /// Value committed concurrently by another transaction.
    pub latest: Value,
    /// Value written by this transaction.
    pub local: Value,
}

impl Conflict {
    /// Resolves the conflict when both sides wrote equal values.
    pub fn converged(&self) -> Option<Value> {
        (self.local == self.latest).then(|| self.local.clone())
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "concurrency conflict at \"{}\": {}", self.path, self.kind)
    }
}

//! Versioned copy-on-write tree.
//!
//! A [`VersionedTree`] holds the snapshot a transaction started from (`base`)
//! and the snapshot it is building (`current`). Writes clone only the nodes on
//! the written path, and each node is cloned at most once per epoch: a node
//! forked during the current epoch carries the epoch as its clone marker and
//! is edited in place afterwards. [`VersionedTree::commit`] starts a new
//! epoch, which clears every marker at once.

use crate::error::{Conflict, ConflictKind, StoreError, StoreResult};
use crate::path::Path;
use crate::value::{Fields, Node, Value, NULL};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

fn next_epoch() -> u64 {
    NEXT_EPOCH.fetch_add(1, Ordering::Relaxed)
}

/// A base snapshot and the working snapshot derived from it.
#[derive(Debug)]
pub struct VersionedTree {
    base: Node,
    current: Node,
    epoch: u64,
}

impl VersionedTree {
    /// Creates a tree whose base and current snapshots are `initial`.
    pub fn new(initial: Node) -> Self {
        Self {
            base: initial.clone(),
            current: initial,
            epoch: next_epoch(),
        }
    }

    /// Returns the snapshot the working tree derives from.
    pub fn base(&self) -> &Node {
        &self.base
    }

    /// Returns the working snapshot.
    pub fn current(&self) -> &Node {
        &self.current
    }

    /// Returns true if the working snapshot differs from the base.
    pub fn has_changes(&self) -> bool {
        !Node::ptr_eq(&self.base, &self.current)
    }

    /// Merges `changes` into the map at `path` and returns the new root.
    ///
    /// Only fields whose value differs from the stored one (by
    /// [`Value::same`]) cause a write; a missing field counts as null. When
    /// nothing differs the tree is left untouched. Every node on the path must
    /// be a map.
    pub fn set_property(&mut self, path: &Path, changes: Fields) -> StoreResult<&Node> {
        self.node_at(path)?;

        let mut root = std::mem::take(&mut self.current);
        let changed = write(&mut root, path.segments(), changes, self.epoch);
        self.current = root;

        trace!(path = %path, changed, version = self.current.version(), "set_property");
        Ok(&self.current)
    }

    /// Returns the map at `path` in the working snapshot.
    ///
    /// Fails unless every node on the path, the target included, is a map.
    pub fn node_at(&self, path: &Path) -> StoreResult<&Node> {
        let mut node = &self.current;
        for segment in path.segments() {
            node = match node.get(segment) {
                Some(Value::Map(child)) => child,
                Some(other) => {
                    return Err(StoreError::invalid_path(
                        path,
                        format!("\"{segment}\" is a {}, not a map", other.kind()),
                    ))
                }
                None => {
                    return Err(StoreError::invalid_path(
                        path,
                        format!("\"{segment}\" does not exist"),
                    ))
                }
            };
        }
        Ok(node)
    }

    /// Makes the working snapshot the new base and clears all clone markers.
    pub fn commit(&mut self) {
        self.base = self.current.clone();
        self.epoch = next_epoch();
    }

    /// Rebases the working snapshot onto `new_base`, failing on any true conflict.
    ///
    /// A leaf both sides set to equal values is not a conflict.
    pub fn rebase(&mut self, new_base: &Node) -> StoreResult<()> {
        self.rebase_with(new_base, Conflict::converged)
    }

    /// Rebases the working snapshot onto `new_base`.
    ///
    /// Fields this tree did not change adopt the value in `new_base`. Maps
    /// changed on both sides are reconciled field by field. Every leaf changed
    /// on both sides is handed to `resolver`, which may supply the value to
    /// keep; when it returns `None` the rebase fails with that conflict. On
    /// failure the tree is left as it was.
    pub fn rebase_with<F>(&mut self, new_base: &Node, mut resolver: F) -> StoreResult<()>
    where
        F: FnMut(&Conflict) -> Option<Value>,
    {
        if Node::ptr_eq(new_base, &self.base) {
            return Ok(());
        }

        debug!(
            base_version = self.base.version(),
            latest_version = new_base.version(),
            "rebase"
        );

        let mut current = self.current.clone();
        rebase_node(
            &mut current,
            &self.base,
            new_base,
            &Path::root(),
            self.epoch,
            &mut resolver,
        )?;
        self.current = current;
        self.base = new_base.clone();
        Ok(())
    }
}

/// Makes `node` writable in `epoch`, cloning it at most once per epoch.
fn fork(node: &mut Node, epoch: u64) {
    if node.epoch() != epoch {
        *node = node.forked(epoch);
    } else if !node.is_unique() {
        // A reader holds it; copy without counting a second clone.
        *node = node.copied();
    }
}

fn set_field(node: &mut Node, field: &str, value: Value, epoch: u64) {
    fork(node, epoch);
    node.fields_mut().insert(field.to_string(), value);
}

fn merge(node: &mut Node, changes: Fields, epoch: u64) -> bool {
    let mut changed = false;
    for (field, value) in changes {
        let old = node.get(&field).unwrap_or(&NULL);
        if old.same(&value) {
            continue;
        }
        if !changed {
            fork(node, epoch);
            changed = true;
        }
        node.fields_mut().insert(field, value);
    }
    changed
}

fn write(node: &mut Node, segments: &[String], changes: Fields, epoch: u64) -> bool {
    let Some((head, rest)) = segments.split_first() else {
        return merge(node, changes, epoch);
    };

    let owned = node.epoch() == epoch && node.is_unique();
    let mut child = if owned {
        // Detach so the child can be edited in place too.
        match node.fields_mut().get_mut(head) {
            Some(Value::Map(child)) => std::mem::take(child),
            _ => return false,
        }
    } else {
        match node.get(head) {
            Some(Value::Map(child)) => child.clone(),
            _ => return false,
        }
    };

    let changed = write(&mut child, rest, changes, epoch);
    if owned || changed {
        set_field(node, head, Value::Map(child), epoch);
    }
    changed
}

fn rebase_node<F>(
    current: &mut Node,
    base: &Node,
    latest: &Node,
    path: &Path,
    epoch: u64,
    resolver: &mut F,
) -> StoreResult<()>
where
    F: FnMut(&Conflict) -> Option<Value>,
{
    if Node::ptr_eq(latest, base) {
        return Ok(());
    }

    for (field, latest_value) in latest.iter() {
        let base_value = base.get(field).unwrap_or(&NULL);
        let local_value = current.get(field).cloned().unwrap_or_default();

        if base_value.same(&local_value) {
            // No local change: take whatever was committed.
            if !local_value.same(latest_value) {
                set_field(current, field, latest_value.clone(), epoch);
            }
            continue;
        }

        if let (Value::Map(b), Value::Map(l), Value::Map(c)) =
            (base_value, latest_value, &local_value)
        {
            if Node::ptr_eq(b, l) {
                continue;
            }
            let mut child = c.clone();
            rebase_node(&mut child, b, l, &path.child(field), epoch, resolver)?;
            if !Node::ptr_eq(&child, c) {
                set_field(current, field, Value::Map(child), epoch);
            }
            continue;
        }

        if base_value.same(latest_value) {
            continue;
        }

        let kind = if [base_value, latest_value, &local_value]
            .iter()
            .any(|v| matches!(v, Value::Map(_)))
        {
            ConflictKind::ShapeChange
        } else {
            ConflictKind::ValueWrite
        };
        let conflict = Conflict {
            path: path.child(field),
            kind,
            base: base_value.clone(),
            latest: latest_value.clone(),
            local: local_value,
        };
        match resolver(&conflict) {
            Some(value) => {
                debug!(path = %conflict.path, "conflict resolved");
                set_field(current, field, value, epoch);
            }
            None => return Err(conflict.into()),
        }
    }

    // Published versions never go backwards.
    if !Node::ptr_eq(current, latest) {
        current.raise_version(latest.version());
    }
    Ok(())
}

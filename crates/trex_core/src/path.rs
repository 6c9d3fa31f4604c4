//! Dot-separated paths into the state tree.

use crate::error::{StoreError, StoreResult};
use crate::value::{Node, Value};
use std::fmt;
use std::str::FromStr;

/// Textual form of the root path.
pub const ROOT: &str = "/";

/// A parsed path such as `"contacts.selected"`, or the root `"/"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    /// The root path.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses a path.
    ///
    /// `"/"` is the root. Otherwise the path is a non-empty list of non-empty
    /// segments separated by dots.
    pub fn parse(text: &str) -> StoreResult<Self> {
        if text == ROOT {
            return Ok(Self::root());
        }
        if text.is_empty() {
            return Err(StoreError::invalid_path(text, "path is empty"));
        }

        let mut segments = Vec::new();
        for segment in text.split('.') {
            if segment.is_empty() {
                return Err(StoreError::invalid_path(text, "empty segment"));
            }
            if segment.contains('/') {
                return Err(StoreError::invalid_path(
                    text,
                    format!("segment \"{segment}\" contains '/'"),
                ));
            }
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }

    /// Returns true for the root path.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the path segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns the number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns true for the root path.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the path extended by one segment.
    #[must_use]
    pub fn child(&self, segment: &str) -> Path {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Path { segments }
    }

    /// Returns true if `self` equals `other` or is one of its ancestors.
    pub fn is_prefix_of(&self, other: &Path) -> bool {
        other.segments.starts_with(&self.segments)
    }

    /// Returns true if two slice paths would overlap.
    ///
    /// Paths overlap when one is a prefix of the other on segment
    /// boundaries, or when either is the root.
    pub fn overlaps(&self, other: &Path) -> bool {
        self.is_root() || other.is_root() || self.is_prefix_of(other) || other.is_prefix_of(self)
    }

    /// Resolves this path against `root`.
    ///
    /// Returns `Ok(None)` when a segment is missing or an intermediate value is
    /// null, and an error when an intermediate value is a scalar or list.
    pub fn resolve<'a>(&self, root: &'a Value) -> StoreResult<Option<&'a Value>> {
        let mut current = root;
        for segment in &self.segments {
            current = match current {
                Value::Map(node) => match node.get(segment) {
                    Some(value) => value,
                    None => return Ok(None),
                },
                Value::Null => return Ok(None),
                other => {
                    return Err(StoreError::invalid_path(
                        self,
                        format!("cannot read \"{segment}\" through a {}", other.kind()),
                    ))
                }
            };
        }
        Ok(Some(current))
    }

    /// Returns a new tree with `value` stored at this path.
    ///
    /// Missing or null intermediates become empty maps. Only a map can be
    /// assigned to the root.
    pub fn assign(&self, root: &Node, value: Value) -> StoreResult<Node> {
        match self.segments.split_first() {
            None => match value {
                Value::Map(node) => Ok(node),
                other => Err(StoreError::invalid_path(
                    self,
                    format!("root must be a map, found {}", other.kind()),
                )),
            },
            Some((head, rest)) => self.assign_at(root, head, rest, value),
        }
    }

    fn assign_at(
        &self,
        node: &Node,
        segment: &str,
        rest: &[String],
        value: Value,
    ) -> StoreResult<Node> {
        let Some((next, tail)) = rest.split_first() else {
            return Ok(node.with_field(segment, value));
        };

        let child = match node.get(segment) {
            Some(Value::Map(child)) => child.clone(),
            None | Some(Value::Null) => Node::empty(),
            Some(other) => {
                return Err(StoreError::invalid_path(
                    self,
                    format!("cannot write through \"{segment}\", a {}", other.kind()),
                ))
            }
        };
        let child = self.assign_at(&child, next, tail, value)?;
        Ok(node.with_field(segment, Value::Map(child)))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str(ROOT)
        } else {
            f.write_str(&self.segments.join("."))
        }
    }
}

impl FromStr for Path {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::parse(s)
    }
}

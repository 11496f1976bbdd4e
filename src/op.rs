//! Patch operations: the externally visible unit of change.
//!
//! The wire shape is a restricted, path-array-augmented JSON-Patch-like
//! format: `{op, path, pathArray, value?, old?}`. There is no `move`,
//! `copy` or `test`.

use crate::Path;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of change a patch operation describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    /// A value appeared at a path where none existed.
    Add,
    /// The value at a path was removed.
    Remove,
    /// The value at a path was exchanged for another.
    Replace,
}

impl OpKind {
    /// Get the operation name as it appears on the wire.
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Add => "add",
            OpKind::Remove => "remove",
            OpKind::Replace => "replace",
        }
    }
}

/// A single normalized patch operation.
///
/// Operations carry both the rendered `path` string and the structural
/// `pathArray`, plus the new value and the pre-mutation value where the
/// kind has one. An operation whose `old` equals its `value` is a no-op
/// and is never emitted by the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatchOp {
    /// Operation kind.
    #[serde(rename = "op")]
    pub kind: OpKind,

    /// `/`-joined rendering of the path.
    pub path: String,

    /// The path as individual segments.
    #[serde(rename = "pathArray")]
    pub path_array: Path,

    /// The new value (`add` and `replace`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    /// The pre-mutation value (`remove` and `replace`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
}

impl PatchOp {
    /// Create an operation from its parts, rendering the path string.
    pub fn new(kind: OpKind, path_array: Path, value: Option<Value>, old: Option<Value>) -> Self {
        Self {
            kind,
            path: path_array.to_string(),
            path_array,
            value,
            old,
        }
    }

    /// Create an `add` operation.
    #[inline]
    pub fn add(path_array: Path, value: impl Into<Value>) -> Self {
        Self::new(OpKind::Add, path_array, Some(value.into()), None)
    }

    /// Create a `remove` operation.
    #[inline]
    pub fn remove(path_array: Path, old: impl Into<Value>) -> Self {
        Self::new(OpKind::Remove, path_array, None, Some(old.into()))
    }

    /// Create a `replace` operation.
    #[inline]
    pub fn replace(path_array: Path, value: impl Into<Value>, old: impl Into<Value>) -> Self {
        Self::new(
            OpKind::Replace,
            path_array,
            Some(value.into()),
            Some(old.into()),
        )
    }

    /// True when applying this operation would change nothing.
    #[inline]
    pub fn is_noop(&self) -> bool {
        self.old == self.value
    }

    /// The operation that undoes this one.
    ///
    /// `add` becomes `remove`, `remove` becomes `add`, `replace` swaps
    /// its value sides.
    pub fn invert(&self) -> PatchOp {
        let kind = match self.kind {
            OpKind::Add => OpKind::Remove,
            OpKind::Remove => OpKind::Add,
            OpKind::Replace => OpKind::Replace,
        };
        PatchOp::new(
            kind,
            self.path_array.clone(),
            self.old.clone(),
            self.value.clone(),
        )
    }

    /// Re-root this operation relative to an ancestor path.
    ///
    /// Returns `None` if `base` is not a strict prefix of the operation's
    /// path. Used when handing a sub-operation to a patch delegate.
    pub fn rebase(&self, base: &Path) -> Option<PatchOp> {
        if base.len() >= self.path_array.len() {
            return None;
        }
        let stripped = self.path_array.strip_prefix(base)?;
        Some(PatchOp::new(
            self.kind,
            stripped,
            self.value.clone(),
            self.old.clone(),
        ))
    }
}

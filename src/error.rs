//! Error types for trellis-state operations.

use crate::Path;
use thiserror::Error;

/// Result type alias for trellis-state operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur while mutating, subscribing, or applying patches.
///
/// This is an in-memory synchronous engine with no I/O: every failure is a
/// programmer-visible contract violation, never a transient condition, and
/// nothing is retried.
#[derive(Debug, Error)]
pub enum StateError {
    /// An intermediate path segment does not exist on the target.
    #[error("cannot walk patch path {path}: missing segment '{segment}'")]
    PathWalk {
        /// The full path being walked.
        path: Path,
        /// The segment that could not be resolved.
        segment: String,
    },

    /// The same subscriber was registered twice on one selector leaf.
    #[error("duplicate subscription on selector pattern '{pattern}'")]
    DuplicateSubscription {
        /// The pattern whose leaf already holds the subscriber.
        pattern: String,
    },

    /// Array index is out of bounds.
    #[error("index {index} out of bounds (len: {len}) at path {path}")]
    IndexOutOfBounds {
        /// The path to the array.
        path: Path,
        /// The index that was accessed.
        index: usize,
        /// The actual length of the array.
        len: usize,
    },

    /// Type mismatch when accessing a value.
    #[error("type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        /// The path where the mismatch occurred.
        path: Path,
        /// The expected type.
        expected: &'static str,
        /// The actual type found.
        found: &'static str,
    },

    /// A non-container value was encountered while splicing a snapshot.
    #[error("cannot splice snapshot under {path}: segment '{segment}' is not a container")]
    MergeConflict {
        /// The path of the operation owner receiving the splice.
        path: Path,
        /// The segment at which the walk hit a non-container.
        segment: String,
    },

    /// A writable view outlived the transaction it was created in.
    #[error("view used outside an open transaction")]
    TransactionClosed,

    /// A selector pattern could not be parsed.
    #[error("invalid selector pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StateError {
    /// Create a path walk error.
    #[inline]
    pub fn path_walk(path: Path, segment: impl Into<String>) -> Self {
        StateError::PathWalk {
            path,
            segment: segment.into(),
        }
    }

    /// Create a duplicate subscription error.
    #[inline]
    pub fn duplicate_subscription(pattern: impl Into<String>) -> Self {
        StateError::DuplicateSubscription {
            pattern: pattern.into(),
        }
    }

    /// Create an index out of bounds error.
    #[inline]
    pub fn index_out_of_bounds(path: Path, index: usize, len: usize) -> Self {
        StateError::IndexOutOfBounds { path, index, len }
    }

    /// Create a type mismatch error.
    #[inline]
    pub fn type_mismatch(path: Path, expected: &'static str, found: &'static str) -> Self {
        StateError::TypeMismatch {
            path,
            expected,
            found,
        }
    }

    /// Create a merge conflict error.
    #[inline]
    pub fn merge_conflict(path: Path, segment: impl Into<String>) -> Self {
        StateError::MergeConflict {
            path,
            segment: segment.into(),
        }
    }

    /// Create an invalid pattern error.
    #[inline]
    pub fn invalid_pattern(pattern: impl Into<String>, reason: &'static str) -> Self {
        StateError::InvalidPattern {
            pattern: pattern.into(),
            reason,
        }
    }
}

/// Get the type name of a JSON value.
#[inline]
pub fn value_type_name(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;

    #[test]
    fn test_error_display() {
        let err = StateError::path_walk(path!("a", "b", "c"), "b");
        assert!(err.to_string().contains("/a/b/c"));
        assert!(err.to_string().contains("'b'"));

        let err = StateError::duplicate_subscription("nodes/*/styles");
        assert!(err.to_string().contains("duplicate subscription"));
    }

    #[test]
    fn test_value_type_name() {
        use serde_json::json;

        assert_eq!(value_type_name(&json!(null)), "null");
        assert_eq!(value_type_name(&json!([1])), "array");
        assert_eq!(value_type_name(&json!({"a": 1})), "object");
    }
}

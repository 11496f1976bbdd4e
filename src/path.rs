//! Structural paths into a state document.
//!
//! A path is a sequence of string segments. Object keys are used verbatim,
//! array indices are rendered in decimal, and the synthetic segment `-`
//! addresses the append position of an array. This is the `pathArray` half
//! of the patch wire format; the `path` half is the `/`-joined rendering.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Synthetic segment addressing the append position of an array.
pub const APPEND: &str = "-";

/// A structural path into a state document.
///
/// # Examples
///
/// ```
/// use trellis_state::{path, Path};
///
/// let p = path!("nodes", "id1", "styles");
/// assert_eq!(p.len(), 3);
/// assert_eq!(p.to_string(), "/nodes/id1/styles");
///
/// // Numeric segments address array elements.
/// let q = path!("words", 0);
/// assert_eq!(q.to_string(), "/words/0");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<String>);

impl Path {
    /// Create an empty path (root).
    #[inline]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Create a path from a vector of segments.
    #[inline]
    pub fn from_segments(segments: Vec<String>) -> Self {
        Self(segments)
    }

    /// Parse a `/`-delimited path or pattern string.
    ///
    /// A leading `/` is optional; empty segments are dropped.
    pub fn parse(input: &str) -> Self {
        Self(
            input
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect(),
        )
    }

    /// Append a key segment and return self (builder pattern).
    #[inline]
    pub fn key(mut self, k: impl Into<String>) -> Self {
        self.0.push(k.into());
        self
    }

    /// Append an index segment and return self (builder pattern).
    #[inline]
    pub fn index(mut self, i: usize) -> Self {
        self.0.push(i.to_string());
        self
    }

    /// Push a segment onto the path (mutating).
    #[inline]
    pub fn push(&mut self, seg: impl Into<String>) {
        self.0.push(seg.into());
    }

    /// Pop the last segment from the path.
    #[inline]
    pub fn pop(&mut self) -> Option<String> {
        self.0.pop()
    }

    /// Get the segments of this path.
    #[inline]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Check if this path is empty (root).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the number of segments in this path.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Get the last segment.
    #[inline]
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Append a segment and return a new path (non-mutating builder).
    #[inline]
    pub fn with_segment(&self, seg: impl Into<String>) -> Path {
        let mut result = self.clone();
        result.0.push(seg.into());
        result
    }

    /// Join this path with another path.
    #[inline]
    pub fn join(&self, other: &Path) -> Path {
        let mut result = self.clone();
        result.0.extend(other.0.iter().cloned());
        result
    }

    /// Get the parent path (path without the last segment).
    #[inline]
    pub fn parent(&self) -> Option<Path> {
        if self.0.is_empty() {
            None
        } else {
            let mut p = self.clone();
            p.pop();
            Some(p)
        }
    }

    /// Check if this path is a prefix of another path.
    ///
    /// A path is a prefix of itself.
    #[inline]
    pub fn is_prefix_of(&self, other: &Path) -> bool {
        if self.len() > other.len() {
            return false;
        }
        self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }

    /// Remove a leading prefix, returning the remainder as a new path.
    ///
    /// Returns `None` if `prefix` is not a prefix of this path.
    pub fn strip_prefix(&self, prefix: &Path) -> Option<Path> {
        if !prefix.is_prefix_of(self) {
            return None;
        }
        Some(Path(self.0[prefix.len()..].to_vec()))
    }

    /// Iterate over the segments.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for seg in &self.0 {
            write!(f, "/{}", seg)?;
        }
        Ok(())
    }
}

impl FromIterator<String> for Path {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Path(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl std::ops::Index<usize> for Path {
    type Output = String;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

/// Construct a [`Path`] from a sequence of segments.
///
/// String literals are used verbatim, numbers become decimal index segments.
///
/// # Examples
///
/// ```
/// use trellis_state::path;
///
/// let p = path!("users", "alice", "email");
/// let q = path!("items", 0, "name");
/// assert_eq!(q.to_string(), "/items/0/name");
/// ```
#[macro_export]
macro_rules! path {
    () => {
        $crate::Path::root()
    };
    ($($seg:expr),+ $(,)?) => {{
        let mut p = $crate::Path::root();
        $(
            p.push($seg.to_string());
        )+
        p
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_construction() {
        let path = Path::root().key("users").index(0).key("name");
        assert_eq!(path.len(), 3);
        assert_eq!(path[0], "users");
        assert_eq!(path[1], "0");
        assert_eq!(path[2], "name");
    }

    #[test]
    fn test_path_display() {
        let path = Path::root().key("users").index(0).key("name");
        assert_eq!(path.to_string(), "/users/0/name");
        assert_eq!(Path::root().to_string(), "/");
    }

    #[test]
    fn test_path_macro() {
        let p = path!("users", 0, "name");
        assert_eq!(p.segments(), &["users", "0", "name"]);
    }

    #[test]
    fn test_path_parse() {
        assert_eq!(Path::parse("/a/b/c").segments(), &["a", "b", "c"]);
        assert_eq!(Path::parse("a/b").segments(), &["a", "b"]);
        assert_eq!(Path::parse("/").segments(), &[] as &[String]);
        assert_eq!(Path::parse("//a//b/").segments(), &["a", "b"]);
    }

    #[test]
    fn test_path_prefix() {
        let parent = path!("user");
        let child = path!("user", "name");
        assert!(parent.is_prefix_of(&child));
        assert!(!child.is_prefix_of(&parent));
        assert!(parent.is_prefix_of(&parent));
    }

    #[test]
    fn test_path_strip_prefix() {
        let base = path!("widgets", "w1");
        let full = path!("widgets", "w1", "styles", "margin");
        assert_eq!(
            full.strip_prefix(&base),
            Some(path!("styles", "margin"))
        );
        assert_eq!(full.strip_prefix(&path!("other")), None);
    }

    #[test]
    fn test_path_parent() {
        let path = path!("a", "b");
        assert_eq!(path.parent(), Some(path!("a")));
        assert_eq!(Path::root().parent(), None);
    }

    #[test]
    fn test_path_serde() {
        let path = path!("users", 0);
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, r#"["users","0"]"#);
        let parsed: Path = serde_json::from_str(&json).unwrap();
        assert_eq!(path, parsed);
    }
}

//! Writable and recording views over a store document.
//!
//! [`TreeView`] is the capability surface a `mutate` callback writes
//! through: every `set`/`delete`/array helper captures the pre-existing
//! value, feeds the elementary edit into the transaction's mutation tree,
//! advances the active selector pointers, and applies the write to the
//! live document immediately. [`ReadView`] is the read-only counterpart a
//! reaction runs against: it records every path it resolves so the
//! reaction's dependency set can be rebuilt from actual reads.

use crate::error::value_type_name;
use crate::store::StoreInner;
use crate::{Path, StateError, StateResult};
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;

/// Resolve a path against a document, returning `None` on any miss.
pub(crate) fn lookup<'a>(doc: &'a Value, path: &Path) -> Option<&'a Value> {
    let mut cur = doc;
    for seg in path {
        cur = match cur {
            Value::Object(map) => map.get(seg)?,
            Value::Array(arr) => arr.get(seg.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(cur)
}

pub(crate) fn lookup_mut<'a>(doc: &'a mut Value, path: &Path) -> Option<&'a mut Value> {
    let mut cur = doc;
    for seg in path {
        cur = match cur {
            Value::Object(map) => map.get_mut(seg)?,
            Value::Array(arr) => arr.get_mut(seg.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(cur)
}

/// A writable view of one node in a store's document, bound to the open
/// transaction.
///
/// Views are cheap to clone and to derive (`child` registers the child
/// path once per transaction). Reads return clones of the current
/// document state, including writes applied earlier in the same
/// transaction.
#[derive(Clone)]
pub struct TreeView {
    store: Rc<StoreInner>,
    path: Path,
}

impl TreeView {
    pub(crate) fn root(store: Rc<StoreInner>) -> Self {
        Self {
            store,
            path: Path::root(),
        }
    }

    /// The path of this view relative to the store root.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A view of the value under `key`.
    pub fn child(&self, key: impl Into<String>) -> TreeView {
        let path = self.path.with_segment(key);
        let in_txn = self.store.txn.borrow().is_some();
        if in_txn {
            // pointer descent happens once per path per transaction
            let _ = self.store.ensure_entry(&path);
        }
        TreeView {
            store: Rc::clone(&self.store),
            path,
        }
    }

    /// A view of the array element at `index`.
    pub fn child_index(&self, index: usize) -> TreeView {
        self.child(index.to_string())
    }

    /// Clone the value this view points at, if it exists.
    pub fn value(&self) -> Option<Value> {
        let doc = self.store.doc.borrow();
        lookup(&doc, &self.path).cloned()
    }

    /// Clone the value under `key`.
    ///
    /// On an array, a decimal `key` addresses the element at that index.
    pub fn get(&self, key: &str) -> Option<Value> {
        let doc = self.store.doc.borrow();
        match lookup(&doc, &self.path)? {
            Value::Object(map) => map.get(key).cloned(),
            Value::Array(arr) => key.parse::<usize>().ok().and_then(|i| arr.get(i)).cloned(),
            _ => None,
        }
    }

    /// Clone the array element at `index`.
    pub fn get_index(&self, index: usize) -> Option<Value> {
        self.get(&index.to_string())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// The keys of the object (or the decimal indices of the array) this
    /// view points at.
    pub fn keys(&self) -> StateResult<Vec<String>> {
        let doc = self.store.doc.borrow();
        match lookup(&doc, &self.path) {
            Some(Value::Object(map)) => Ok(map.keys().cloned().collect()),
            Some(Value::Array(arr)) => Ok((0..arr.len()).map(|i| i.to_string()).collect()),
            Some(other) => Err(StateError::type_mismatch(
                self.path.clone(),
                "object or array",
                value_type_name(other),
            )),
            None => Err(self.missing()),
        }
    }

    /// Number of elements (array) or entries (object).
    pub fn len(&self) -> StateResult<usize> {
        let doc = self.store.doc.borrow();
        match lookup(&doc, &self.path) {
            Some(Value::Object(map)) => Ok(map.len()),
            Some(Value::Array(arr)) => Ok(arr.len()),
            Some(other) => Err(StateError::type_mismatch(
                self.path.clone(),
                "object or array",
                value_type_name(other),
            )),
            None => Err(self.missing()),
        }
    }

    pub fn is_empty(&self) -> StateResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Write `value` under `key`, recording the edit.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> StateResult<()> {
        let key = key.into();
        let value = value.into();
        let old = {
            let doc = self.store.doc.borrow();
            match lookup(&doc, &self.path) {
                Some(Value::Object(map)) => map.get(&key).cloned(),
                Some(other) => {
                    return Err(StateError::type_mismatch(
                        self.path.clone(),
                        "object",
                        value_type_name(other),
                    ))
                }
                None => return Err(self.missing()),
            }
        };
        self.store
            .write(&self.path.with_segment(key.clone()), old, Some(value.clone()))?;
        self.with_target_mut(move |target| {
            if let Value::Object(map) = target {
                map.insert(key, value);
            }
            Ok(())
        })
    }

    /// Delete `key`, recording the edit. Deleting a missing key is a no-op.
    pub fn delete(&self, key: &str) -> StateResult<()> {
        let old = {
            let doc = self.store.doc.borrow();
            match lookup(&doc, &self.path) {
                Some(Value::Object(map)) => match map.get(key) {
                    Some(v) => v.clone(),
                    None => return Ok(()),
                },
                Some(other) => {
                    return Err(StateError::type_mismatch(
                        self.path.clone(),
                        "object",
                        value_type_name(other),
                    ))
                }
                None => return Ok(()),
            }
        };
        self.store
            .write(&self.path.with_segment(key), Some(old), None)?;
        let key = key.to_owned();
        self.with_target_mut(move |target| {
            if let Value::Object(map) = target {
                map.remove(&key);
            }
            Ok(())
        })
    }

    /// Replace the array element at `index`.
    pub fn set_index(&self, index: usize, value: impl Into<Value>) -> StateResult<()> {
        let value = value.into();
        let len = self.array_len()?;
        if index >= len {
            return Err(StateError::index_out_of_bounds(self.path.clone(), index, len));
        }
        let old = self.array_elem(index)?;
        self.store.write(
            &self.path.with_segment(index.to_string()),
            Some(old),
            Some(value.clone()),
        )?;
        self.with_target_mut(move |target| {
            if let Value::Array(arr) = target {
                arr[index] = value;
            }
            Ok(())
        })
    }

    /// Null out the array element at `index` without shrinking the array.
    ///
    /// Recorded as a replace-to-null so replaying the patch reproduces the
    /// same shape.
    pub fn delete_index(&self, index: usize) -> StateResult<()> {
        let len = self.array_len()?;
        if index >= len {
            return Err(StateError::index_out_of_bounds(self.path.clone(), index, len));
        }
        let old = self.array_elem(index)?;
        self.store.write(
            &self.path.with_segment(index.to_string()),
            Some(old),
            Some(Value::Null),
        )?;
        self.with_target_mut(move |target| {
            if let Value::Array(arr) = target {
                arr[index] = Value::Null;
            }
            Ok(())
        })
    }

    /// Insert `value` at `index`, shifting later elements right.
    pub fn insert_index(&self, index: usize, value: impl Into<Value>) -> StateResult<()> {
        let value = value.into();
        let len = self.array_len()?;
        if index > len {
            return Err(StateError::index_out_of_bounds(self.path.clone(), index, len));
        }
        self.store.write(
            &self.path.with_segment(index.to_string()),
            None,
            Some(value.clone()),
        )?;
        self.with_target_mut(move |target| {
            if let Value::Array(arr) = target {
                arr.insert(index, value);
            }
            Ok(())
        })
    }

    /// Remove and return the array element at `index`, shifting later
    /// elements left.
    pub fn remove_index(&self, index: usize) -> StateResult<Value> {
        let len = self.array_len()?;
        if index >= len {
            return Err(StateError::index_out_of_bounds(self.path.clone(), index, len));
        }
        let old = self.array_elem(index)?;
        self.store.write(
            &self.path.with_segment(index.to_string()),
            Some(old.clone()),
            None,
        )?;
        self.with_target_mut(move |target| {
            if let Value::Array(arr) = target {
                arr.remove(index);
            }
            Ok(())
        })?;
        Ok(old)
    }

    /// Append one value, recorded as a single `add` at the synthetic `-`
    /// segment. Repeated pushes in one transaction accumulate into the
    /// same operation.
    pub fn push(&self, value: impl Into<Value>) -> StateResult<()> {
        self.push_all(vec![value.into()])
    }

    /// Append a slice of values as one edit.
    pub fn push_all(&self, values: Vec<Value>) -> StateResult<()> {
        self.array_len()?;
        self.store.append(&self.path, values.clone())?;
        self.with_target_mut(move |target| {
            if let Value::Array(arr) = target {
                arr.extend(values);
            }
            Ok(())
        })
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> StateResult<Option<Value>> {
        let len = self.array_len()?;
        if len == 0 {
            return Ok(None);
        }
        self.remove_index(len - 1).map(Some)
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> StateResult<Option<Value>> {
        let len = self.array_len()?;
        if len == 0 {
            return Ok(None);
        }
        self.remove_index(0).map(Some)
    }

    /// Insert values at the front of the array.
    pub fn unshift(&self, values: Vec<Value>) -> StateResult<()> {
        self.array_len()?;
        for (i, v) in values.iter().enumerate() {
            self.store
                .write(&self.path.with_segment(i.to_string()), None, Some(v.clone()))?;
        }
        self.with_target_mut(move |target| {
            if let Value::Array(arr) = target {
                for (i, v) in values.into_iter().enumerate() {
                    arr.insert(i, v);
                }
            }
            Ok(())
        })
    }

    /// Remove `delete_count` elements starting at `start`, then insert
    /// `items` there. Returns the removed elements.
    ///
    /// Removals are recorded at explicit indices (highest first) and
    /// insertions as adds at their final indices, so the whole slice edit
    /// stays a bounded set of operations.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        items: Vec<Value>,
    ) -> StateResult<Vec<Value>> {
        let len = self.array_len()?;
        if start > len {
            return Err(StateError::index_out_of_bounds(self.path.clone(), start, len));
        }
        if start + delete_count > len {
            return Err(StateError::index_out_of_bounds(
                self.path.clone(),
                start + delete_count,
                len,
            ));
        }
        let removed: Vec<Value> = {
            let doc = self.store.doc.borrow();
            match lookup(&doc, &self.path) {
                Some(Value::Array(arr)) => arr[start..start + delete_count].to_vec(),
                _ => return Err(self.missing()),
            }
        };
        for (i, v) in removed.iter().enumerate().rev() {
            self.store.write(
                &self.path.with_segment((start + i).to_string()),
                Some(v.clone()),
                None,
            )?;
        }
        self.with_target_mut(move |target| {
            if let Value::Array(arr) = target {
                arr.drain(start..start + delete_count);
            }
            Ok(())
        })?;
        for (i, v) in items.iter().enumerate() {
            self.store.write(
                &self.path.with_segment((start + i).to_string()),
                None,
                Some(v.clone()),
            )?;
        }
        if !items.is_empty() {
            self.with_target_mut(move |target| {
                if let Value::Array(arr) = target {
                    for (i, v) in items.into_iter().enumerate() {
                        arr.insert(start + i, v);
                    }
                }
                Ok(())
            })?;
        }
        Ok(removed)
    }

    fn array_len(&self) -> StateResult<usize> {
        let doc = self.store.doc.borrow();
        match lookup(&doc, &self.path) {
            Some(Value::Array(arr)) => Ok(arr.len()),
            Some(other) => Err(StateError::type_mismatch(
                self.path.clone(),
                "array",
                value_type_name(other),
            )),
            None => Err(self.missing()),
        }
    }

    fn array_elem(&self, index: usize) -> StateResult<Value> {
        let doc = self.store.doc.borrow();
        match lookup(&doc, &self.path) {
            Some(Value::Array(arr)) => arr
                .get(index)
                .cloned()
                .ok_or_else(|| StateError::index_out_of_bounds(self.path.clone(), index, arr.len())),
            _ => Err(self.missing()),
        }
    }

    fn with_target_mut<R>(
        &self,
        f: impl FnOnce(&mut Value) -> StateResult<R>,
    ) -> StateResult<R> {
        let mut doc = self.store.doc.borrow_mut();
        match lookup_mut(&mut doc, &self.path) {
            Some(target) => f(target),
            None => Err(self.missing()),
        }
    }

    fn missing(&self) -> StateError {
        let segment = self.path.last().unwrap_or("").to_owned();
        StateError::path_walk(self.path.clone(), segment)
    }
}

/// Deduplicating collector of the paths a reaction read.
pub(crate) struct Recorder {
    paths: RefCell<Vec<Path>>,
}

impl Recorder {
    pub(crate) fn new() -> Self {
        Self {
            paths: RefCell::new(Vec::new()),
        }
    }

    fn record(&self, path: Path) {
        let mut paths = self.paths.borrow_mut();
        if !paths.contains(&path) {
            paths.push(path);
        }
    }

    pub(crate) fn take_paths(&self) -> Vec<Path> {
        std::mem::take(&mut self.paths.borrow_mut())
    }
}

/// A read-only view that records every path it resolves.
///
/// Handed to reaction functions; the recorded set becomes the reaction's
/// selector registrations until its next run.
pub struct ReadView<'a> {
    root: &'a Value,
    path: Path,
    recorder: &'a Recorder,
}

impl<'a> ReadView<'a> {
    pub(crate) fn new(root: &'a Value, recorder: &'a Recorder) -> Self {
        Self {
            root,
            path: Path::root(),
            recorder,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Clone the value under `key`, registering the exact path as a
    /// dependency.
    pub fn get(&self, key: &str) -> Option<Value> {
        let path = self.path.with_segment(key);
        self.recorder.record(path.clone());
        lookup(self.root, &path).cloned()
    }

    pub fn get_index(&self, index: usize) -> Option<Value> {
        self.get(&index.to_string())
    }

    /// A view of the value under `key`; the step itself is a dependency.
    pub fn child(&self, key: impl Into<String>) -> ReadView<'a> {
        let path = self.path.with_segment(key);
        self.recorder.record(path.clone());
        ReadView {
            root: self.root,
            path,
            recorder: self.recorder,
        }
    }

    pub fn child_index(&self, index: usize) -> ReadView<'a> {
        self.child(index.to_string())
    }

    /// Clone the value this view points at, registering its path.
    pub fn value(&self) -> Option<Value> {
        self.recorder.record(self.path.clone());
        lookup(self.root, &self.path).cloned()
    }

    /// Keys of the target; enumeration registers a single-level wildcard
    /// so any key addition/removal/change at this level triggers a rerun.
    pub fn keys(&self) -> Vec<String> {
        self.recorder
            .record(self.path.with_segment(crate::selector::WILDCARD));
        match lookup(self.root, &self.path) {
            Some(Value::Object(map)) => map.keys().cloned().collect(),
            Some(Value::Array(arr)) => (0..arr.len()).map(|i| i.to_string()).collect(),
            _ => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.recorder
            .record(self.path.with_segment(crate::selector::WILDCARD));
        match lookup(self.root, &self.path) {
            Some(Value::Object(map)) => map.len(),
            Some(Value::Array(arr)) => arr.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use serde_json::json;

    #[test]
    fn test_lookup() {
        let doc = json!({"a": {"b": [10, 20]}});
        assert_eq!(lookup(&doc, &path!("a", "b", 1)), Some(&json!(20)));
        assert_eq!(lookup(&doc, &path!("a", "x")), None);
        assert_eq!(lookup(&doc, &path!("a", "b", 5)), None);
        assert_eq!(lookup(&doc, &Path::root()), Some(&doc));
    }

    #[test]
    fn test_read_view_records_reads() {
        let doc = json!({"user": {"name": "ada", "tags": ["x"]}});
        let recorder = Recorder::new();
        let view = ReadView::new(&doc, &recorder);

        assert_eq!(view.child("user").get("name"), Some(json!("ada")));
        let tags = view.child("user").child("tags");
        assert_eq!(tags.len(), 1);

        let mut paths: Vec<String> = recorder
            .take_paths()
            .into_iter()
            .map(|p| p.to_string())
            .collect();
        paths.sort();
        assert_eq!(
            paths,
            vec!["/user", "/user/name", "/user/tags", "/user/tags/*"]
        );
    }

    #[test]
    fn test_read_view_deduplicates() {
        let doc = json!({"count": 1});
        let recorder = Recorder::new();
        let view = ReadView::new(&doc, &recorder);
        view.get("count");
        view.get("count");
        assert_eq!(recorder.take_paths().len(), 1);
    }
}

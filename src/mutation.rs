//! Per-transaction mutation tree.
//!
//! Every structural path touched by a transaction gets one tree node. A node
//! either owns a pending operation or is covered by exactly one owner among
//! its ancestors: ownership is unique along any root-to-node path. Recording
//! an edit either updates the node's own operation, folds the edit into an
//! ancestor owner's `new` value in place, or promotes the node to owner and
//! absorbs every already-recorded descendant edit into its snapshot.
//!
//! The tombstone of the source design is the `None` arm of `Option<Value>`:
//! `old == None` means the path did not exist before, `new == None` means it
//! no longer exists after.

use crate::{OpKind, Path, PatchOp, StateError, StateResult};
use serde_json::{Map, Value};
use std::collections::HashMap;

pub(crate) type NodeId = usize;

const ROOT: NodeId = 0;

/// An operation owned by a mutation tree node.
#[derive(Clone, Debug)]
pub(crate) struct OwnedOp {
    pub kind: OpKind,
    pub old: Option<Value>,
    pub new: Option<Value>,
    /// Monotonic ownership order; patch output is sorted by this.
    pub order: u64,
}

#[derive(Debug)]
struct MutationNode {
    key: String,
    parent: Option<NodeId>,
    children: HashMap<String, NodeId>,
    op: Option<OwnedOp>,
}

/// Arena-allocated tree of pending edits, scoped to one transaction.
#[derive(Debug)]
pub(crate) struct MutationTree {
    nodes: Vec<MutationNode>,
}

impl MutationTree {
    pub(crate) fn new() -> Self {
        Self {
            nodes: vec![MutationNode {
                key: String::new(),
                parent: None,
                children: HashMap::new(),
                op: None,
            }],
        }
    }

    pub(crate) fn root(&self) -> NodeId {
        ROOT
    }

    /// Get or create the child of `node` for `key`.
    pub(crate) fn child(&mut self, node: NodeId, key: &str) -> NodeId {
        if let Some(&id) = self.nodes[node].children.get(key) {
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(MutationNode {
            key: key.to_owned(),
            parent: Some(node),
            children: HashMap::new(),
            op: None,
        });
        self.nodes[node].children.insert(key.to_owned(), id);
        id
    }

    /// The pending `new` value at a node, when the node owns an operation.
    ///
    /// Append bookkeeping reads this to accumulate repeated pushes into one
    /// operation instead of overwriting the earlier slice.
    pub(crate) fn pending_new(&self, id: NodeId) -> Option<&Value> {
        self.nodes[id].op.as_ref().and_then(|op| op.new.as_ref())
    }

    /// Absolute path of a node, for error reporting.
    fn path_of(&self, mut id: NodeId) -> Path {
        let mut segs = Vec::new();
        while let Some(parent) = self.nodes[id].parent {
            segs.push(self.nodes[id].key.clone());
            id = parent;
        }
        segs.reverse();
        Path::from_segments(segs)
    }

    /// Walk ancestors for the nearest node owning an operation.
    ///
    /// Returns the owner and the relative path from the owner down to `id`
    /// (the last element is `id`'s own key).
    fn owner_above(&self, id: NodeId) -> Option<(NodeId, Vec<String>)> {
        let mut rel = vec![self.nodes[id].key.clone()];
        let mut cursor = id;
        while let Some(parent) = self.nodes[cursor].parent {
            if self.nodes[parent].op.is_some() {
                rel.reverse();
                return Some((parent, rel));
            }
            if self.nodes[parent].parent.is_some() {
                rel.push(self.nodes[parent].key.clone());
            }
            cursor = parent;
        }
        None
    }

    /// Record an elementary (old, new) edit at a node.
    ///
    /// `order` is consumed only when the node becomes a fresh owner.
    pub(crate) fn record(
        &mut self,
        id: NodeId,
        old: Option<Value>,
        new: Option<Value>,
        order: u64,
    ) -> StateResult<()> {
        // 1. The node already owns an operation: update it in place.
        if let Some(op) = self.nodes[id].op.as_mut() {
            match new {
                None => {
                    op.new = None;
                    op.kind = OpKind::Remove;
                }
                Some(v) => {
                    op.new = Some(v);
                    if op.kind == OpKind::Remove {
                        op.kind = OpKind::Replace;
                    }
                }
            }
            return Ok(());
        }

        // 2. An ancestor owner subsumes this edit: splice into its `new`.
        if let Some((owner, rel)) = self.owner_above(id) {
            let base = self.path_of(owner);
            if let Some(op) = self.nodes[owner].op.as_mut() {
                // Writing under a removed subtree is a detached edit; the
                // owner has no `new` to receive it and the write is dropped.
                if let Some(target) = op.new.as_mut() {
                    let (last, inter) = split_rel(&rel);
                    splice(target, inter, last, new, &base)?;
                }
            }
            return Ok(());
        }

        // 3. The node becomes the new owner.
        let kind = match (&old, &new) {
            (_, None) => OpKind::Remove,
            (None, _) => OpKind::Add,
            _ => OpKind::Replace,
        };
        self.nodes[id].op = Some(OwnedOp {
            kind,
            old,
            new,
            order,
        });

        // Fold every already-recorded descendant edit into this owner.
        let children: Vec<NodeId> = self.nodes[id].children.values().copied().collect();
        for child in children {
            self.absorb(child)?;
        }
        Ok(())
    }

    /// Fold a subsumed descendant's operation into its owning ancestor.
    ///
    /// The descendant's `old` is what existed before its own (earlier) edit,
    /// so splicing it over the ancestor's freshly captured snapshot restores
    /// the true pre-transaction state. Absorbed nodes keep their tree slots
    /// so later edits at the same paths resume recording against them.
    fn absorb(&mut self, id: NodeId) -> StateResult<()> {
        let children: Vec<NodeId> = self.nodes[id].children.values().copied().collect();
        for child in children {
            self.absorb(child)?;
        }

        let Some(desc_op) = self.nodes[id].op.take() else {
            return Ok(());
        };

        let Some((owner, rel)) = self.owner_above(id) else {
            return Ok(());
        };
        let base = self.path_of(owner);
        let (last, inter) = split_rel(&rel);

        if let Some(old_value) = desc_op.old {
            if let Some(op) = self.nodes[owner].op.as_mut() {
                if let Some(target) = op.old.as_mut() {
                    splice(target, inter, last, Some(old_value), &base)?;
                }
            }
        }

        // A key added during the transaction never existed in the original
        // state; if its subtree ends up inside a remove's retained snapshot,
        // the key must be deleted from that snapshot.
        if desc_op.kind == OpKind::Add {
            if let Some(op) = self.nodes[owner].op.as_mut() {
                if op.kind == OpKind::Remove {
                    if let Some(target) = op.old.as_mut() {
                        splice(target, inter, last, None, &base)?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Walk the committed tree into ordered, normalized patch operations.
    ///
    /// Tree traversal order is not write order; output is sorted by the
    /// monotonic order recorded at ownership time so consumers can replay
    /// the changeset chronologically.
    pub(crate) fn compile(&self) -> Vec<PatchOp> {
        let mut acc: Vec<(u64, PatchOp)> = Vec::new();
        self.collect(ROOT, &Path::root(), &mut acc);
        acc.sort_by_key(|(order, _)| *order);
        acc.into_iter()
            .map(|(_, op)| op)
            .filter(|op| !op.is_noop())
            .collect()
    }

    fn collect(&self, id: NodeId, path: &Path, acc: &mut Vec<(u64, PatchOp)>) {
        if let Some(op) = &self.nodes[id].op {
            acc.push((
                op.order,
                PatchOp::new(op.kind, path.clone(), op.new.clone(), op.old.clone()),
            ));
            // Descendants of an owner cannot own operations themselves.
            return;
        }
        for (key, &child) in &self.nodes[id].children {
            self.collect(child, &path.with_segment(key.clone()), acc);
        }
    }
}

fn split_rel(rel: &[String]) -> (&str, &[String]) {
    match rel.split_last() {
        Some((last, inter)) => (last.as_str(), inter),
        None => ("", &[]),
    }
}

/// Write (or delete, when `incoming` is `None`) a value at a relative path
/// inside a snapshot, creating intermediate objects along the way.
fn splice(
    root: &mut Value,
    intermediates: &[String],
    key: &str,
    incoming: Option<Value>,
    base: &Path,
) -> StateResult<()> {
    let mut cursor = root;
    for seg in intermediates {
        cursor = match cursor {
            Value::Object(map) => map
                .entry(seg.clone())
                .or_insert_with(|| Value::Object(Map::new())),
            Value::Array(arr) => {
                let len = arr.len();
                let idx = seg
                    .parse::<usize>()
                    .map_err(|_| StateError::merge_conflict(base.clone(), seg.clone()))?;
                arr.get_mut(idx)
                    .ok_or_else(|| StateError::index_out_of_bounds(base.clone(), idx, len))?
            }
            _ => return Err(StateError::merge_conflict(base.clone(), seg.clone())),
        };
    }

    match cursor {
        Value::Object(map) => {
            match incoming {
                Some(v) => {
                    map.insert(key.to_owned(), v);
                }
                None => {
                    map.remove(key);
                }
            }
            Ok(())
        }
        Value::Array(arr) => {
            if key == crate::path::APPEND {
                if let Some(v) = incoming {
                    match v {
                        Value::Array(items) => arr.extend(items),
                        other => arr.push(other),
                    }
                }
                return Ok(());
            }
            let idx = key
                .parse::<usize>()
                .map_err(|_| StateError::merge_conflict(base.clone(), key.to_owned()))?;
            match incoming {
                Some(v) => {
                    if idx < arr.len() {
                        arr[idx] = v;
                    } else if idx == arr.len() {
                        arr.push(v);
                    } else {
                        return Err(StateError::index_out_of_bounds(
                            base.clone(),
                            idx,
                            arr.len(),
                        ));
                    }
                }
                None => {
                    if idx < arr.len() {
                        arr.remove(idx);
                    }
                }
            }
            Ok(())
        }
        _ => Err(StateError::merge_conflict(base.clone(), key.to_owned())),
    }
}

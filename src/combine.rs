//! Legacy flat-list patch combination.
//!
//! Pre-dates the mutation tree: folds an unstructured operation list into
//! a minimal one by pairwise path containment, achieving the same output
//! contract without per-transaction structure. Kept for callers that
//! gather operations outside a transaction. O(n²) in operation count,
//! which is bounded by edits per batch.

use crate::{OpKind, PatchOp};
use serde_json::{Map, Value};

/// Fold an ordered operation list into a minimal equivalent one.
///
/// A parent operation absorbs operations beneath its path: `remove` and
/// `replace` swallow them outright, `add` merges the child's effect into
/// its carried value at the relative sub-path. Two operations at the same
/// path collapse by kind (`remove` then `add` becomes `replace`, an
/// `add` then `remove` of the same key cancels, and so on).
pub fn combine_patches(ops: &[PatchOp]) -> Vec<PatchOp> {
    let mut out: Vec<PatchOp> = Vec::new();
    'next: for op in ops {
        let mut op = op.clone();
        let mut cancelled: Option<usize> = None;
        for (i, kept) in out.iter_mut().enumerate() {
            if kept.path_array == op.path_array {
                match collapse_same_path(kept, &op) {
                    SamePath::Updated => continue 'next,
                    SamePath::Cancelled => {
                        cancelled = Some(i);
                        break;
                    }
                }
            }
            if kept.path_array.is_prefix_of(&op.path_array) {
                absorb_child(kept, &op);
                continue 'next;
            }
        }
        if let Some(i) = cancelled {
            out.remove(i);
            continue;
        }
        // a later parent swallows earlier child operations
        if matches!(op.kind, OpKind::Remove | OpKind::Replace) {
            out.retain(|kept| !op.path_array.is_prefix_of(&kept.path_array));
        } else if op.kind == OpKind::Add {
            let children: Vec<PatchOp> = out
                .iter()
                .filter(|kept| op.path_array.is_prefix_of(&kept.path_array))
                .cloned()
                .collect();
            for child in &children {
                absorb_child(&mut op, child);
            }
            out.retain(|kept| !op.path_array.is_prefix_of(&kept.path_array));
        }
        out.push(op);
    }
    out
}

enum SamePath {
    Updated,
    Cancelled,
}

fn collapse_same_path(kept: &mut PatchOp, incoming: &PatchOp) -> SamePath {
    match (kept.kind, incoming.kind) {
        // the key never existed outside this batch
        (OpKind::Add, OpKind::Remove) => SamePath::Cancelled,
        (OpKind::Remove, OpKind::Add) => {
            kept.kind = OpKind::Replace;
            kept.value = incoming.value.clone();
            SamePath::Updated
        }
        (OpKind::Add, _) => {
            kept.value = incoming.value.clone();
            SamePath::Updated
        }
        (_, OpKind::Remove) => {
            kept.kind = OpKind::Remove;
            kept.value = None;
            SamePath::Updated
        }
        _ => {
            kept.kind = OpKind::Replace;
            kept.value = incoming.value.clone();
            SamePath::Updated
        }
    }
}

/// Fold `child` (whose path is strictly beneath `parent`'s) into `parent`.
fn absorb_child(parent: &mut PatchOp, child: &PatchOp) {
    match parent.kind {
        // everything beneath a remove or replace is already subsumed
        OpKind::Remove | OpKind::Replace => {}
        OpKind::Add => {
            if let (Some(value), Some(rel)) = (
                parent.value.as_mut(),
                child.path_array.strip_prefix(&parent.path_array),
            ) {
                let incoming = match child.kind {
                    OpKind::Remove => None,
                    _ => child.value.clone(),
                };
                merge_at(value, rel.segments(), incoming);
            }
        }
    }
}

fn merge_at(target: &mut Value, rel: &[String], incoming: Option<Value>) {
    let Some((key, intermediates)) = rel.split_last() else {
        return;
    };
    let mut cursor = target;
    for seg in intermediates {
        cursor = match cursor {
            Value::Object(map) => map
                .entry(seg.clone())
                .or_insert_with(|| Value::Object(Map::new())),
            Value::Array(arr) => match seg.parse::<usize>().ok().and_then(|i| arr.get_mut(i)) {
                Some(v) => v,
                None => return,
            },
            _ => return,
        };
    }
    match cursor {
        Value::Object(map) => match incoming {
            Some(v) => {
                map.insert(key.clone(), v);
            }
            None => {
                map.remove(key);
            }
        },
        Value::Array(arr) => {
            if key == crate::path::APPEND {
                if let Some(Value::Array(items)) = incoming {
                    arr.extend(items);
                } else if let Some(v) = incoming {
                    arr.push(v);
                }
                return;
            }
            if let Some(i) = key.parse::<usize>().ok().filter(|&i| i < arr.len()) {
                match incoming {
                    Some(v) => arr[i] = v,
                    None => {
                        arr.remove(i);
                    }
                }
            }
        }
        _ => {}
    }
}

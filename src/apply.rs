//! Structural application of patch operations through a writable view.

use crate::error::value_type_name;
use crate::path::APPEND;
use crate::view::TreeView;
use crate::{OpKind, Path, PatchOp, StateError, StateResult};
use serde_json::Value;

/// Walk `path` down from `view`, erroring on the first missing segment.
pub(crate) fn descend(view: &TreeView, path: &Path) -> StateResult<TreeView> {
    let mut cur = view.clone();
    for seg in path {
        if cur.get(seg).is_none() {
            return Err(StateError::path_walk(view.path().join(path), seg.clone()));
        }
        cur = cur.child(seg.clone());
    }
    Ok(cur)
}

fn required_value(op: &PatchOp) -> StateResult<Value> {
    op.value.clone().ok_or_else(|| {
        StateError::type_mismatch(op.path_array.clone(), "value", "nothing")
    })
}

/// Apply one operation at its `pathArray` through the view's capability
/// surface.
pub(crate) fn apply_via_view(view: &TreeView, op: &PatchOp) -> StateResult<()> {
    let Some(parent_path) = op.path_array.parent() else {
        // root-level operations have no parent container to act through
        return Err(StateError::path_walk(op.path_array.clone(), String::new()));
    };
    let last = op.path_array.last().unwrap_or_default().to_owned();
    let target = descend(view, &parent_path)?;

    let container = target
        .value()
        .ok_or_else(|| StateError::path_walk(op.path_array.clone(), last.clone()))?;
    match container {
        Value::Object(_) => match op.kind {
            OpKind::Add | OpKind::Replace => target.set(last, required_value(op)?),
            OpKind::Remove => target.delete(&last),
        },
        Value::Array(_) => {
            if last == APPEND {
                return match required_value(op)? {
                    Value::Array(items) => target.push_all(items),
                    single => target.push(single),
                };
            }
            let index: usize = last
                .parse()
                .map_err(|_| StateError::path_walk(op.path_array.clone(), last.clone()))?;
            match op.kind {
                OpKind::Add => target.insert_index(index, required_value(op)?),
                OpKind::Replace => target.set_index(index, required_value(op)?),
                OpKind::Remove => target.remove_index(index).map(|_| ()),
            }
        }
        other => Err(StateError::type_mismatch(
            parent_path,
            "object or array",
            value_type_name(&other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{path, Store};
    use serde_json::json;

    fn apply_all(store: &Store, ops: Vec<PatchOp>) -> StateResult<Vec<PatchOp>> {
        store.mutate(|view| {
            for op in &ops {
                apply_via_view(view, op)?;
            }
            Ok(())
        })
    }

    #[test]
    fn test_apply_object_ops() {
        let store = Store::new(json!({"user": {"name": "ada"}}));
        apply_all(
            &store,
            vec![
                PatchOp::replace(path!("user", "name"), json!("grace"), json!("ada")),
                PatchOp::add(path!("user", "role"), json!("admin")),
            ],
        )
        .unwrap();
        assert_eq!(
            store.snapshot(),
            json!({"user": {"name": "grace", "role": "admin"}})
        );

        apply_all(&store, vec![PatchOp::remove(path!("user", "role"), json!("admin"))]).unwrap();
        assert_eq!(store.snapshot(), json!({"user": {"name": "grace"}}));
    }

    #[test]
    fn test_apply_array_ops() {
        let store = Store::new(json!({"words": ["a", "b"]}));
        apply_all(
            &store,
            vec![
                PatchOp::add(path!("words", "-"), json!(["c", "d"])),
                PatchOp::replace(path!("words", 0), json!("A"), json!("a")),
                PatchOp::remove(path!("words", 1), json!("b")),
            ],
        )
        .unwrap();
        assert_eq!(store.snapshot(), json!({"words": ["A", "c", "d"]}));
    }

    #[test]
    fn test_apply_insert_at_index() {
        let store = Store::new(json!({"words": ["a", "c"]}));
        apply_all(&store, vec![PatchOp::add(path!("words", 1), json!("b"))]).unwrap();
        assert_eq!(store.snapshot(), json!({"words": ["a", "b", "c"]}));
    }

    #[test]
    fn test_missing_segment_is_fatal() {
        let store = Store::new(json!({"a": {}}));
        let err = apply_all(
            &store,
            vec![PatchOp::replace(path!("a", "b", "c"), json!(1), json!(0))],
        )
        .unwrap_err();
        assert!(matches!(err, StateError::PathWalk { .. }));
        // rollback leaves the document untouched
        assert_eq!(store.snapshot(), json!({"a": {}}));
    }
}

//! Auto-tracking reactions: dependency sets rebuilt from actual reads.

use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use trellis_state::Store;

#[test]
fn test_runs_immediately_and_on_dependency_change() {
    let store = Store::new(json!({"count": 1, "other": 5}));
    let seen: Rc<RefCell<Vec<Value>>> = Rc::new(RefCell::new(Vec::new()));

    let reaction = store.autorun({
        let seen = Rc::clone(&seen);
        move |view, _patches| {
            seen.borrow_mut()
                .push(view.get("count").unwrap_or(Value::Null));
        }
    });
    assert_eq!(*seen.borrow(), vec![json!(1)]);

    store.mutate(|s| s.set("count", 2)).unwrap();
    assert_eq!(*seen.borrow(), vec![json!(1), json!(2)]);

    // paths the reaction never read do not trigger it
    store.mutate(|s| s.set("other", 6)).unwrap();
    assert_eq!(seen.borrow().len(), 2);

    reaction.dispose();
    store.mutate(|s| s.set("count", 3)).unwrap();
    assert_eq!(seen.borrow().len(), 2);
}

#[test]
fn test_nested_reads_track_intermediate_paths() {
    let store = Store::new(json!({"user": {"profile": {"name": "ada"}}}));
    let runs = Rc::new(Cell::new(0));

    let _reaction = store.autorun({
        let runs = Rc::clone(&runs);
        move |view, _| {
            runs.set(runs.get() + 1);
            view.child("user").child("profile").get("name");
        }
    });
    assert_eq!(runs.get(), 1);

    // deep write hits the leaf dependency
    store
        .mutate(|s| s.child("user").child("profile").set("name", "grace"))
        .unwrap();
    assert_eq!(runs.get(), 2);

    // replacing an intermediate container also reruns
    store
        .mutate(|s| s.set("user", json!({"profile": {"name": "lin"}})))
        .unwrap();
    assert_eq!(runs.get(), 3);
}

#[test]
fn test_conditional_dependencies() {
    let store = Store::new(json!({"flag": true, "a": 1, "b": 2}));
    let runs = Rc::new(Cell::new(0));

    let _reaction = store.autorun({
        let runs = Rc::clone(&runs);
        move |view, _| {
            runs.set(runs.get() + 1);
            if view.get("flag") == Some(json!(true)) {
                view.get("a");
            } else {
                view.get("b");
            }
        }
    });
    assert_eq!(runs.get(), 1);

    // branch not taken is not a dependency
    store.mutate(|s| s.set("b", 20)).unwrap();
    assert_eq!(runs.get(), 1);

    store.mutate(|s| s.set("a", 10)).unwrap();
    assert_eq!(runs.get(), 2);

    // flip the branch: the dependency set swaps with it
    store.mutate(|s| s.set("flag", false)).unwrap();
    assert_eq!(runs.get(), 3);

    store.mutate(|s| s.set("a", 100)).unwrap();
    assert_eq!(runs.get(), 3);

    store.mutate(|s| s.set("b", 200)).unwrap();
    assert_eq!(runs.get(), 4);
}

#[test]
fn test_key_enumeration_tracks_any_key() {
    let store = Store::new(json!({"items": {"a": 1}}));
    let counts: Rc<RefCell<Vec<usize>>> = Rc::new(RefCell::new(Vec::new()));

    let _reaction = store.autorun({
        let counts = Rc::clone(&counts);
        move |view, _| {
            counts.borrow_mut().push(view.child("items").keys().len());
        }
    });
    assert_eq!(*counts.borrow(), vec![1]);

    // adding a key the reaction never read by name still reruns it
    store.mutate(|s| s.child("items").set("b", 2)).unwrap();
    assert_eq!(*counts.borrow(), vec![1, 2]);

    store.mutate(|s| s.child("items").delete("a")).unwrap();
    assert_eq!(*counts.borrow(), vec![1, 2, 1]);
}

#[test]
fn test_reaction_sees_commit_patches() {
    let store = Store::new(json!({"count": 0}));
    let patch_counts: Rc<RefCell<Vec<usize>>> = Rc::new(RefCell::new(Vec::new()));

    let _reaction = store.autorun({
        let patch_counts = Rc::clone(&patch_counts);
        move |view, patches| {
            view.get("count");
            patch_counts.borrow_mut().push(patches.len());
        }
    });
    // the initial run has no commit behind it
    assert_eq!(*patch_counts.borrow(), vec![0]);

    store.mutate(|s| s.set("count", 1)).unwrap();
    assert_eq!(*patch_counts.borrow(), vec![0, 1]);
}

#[test]
fn test_dispose_is_idempotent() {
    let store = Store::new(json!({"count": 0}));
    let runs = Rc::new(Cell::new(0));
    let reaction = store.autorun({
        let runs = Rc::clone(&runs);
        move |view, _| {
            runs.set(runs.get() + 1);
            view.get("count");
        }
    });

    reaction.dispose();
    reaction.dispose();
    store.mutate(|s| s.set("count", 1)).unwrap();
    assert_eq!(runs.get(), 1);
}

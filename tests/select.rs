//! Pattern subscriptions: literal paths, wildcards, ancestor opt-in,
//! dispatch guarantees.

use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use trellis_state::{SelectOptions, StateError, Store};

#[test]
fn test_select_fires_on_exact_change() {
    let store = Store::new(json!({"count": 1}));
    let selection = store
        .select(&["count"], |doc| doc["count"].clone())
        .unwrap();

    let seen: Rc<RefCell<Vec<Value>>> = Rc::new(RefCell::new(Vec::new()));
    {
        let seen = Rc::clone(&seen);
        selection.observe(move |v: &Value| seen.borrow_mut().push(v.clone()));
    }

    store.mutate(|s| s.set("count", 2)).unwrap();
    store.mutate(|s| s.set("count", 3)).unwrap();
    assert_eq!(*seen.borrow(), vec![json!(2), json!(3)]);

    // untouched paths do not fire
    store.mutate(|s| s.set("other", 1)).unwrap();
    assert_eq!(seen.borrow().len(), 2);
}

#[test]
fn test_select_receives_patches_via_mapping_doc() {
    let store = Store::new(json!({"user": {"name": "ada"}}));
    let selection = store
        .select(&["user/name"], |doc| {
            doc.pointer("/user/name").cloned().unwrap_or(Value::Null)
        })
        .unwrap();

    let seen: Rc<RefCell<Vec<Value>>> = Rc::new(RefCell::new(Vec::new()));
    {
        let seen = Rc::clone(&seen);
        selection.observe(move |v: &Value| seen.borrow_mut().push(v.clone()));
    }

    store
        .mutate(|s| s.child("user").set("name", "grace"))
        .unwrap();
    assert_eq!(*seen.borrow(), vec![json!("grace")]);
}

#[test]
fn test_wildcard_patterns() {
    let store = Store::new(json!({
        "nodes": {
            "id1": {
                "styles": {"marginTop": {"content": 1}},
                "attrs": {"src": "a.png"}
            }
        }
    }));
    let selection = store.select(&["nodes/*/styles/**"], |_| ()).unwrap();
    let fired = Rc::new(Cell::new(0));
    {
        let fired = Rc::clone(&fired);
        selection.observe(move |_: &()| fired.set(fired.get() + 1));
    }

    store
        .mutate(|s| {
            s.child("nodes")
                .child("id1")
                .child("styles")
                .child("marginTop")
                .set("content", 2)
        })
        .unwrap();
    assert_eq!(fired.get(), 1);

    store
        .mutate(|s| s.child("nodes").child("id1").child("attrs").set("src", "b.png"))
        .unwrap();
    assert_eq!(fired.get(), 1);
}

#[test]
fn test_single_level_wildcard_is_one_segment() {
    let store = Store::new(json!({"nodes": {"id1": {"title": "a", "deep": {"x": 1}}}}));
    let selection = store.select(&["nodes/*/title"], |_| ()).unwrap();
    let fired = Rc::new(Cell::new(0));
    {
        let fired = Rc::clone(&fired);
        selection.observe(move |_: &()| fired.set(fired.get() + 1));
    }

    store
        .mutate(|s| s.child("nodes").child("id1").set("title", "b"))
        .unwrap();
    assert_eq!(fired.get(), 1);

    // two levels below the wildcard does not match
    store
        .mutate(|s| s.child("nodes").child("id1").child("deep").set("x", 2))
        .unwrap();
    assert_eq!(fired.get(), 1);
}

#[test]
fn test_ancestor_opt_in() {
    let doc = json!({"nodes": {"2": {"styles": {"padding": 4}}}});

    // without the option, deleting an ancestor does not fire
    let store = Store::new(doc.clone());
    let silent = store.select(&["nodes/2/styles/padding"], |_| ()).unwrap();
    let silent_fired = Rc::new(Cell::new(0));
    {
        let fired = Rc::clone(&silent_fired);
        silent.observe(move |_: &()| fired.set(fired.get() + 1));
    }
    store.mutate(|s| s.child("nodes").delete("2")).unwrap();
    assert_eq!(silent_fired.get(), 0);

    // with it, the wholesale delete is delivered
    let store = Store::new(doc);
    let opted = store
        .select_with(
            &["nodes/2/styles/padding"],
            |_| (),
            SelectOptions {
                react_to_ancestor_changes: true,
            },
        )
        .unwrap();
    let opted_fired = Rc::new(Cell::new(0));
    {
        let fired = Rc::clone(&opted_fired);
        opted.observe(move |_: &()| fired.set(fired.get() + 1));
    }
    store.mutate(|s| s.child("nodes").delete("2")).unwrap();
    assert_eq!(opted_fired.get(), 1);
}

#[test]
fn test_subscriber_fires_once_per_commit() {
    let store = Store::new(json!({"a": 1, "b": 2}));
    let selection = store.select(&["a", "b"], |_| ()).unwrap();
    let fired = Rc::new(Cell::new(0));
    {
        let fired = Rc::clone(&fired);
        selection.observe(move |_: &()| fired.set(fired.get() + 1));
    }

    // both patterns touched in one commit, one dispatch
    store
        .mutate(|s| {
            s.set("a", 10)?;
            s.set("b", 20)
        })
        .unwrap();
    assert_eq!(fired.get(), 1);
}

#[test]
fn test_duplicate_pattern_is_an_error() {
    let store = Store::new(json!({"a": {"b": 1}}));
    let err = store.select(&["a/b", "a/b"], |_| ()).unwrap_err();
    assert!(matches!(err, StateError::DuplicateSubscription { .. }));
}

#[test]
fn test_invalid_patterns_rejected() {
    let store = Store::new(json!({}));
    assert!(matches!(
        store.select(&["a/**/b"], |_| ()).unwrap_err(),
        StateError::InvalidPattern { .. }
    ));
    assert!(matches!(
        store.select(&[""], |_| ()).unwrap_err(),
        StateError::InvalidPattern { .. }
    ));
    let empty: &[&str] = &[];
    assert!(store.select(empty, |_| ()).is_err());
}

#[test]
fn test_dispose_stops_delivery() {
    let store = Store::new(json!({"count": 0}));
    let selection = store.select(&["count"], |_| ()).unwrap();
    let fired = Rc::new(Cell::new(0));
    {
        let fired = Rc::clone(&fired);
        selection.observe(move |_: &()| fired.set(fired.get() + 1));
    }

    store.mutate(|s| s.set("count", 1)).unwrap();
    selection.dispose();
    store.mutate(|s| s.set("count", 2)).unwrap();
    assert_eq!(fired.get(), 1);

    // idempotent
    selection.dispose();
}

#[test]
fn test_dispose_during_dispatch_is_tolerated() {
    let store = Store::new(json!({"count": 0}));

    let first = store.select(&["count"], |_| ()).unwrap();
    let second = Rc::new(store.select(&["count"], |_| ()).unwrap());
    let second_fired = Rc::new(Cell::new(0));
    {
        let fired = Rc::clone(&second_fired);
        second.observe(move |_: &()| fired.set(fired.get() + 1));
    }
    {
        // first subscriber (registered earlier, dispatched earlier)
        // disposes the second mid-commit
        let second = Rc::clone(&second);
        first.observe(move |_: &()| second.dispose());
    }

    store.mutate(|s| s.set("count", 1)).unwrap();
    assert_eq!(second_fired.get(), 0);
}

#[test]
fn test_unobserve() {
    let store = Store::new(json!({"count": 0}));
    let selection = store.select(&["count"], |_| ()).unwrap();
    let fired = Rc::new(Cell::new(0));
    let token = {
        let fired = Rc::clone(&fired);
        selection.observe(move |_: &()| fired.set(fired.get() + 1))
    };

    store.mutate(|s| s.set("count", 1)).unwrap();
    selection.unobserve(token);
    store.mutate(|s| s.set("count", 2)).unwrap();
    assert_eq!(fired.get(), 1);
}

#[test]
fn test_subscriber_can_reenter_mutate() {
    let store = Store::new(json!({"count": 0, "mirror": 0}));
    let selection = store
        .select(&["count"], |doc| doc["count"].clone())
        .unwrap();
    {
        let store = store.clone();
        selection.observe(move |v: &Value| {
            let v = v.clone();
            store.mutate(|s| s.set("mirror", v.clone())).unwrap();
        });
    }

    store.mutate(|s| s.set("count", 7)).unwrap();
    assert_eq!(store.snapshot(), json!({"count": 7, "mirror": 7}));
}

//! Transaction orchestration, subscriptions, and reactions.
//!
//! A [`Store`] owns one root document, its selector tree, its registered
//! patch delegates, and at most one open transaction. All mutation flows
//! through [`Store::mutate`]; subscriptions are created with
//! [`Store::select`] and [`Store::autorun`]; previously produced patch
//! lists replay through [`Store::mutate_from_patches`].

use crate::apply::{apply_via_view, descend};
use crate::mutation::{MutationTree, NodeId};
use crate::selector::{SelId, SelectorTree, SubId, SubscriberFn};
use crate::view::{lookup, ReadView, Recorder, TreeView};
use crate::{Path, PatchOp, StateError, StateResult};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Selector pointers and mutation-tree node registered for one path in
/// the open transaction.
#[derive(Clone)]
pub(crate) struct ViewEntry {
    pub(crate) pointers: Vec<SelId>,
    pub(crate) node: NodeId,
}

/// Bookkeeping for one outermost `mutate` call.
pub(crate) struct Transaction {
    /// Pre-mutation document, restored if the callback errors.
    snapshot: Value,
    tree: MutationTree,
    order: u64,
    /// Selector nodes touched by writes; the flag marks an exact hit (the
    /// write landed on the node's own path) versus a subtree hit.
    touched: Vec<(SelId, bool)>,
    views: HashMap<Path, ViewEntry>,
}

pub(crate) struct StoreInner {
    pub(crate) doc: RefCell<Value>,
    pub(crate) selectors: RefCell<SelectorTree>,
    pub(crate) txn: RefCell<Option<Transaction>>,
    delegates: RefCell<Vec<(Path, Rc<dyn PatchDelegate>)>>,
}

impl StoreInner {
    /// Get or create the view entry for a path, descending selector
    /// pointers and mutation-tree nodes from the deepest registered
    /// prefix.
    pub(crate) fn ensure_entry(&self, path: &Path) -> StateResult<ViewEntry> {
        let mut txn_ref = self.txn.borrow_mut();
        let txn = txn_ref.as_mut().ok_or(StateError::TransactionClosed)?;
        let selectors = self.selectors.borrow();

        // deepest already-registered prefix (the root entry always exists)
        let mut depth = path.len();
        let mut prefix = path.clone();
        while !txn.views.contains_key(&prefix) {
            prefix.pop();
            depth -= 1;
        }
        let mut entry = txn.views[&prefix].clone();

        for seg in &path.segments()[depth..] {
            let node = txn.tree.child(entry.node, seg);
            let mut pointers = Vec::new();
            for &p in &entry.pointers {
                pointers.extend(selectors.descendants(p, seg));
            }
            entry = ViewEntry { pointers, node };
            prefix.push(seg.clone());
            txn.views.insert(prefix.clone(), entry.clone());
        }
        Ok(entry)
    }

    /// Record an elementary edit at `path` and mark the selector nodes it
    /// touches.
    pub(crate) fn write(
        &self,
        path: &Path,
        old: Option<Value>,
        new: Option<Value>,
    ) -> StateResult<()> {
        let entry = self.ensure_entry(path)?;
        let selectors = self.selectors.borrow();
        let mut txn_ref = self.txn.borrow_mut();
        let txn = txn_ref.as_mut().ok_or(StateError::TransactionClosed)?;
        mark_touched(txn, &selectors, &entry);
        let order = txn.order;
        txn.order += 1;
        txn.tree.record(entry.node, old, new, order)
    }

    /// Record an append at `path/-`, accumulating with any append already
    /// pending there.
    pub(crate) fn append(&self, array_path: &Path, items: Vec<Value>) -> StateResult<()> {
        let path = array_path.with_segment(crate::path::APPEND);
        let entry = self.ensure_entry(&path)?;
        let selectors = self.selectors.borrow();
        let mut txn_ref = self.txn.borrow_mut();
        let txn = txn_ref.as_mut().ok_or(StateError::TransactionClosed)?;
        mark_touched(txn, &selectors, &entry);
        let merged = match txn.tree.pending_new(entry.node) {
            Some(Value::Array(prev)) => {
                let mut all = prev.clone();
                all.extend(items);
                all
            }
            _ => items,
        };
        let order = txn.order;
        txn.order += 1;
        txn.tree.record(entry.node, None, Some(Value::Array(merged)), order)
    }
}

fn mark_touched(txn: &mut Transaction, selectors: &SelectorTree, entry: &ViewEntry) {
    for &p in &entry.pointers {
        txn.touched.push((p, true));
        for d in selectors.below(p) {
            txn.touched.push((d, false));
        }
    }
}

/// Options for [`Store::select_with`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SelectOptions {
    /// Also fire when a commit only touches an ancestor of the selected
    /// pattern (e.g. the watched subtree is replaced or deleted wholesale).
    pub react_to_ancestor_changes: bool,
}

/// Receives patch operations re-rooted to its registration path during
/// [`Store::mutate_from_patches`].
///
/// Domain objects that keep invariants over a subtree register one of
/// these; incoming operations under their path are handed to them instead
/// of being applied structurally.
pub trait PatchDelegate {
    fn apply_patch(&self, view: &TreeView, op: &PatchOp) -> StateResult<()>;
}

/// A reactive state container over one root document.
///
/// Cloning a `Store` yields another handle to the same document and
/// subscriptions. Independent stores never interact.
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

impl Store {
    pub fn new(initial: Value) -> Self {
        Self {
            inner: Rc::new(StoreInner {
                doc: RefCell::new(initial),
                selectors: RefCell::new(SelectorTree::new()),
                txn: RefCell::new(None),
                delegates: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Clone the current document.
    pub fn snapshot(&self) -> Value {
        self.inner.doc.borrow().clone()
    }

    /// Clone the value at a path, if it exists.
    pub fn get(&self, path: &Path) -> Option<Value> {
        let doc = self.inner.doc.borrow();
        lookup(&doc, path).cloned()
    }

    /// Consume the store and return the document.
    pub fn into_value(self) -> Value {
        match Rc::try_unwrap(self.inner) {
            Ok(inner) => inner.doc.into_inner(),
            Err(shared) => shared.doc.borrow().clone(),
        }
    }

    /// Run `f` against a writable view of the root and return the
    /// compiled patch list.
    ///
    /// The outermost call opens the transaction; nested calls on the same
    /// store attach to it and return an empty list, their effects folding
    /// into the outer commit. On callback error the document is restored
    /// to its pre-transaction state and the error propagates. Matched
    /// subscribers are each dispatched exactly once, with the
    /// post-mutation document and the patch list.
    pub fn mutate<F>(&self, f: F) -> StateResult<Vec<PatchOp>>
    where
        F: FnOnce(&TreeView) -> StateResult<()>,
    {
        let outermost = self.inner.txn.borrow().is_none();
        if outermost {
            let snapshot = self.inner.doc.borrow().clone();
            let tree = MutationTree::new();
            let mut views = HashMap::new();
            views.insert(
                Path::root(),
                ViewEntry {
                    pointers: vec![self.inner.selectors.borrow().root()],
                    node: tree.root(),
                },
            );
            *self.inner.txn.borrow_mut() = Some(Transaction {
                snapshot,
                tree,
                order: 0,
                touched: Vec::new(),
                views,
            });
        }

        let view = TreeView::root(Rc::clone(&self.inner));
        let result = f(&view);

        if !outermost {
            return result.map(|()| Vec::new());
        }

        let txn = self.inner.txn.borrow_mut().take();
        let Some(txn) = txn else {
            return result.map(|()| Vec::new());
        };

        if let Err(e) = result {
            tracing::debug!(error = %e, "transaction rolled back");
            *self.inner.doc.borrow_mut() = txn.snapshot;
            return Err(e);
        }

        let patches = txn.tree.compile();
        tracing::debug!(
            patches = patches.len(),
            touched = txn.touched.len(),
            "transaction committed"
        );
        if patches.is_empty() {
            return Ok(patches);
        }

        let fired = self.inner.selectors.borrow().collect_dispatch(&txn.touched);
        if !fired.is_empty() {
            // Dispatch against a snapshot so subscribers can re-enter
            // `mutate` on this store.
            let doc = self.inner.doc.borrow().clone();
            for (id, callback) in fired {
                let alive = self.inner.selectors.borrow().is_alive(id);
                if alive {
                    callback(&doc, &patches);
                }
            }
        }
        Ok(patches)
    }

    /// Subscribe `mapping` to a set of path patterns.
    ///
    /// Patterns are `/`-delimited; `*` matches exactly one segment, `**`
    /// matches the remainder of the path (final segment only). On every
    /// commit touching a matched path, `mapping` runs against the
    /// post-mutation document and its result is handed to the selection's
    /// observers.
    pub fn select<T, F>(&self, patterns: &[&str], mapping: F) -> StateResult<Selection<T>>
    where
        T: 'static,
        F: Fn(&Value) -> T + 'static,
    {
        self.select_with(patterns, mapping, SelectOptions::default())
    }

    pub fn select_with<T, F>(
        &self,
        patterns: &[&str],
        mapping: F,
        options: SelectOptions,
    ) -> StateResult<Selection<T>>
    where
        T: 'static,
        F: Fn(&Value) -> T + 'static,
    {
        if patterns.is_empty() {
            return Err(StateError::invalid_pattern("", "at least one pattern is required"));
        }
        let observers: ObserverList<T> = Rc::new(RefCell::new(Vec::new()));
        let callback: SubscriberFn = {
            let observers = Rc::clone(&observers);
            Rc::new(move |doc, _patches| {
                let value = mapping(doc);
                let snapshot: Vec<Rc<dyn Fn(&T)>> = observers
                    .borrow()
                    .iter()
                    .map(|(_, f)| Rc::clone(f))
                    .collect();
                for f in snapshot {
                    f(&value);
                }
            })
        };

        let mut selectors = self.inner.selectors.borrow_mut();
        let sub = selectors.alloc_sub_id();
        let mut leaves = Vec::new();
        for pattern in patterns {
            let path = Path::parse(pattern);
            if path.is_empty() {
                for &leaf in &leaves {
                    selectors.remove_sub(leaf, sub);
                }
                return Err(StateError::invalid_pattern(*pattern, "empty pattern"));
            }
            if let Err(e) = SelectorTree::validate_pattern(pattern, path.segments()) {
                for &leaf in &leaves {
                    selectors.remove_sub(leaf, sub);
                }
                return Err(e);
            }
            let leaf = selectors.leaf_for(path.segments());
            if let Err(e) = selectors.add_sub(
                leaf,
                pattern,
                sub,
                Rc::clone(&callback),
                options.react_to_ancestor_changes,
            ) {
                for &leaf in &leaves {
                    selectors.remove_sub(leaf, sub);
                }
                return Err(e);
            }
            leaves.push(leaf);
        }

        Ok(Selection {
            store: Rc::clone(&self.inner),
            sub,
            leaves,
            observers,
            next_observer: Cell::new(0),
            disposed: Cell::new(false),
        })
    }

    /// Run `f` now and again whenever a commit touches any path it read
    /// on its previous run.
    ///
    /// Dependencies are rebuilt from scratch on every run, so branches not
    /// taken are not subscribed. Lives until [`Reaction::dispose`].
    pub fn autorun<F>(&self, f: F) -> Reaction
    where
        F: Fn(&ReadView<'_>, &[PatchOp]) + 'static,
    {
        let sub = self.inner.selectors.borrow_mut().alloc_sub_id();
        let state = Rc::new(ReactionState {
            store: Rc::clone(&self.inner),
            sub,
            leaves: RefCell::new(Vec::new()),
            runner: RefCell::new(None),
            f: Box::new(f),
            disposed: Cell::new(false),
        });
        let runner: SubscriberFn = {
            let state = Rc::clone(&state);
            Rc::new(move |doc, patches| state.run(doc, patches))
        };
        *state.runner.borrow_mut() = Some(Rc::clone(&runner));

        let doc = self.inner.doc.borrow().clone();
        state.run(&doc, &[]);
        Reaction { state }
    }

    /// Route incoming operations for paths under `path` to `delegate`
    /// during patch replay.
    pub fn register_delegate(&self, path: Path, delegate: Rc<dyn PatchDelegate>) {
        self.inner.delegates.borrow_mut().push((path, delegate));
    }

    pub fn unregister_delegate(&self, path: &Path) {
        self.inner.delegates.borrow_mut().retain(|(p, _)| p != path);
    }

    /// Replay a previously produced patch list inside a fresh `mutate`.
    ///
    /// Each operation goes to the deepest registered delegate whose path
    /// is a strict prefix of the operation's, re-rooted relative to that
    /// delegate; operations with no delegate are applied structurally. A
    /// missing intermediate path segment is a fatal [`StateError::PathWalk`].
    pub fn mutate_from_patches(&self, patches: &[PatchOp]) -> StateResult<Vec<PatchOp>> {
        let inner = Rc::clone(&self.inner);
        let ops: Vec<PatchOp> = patches.to_vec();
        self.mutate(move |view| {
            for op in &ops {
                let delegate = {
                    let delegates = inner.delegates.borrow();
                    delegates
                        .iter()
                        .filter(|(base, _)| {
                            base.len() < op.path_array.len() && base.is_prefix_of(&op.path_array)
                        })
                        .max_by_key(|(base, _)| base.len())
                        .map(|(base, d)| (base.clone(), Rc::clone(d)))
                };
                match delegate {
                    Some((base, delegate)) => {
                        let sub = op.rebase(&base).ok_or_else(|| {
                            StateError::path_walk(op.path_array.clone(), base.to_string())
                        })?;
                        let target = descend(view, &base)?;
                        delegate.apply_patch(&target, &sub)?;
                    }
                    None => apply_via_view(view, op)?,
                }
            }
            Ok(())
        })
    }
}

type ObserverList<T> = Rc<RefCell<Vec<(u64, Rc<dyn Fn(&T)>)>>>;

/// A live subscription created by [`Store::select`].
///
/// Holds no notification machinery of its own until observers attach.
/// Must be disposed explicitly; dropping it does not unsubscribe.
pub struct Selection<T> {
    store: Rc<StoreInner>,
    sub: SubId,
    leaves: Vec<SelId>,
    observers: ObserverList<T>,
    next_observer: Cell<u64>,
    disposed: Cell<bool>,
}

impl<T> Selection<T> {
    /// Attach an observer; returns a token for [`Selection::unobserve`].
    pub fn observe(&self, f: impl Fn(&T) + 'static) -> u64 {
        let id = self.next_observer.get();
        self.next_observer.set(id + 1);
        self.observers.borrow_mut().push((id, Rc::new(f)));
        id
    }

    pub fn unobserve(&self, id: u64) {
        self.observers.borrow_mut().retain(|(oid, _)| *oid != id);
    }

    /// Unsubscribe from the store. Safe to call during dispatch of the
    /// same commit; remaining callbacks in that commit skip this
    /// subscription. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        let mut selectors = self.store.selectors.borrow_mut();
        selectors.retire(self.sub);
        for &leaf in &self.leaves {
            selectors.remove_sub(leaf, self.sub);
        }
        self.observers.borrow_mut().clear();
    }
}

impl<T> fmt::Debug for Selection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selection")
            .field("sub", &self.sub)
            .field("leaves", &self.leaves)
            .field("observers", &self.observers.borrow().len())
            .field("disposed", &self.disposed.get())
            .finish()
    }
}

struct ReactionState {
    store: Rc<StoreInner>,
    sub: SubId,
    leaves: RefCell<Vec<SelId>>,
    /// Self-reference used to re-register after every run; cleared on
    /// dispose to break the cycle.
    runner: RefCell<Option<SubscriberFn>>,
    f: Box<dyn Fn(&ReadView<'_>, &[PatchOp])>,
    disposed: Cell<bool>,
}

impl ReactionState {
    fn run(&self, doc: &Value, patches: &[PatchOp]) {
        if self.disposed.get() {
            return;
        }
        {
            let mut selectors = self.store.selectors.borrow_mut();
            for leaf in self.leaves.borrow_mut().drain(..) {
                selectors.remove_sub(leaf, self.sub);
            }
        }

        let recorder = Recorder::new();
        (self.f)(&ReadView::new(doc, &recorder), patches);

        let runner = self.runner.borrow().clone();
        let Some(runner) = runner else { return };
        let mut selectors = self.store.selectors.borrow_mut();
        let mut leaves = self.leaves.borrow_mut();
        for path in recorder.take_paths() {
            let leaf = selectors.leaf_for(path.segments());
            // the recorder deduplicates, so a collision here means two
            // reads mapped to one leaf; one registration suffices
            if selectors
                .add_sub(leaf, &path.to_string(), self.sub, Rc::clone(&runner), false)
                .is_ok()
            {
                leaves.push(leaf);
            }
        }
        tracing::trace!(deps = leaves.len(), "reaction dependencies rebuilt");
    }
}

/// Handle to a running [`Store::autorun`] reaction.
pub struct Reaction {
    state: Rc<ReactionState>,
}

impl Reaction {
    /// Stop the reaction and drop its registrations. Idempotent.
    pub fn dispose(&self) {
        if self.state.disposed.replace(true) {
            return;
        }
        let mut selectors = self.state.store.selectors.borrow_mut();
        selectors.retire(self.state.sub);
        for leaf in self.state.leaves.borrow_mut().drain(..) {
            selectors.remove_sub(leaf, self.state.sub);
        }
        self.state.runner.borrow_mut().take();
    }
}

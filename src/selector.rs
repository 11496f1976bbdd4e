//! Selector tree: path patterns mapped to subscriber sets.
//!
//! Patterns are `/`-delimited paths whose segments are literals, `*`
//! (exactly one segment) or `**` (any remaining segments, final position
//! only). Subscribers hang off the leaf node of their pattern. During a
//! transaction the active selector frontier is advanced key by key in
//! lockstep with view traversal, so touched leaves are known at commit
//! without any path matching pass.

use crate::{PatchOp, StateError, StateResult};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

pub(crate) type SelId = usize;

/// Identity of one registered subscriber callback.
pub(crate) type SubId = u64;

/// Subscriber callback: receives the post-commit document and the patches
/// of the commit that touched it.
pub(crate) type SubscriberFn = Rc<dyn Fn(&Value, &[PatchOp])>;

const ROOT: SelId = 0;

/// Matches exactly one path segment.
pub(crate) const WILDCARD: &str = "*";

/// Matches all remaining path segments; valid only as the final segment.
pub(crate) const GLOB: &str = "**";

struct SubEntry {
    id: SubId,
    callback: SubscriberFn,
    /// When set, the subscriber also fires for commits that only touch
    /// paths deeper than its own leaf.
    react_to_ancestor: bool,
}

struct SelectorNode {
    segment: String,
    children: HashMap<String, SelId>,
    subs: Vec<SubEntry>,
}

/// The selector tree for one store.
pub(crate) struct SelectorTree {
    nodes: Vec<SelectorNode>,
    next_sub: SubId,
    /// Subscribers disposed mid-dispatch; checked before each callback.
    retired: HashSet<SubId>,
}

impl SelectorTree {
    pub(crate) fn new() -> Self {
        Self {
            nodes: vec![SelectorNode {
                segment: String::new(),
                children: HashMap::new(),
                subs: Vec::new(),
            }],
            next_sub: 0,
            retired: HashSet::new(),
        }
    }

    pub(crate) fn root(&self) -> SelId {
        ROOT
    }

    pub(crate) fn alloc_sub_id(&mut self) -> SubId {
        let id = self.next_sub;
        self.next_sub += 1;
        id
    }

    /// Validate a parsed pattern's segments.
    pub(crate) fn validate_pattern(pattern: &str, segments: &[String]) -> StateResult<()> {
        for (i, seg) in segments.iter().enumerate() {
            if seg == GLOB && i + 1 != segments.len() {
                return Err(StateError::invalid_pattern(
                    pattern,
                    "'**' is only allowed as the final segment",
                ));
            }
        }
        Ok(())
    }

    /// Get or create the leaf node for a pattern's segments.
    pub(crate) fn leaf_for(&mut self, segments: &[String]) -> SelId {
        let mut node = ROOT;
        for seg in segments {
            node = self.child_or_insert(node, seg);
        }
        node
    }

    fn child_or_insert(&mut self, node: SelId, seg: &str) -> SelId {
        if let Some(&id) = self.nodes[node].children.get(seg) {
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(SelectorNode {
            segment: seg.to_owned(),
            children: HashMap::new(),
            subs: Vec::new(),
        });
        self.nodes[node].children.insert(seg.to_owned(), id);
        id
    }

    /// Attach a subscriber to a leaf.
    ///
    /// Each subscriber may appear at most once per leaf; a second landing
    /// (a duplicate pattern within one selection) is an error.
    pub(crate) fn add_sub(
        &mut self,
        leaf: SelId,
        pattern: &str,
        id: SubId,
        callback: SubscriberFn,
        react_to_ancestor: bool,
    ) -> StateResult<()> {
        if self.nodes[leaf].subs.iter().any(|s| s.id == id) {
            return Err(StateError::duplicate_subscription(pattern));
        }
        self.nodes[leaf].subs.push(SubEntry {
            id,
            callback,
            react_to_ancestor,
        });
        Ok(())
    }

    /// Detach a subscriber from a leaf.
    pub(crate) fn remove_sub(&mut self, leaf: SelId, id: SubId) {
        self.nodes[leaf].subs.retain(|s| s.id != id);
    }

    /// Mark a subscriber dead so in-flight dispatch skips it.
    pub(crate) fn retire(&mut self, id: SubId) {
        self.retired.insert(id);
    }

    pub(crate) fn is_alive(&self, id: SubId) -> bool {
        !self.retired.contains(&id)
    }

    /// Advance the selector frontier from `node` by one concrete key.
    ///
    /// Yields the literal child, the `*` child and the `**` child when
    /// present, plus `node` itself when its own segment is `**` (a glob
    /// leaf stays active for every deeper key).
    pub(crate) fn descendants(&self, node: SelId, key: &str) -> Vec<SelId> {
        let mut out = Vec::new();
        let children = &self.nodes[node].children;
        if let Some(&id) = children.get(key) {
            out.push(id);
        }
        if key != WILDCARD {
            if let Some(&id) = children.get(WILDCARD) {
                out.push(id);
            }
        }
        if let Some(&id) = children.get(GLOB) {
            out.push(id);
        }
        if self.nodes[node].segment == GLOB {
            out.push(node);
        }
        out
    }

    /// Every trie node strictly below `node`.
    ///
    /// A write that lands on `node`'s path also affects everything its
    /// subtree watches; those subscribers are offered the commit as an
    /// ancestor change.
    pub(crate) fn below(&self, node: SelId) -> Vec<SelId> {
        let mut out = Vec::new();
        self.collect_below(node, &mut out);
        out
    }

    fn collect_below(&self, node: SelId, out: &mut Vec<SelId>) {
        for &child in self.nodes[node].children.values() {
            out.push(child);
            self.collect_below(child, out);
        }
    }

    /// Collect the callbacks owed a dispatch for a commit.
    ///
    /// `touched` pairs each touched node with whether it was reached
    /// exactly (the written path landed on the node's pattern) or as a
    /// still-deeper descendant. Exact hits fire unconditionally; descendant
    /// hits fire only for subscribers that opted into ancestor changes.
    /// Each subscriber fires at most once per commit.
    pub(crate) fn collect_dispatch(
        &self,
        touched: &[(SelId, bool)],
    ) -> Vec<(SubId, SubscriberFn)> {
        let mut seen: HashSet<SubId> = HashSet::new();
        let mut out = Vec::new();
        for &(node, exact) in touched {
            for sub in &self.nodes[node].subs {
                if !exact && !sub.react_to_ancestor {
                    continue;
                }
                if seen.insert(sub.id) {
                    out.push((sub.id, Rc::clone(&sub.callback)));
                }
            }
        }
        out
    }

    #[cfg(test)]
    pub(crate) fn count_subs(&self) -> usize {
        self.nodes.iter().map(|n| n.subs.len()).sum()
    }
}

#![forbid(unsafe_code)]

//! Node storage and traversal for the chain tree.
//!
//! Nodes live in a flat map keyed by [`NodeId`]. Ids are allocated from a
//! monotonic counter and never reused, so a change notification queued for a
//! node that has since been pruned resolves to nothing instead of to an
//! unrelated node.
//!
//! # Invariants
//!
//! 1. [`ROOT`] always exists and has no parent.
//! 2. Every non-root node is listed in exactly one parent's `children`, under
//!    its own `segment`.
//! 3. Removing a node removes its whole subtree.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use chainwatch_core::{ChainError, ChainPath, Result, Subscription, Value};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

pub(crate) type NodeId = u64;

pub(crate) const ROOT: NodeId = 0;

/// Root-inclusive list of nodes along a path.
pub(crate) type Trace = SmallVec<[NodeId; 8]>;

/// One path segment of the observation tree.
pub(crate) struct ChainNode {
    /// Property name this node reads from its parent. Empty at the root.
    pub(crate) segment: String,
    pub(crate) parent: Option<NodeId>,
    /// Value currently read through this node. Not owned by the tree.
    pub(crate) bound: Value,
    pub(crate) children: BTreeMap<String, NodeId>,
    /// Non-empty suffixes, relative to this node, that a live status needs.
    pub(crate) watched: BTreeSet<ChainPath>,
    /// Some live status ends exactly here.
    pub(crate) terminal: bool,
    /// Change subscription on `bound`.
    pub(crate) subscription: Option<Subscription>,
}

impl ChainNode {
    fn new(segment: String, parent: Option<NodeId>, bound: Value) -> Self {
        Self {
            segment,
            parent,
            bound,
            children: BTreeMap::new(),
            watched: BTreeSet::new(),
            terminal: false,
            subscription: None,
        }
    }
}

pub(crate) struct NodeArena {
    nodes: FxHashMap<NodeId, ChainNode>,
    next_id: NodeId,
}

impl NodeArena {
    pub(crate) fn new(root_target: Value) -> Self {
        let mut nodes = FxHashMap::default();
        nodes.insert(ROOT, ChainNode::new(String::new(), None, root_target));
        Self {
            nodes,
            next_id: ROOT + 1,
        }
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&ChainNode> {
        self.nodes.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut ChainNode> {
        self.nodes.get_mut(&id)
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn root_target(&self) -> Value {
        self.get(ROOT).map(|n| n.bound.clone()).unwrap_or_default()
    }

    pub(crate) fn child(&self, id: NodeId, segment: &str) -> Option<NodeId> {
        self.get(id)?.children.get(segment).copied()
    }

    /// Child of `id` keyed `segment`, created unbound when absent. The flag is
    /// true when the child was created by this call.
    pub(crate) fn ensure_child(&mut self, id: NodeId, segment: &str) -> Option<(NodeId, bool)> {
        if let Some(existing) = self.child(id, segment) {
            return Some((existing, false));
        }
        let child = self.next_id;
        let parent = self.nodes.get_mut(&id)?;
        parent.children.insert(segment.to_string(), child);
        self.next_id += 1;
        self.nodes.insert(
            child,
            ChainNode::new(segment.to_string(), Some(id), Value::Null),
        );
        Some((child, true))
    }

    /// `id` followed by each ancestor up to and including the root.
    pub(crate) fn upstream(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.contains(id).then_some(id), |&cur| {
            self.get(cur).and_then(|n| n.parent)
        })
    }

    /// Segments from the root down to `id` (root excluded).
    pub(crate) fn path_of(&self, id: NodeId) -> ChainPath {
        let mut segments: Vec<&str> = self
            .upstream(id)
            .filter(|&n| n != ROOT)
            .filter_map(|n| self.get(n).map(|node| node.segment.as_str()))
            .collect();
        segments.reverse();
        ChainPath::from_segments(segments)
    }

    /// Nodes in the subtree of `id` in pre-order.
    pub(crate) fn pre_order(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            let Some(node) = self.get(cur) else { continue };
            out.push(cur);
            stack.extend(node.children.values().rev().copied());
        }
        out
    }

    /// Nodes in the subtree of `id` that have no children.
    pub(crate) fn leaves(&self, id: NodeId) -> Vec<NodeId> {
        self.pre_order(id)
            .into_iter()
            .filter(|&n| self.get(n).is_some_and(|node| node.children.is_empty()))
            .collect()
    }

    /// Nodes from the root along `path`, stopping at the first missing one.
    pub(crate) fn trace(&self, path: &ChainPath) -> Trace {
        let mut trace = Trace::new();
        trace.push(ROOT);
        let mut cur = ROOT;
        for segment in path.iter() {
            match self.child(cur, segment) {
                Some(next) => {
                    trace.push(next);
                    cur = next;
                }
                None => break,
            }
        }
        trace
    }

    /// The node addressed by `path`, if every segment is materialized.
    pub(crate) fn descend(&self, path: &ChainPath) -> Option<NodeId> {
        let trace = self.trace(path);
        (trace.len() == path.len() + 1).then(|| trace[trace.len() - 1])
    }

    /// Bound value of the node addressed by `path`.
    pub(crate) fn resolve(&self, path: &ChainPath) -> Result<Value> {
        self.descend(path)
            .and_then(|id| self.get(id))
            .map(|node| node.bound.clone())
            .ok_or_else(|| ChainError::UnresolvedChain { path: path.clone() })
    }

    /// Detach `id` from its parent and drop it with its whole subtree,
    /// releasing every subscription held there. Returns how many nodes were
    /// removed. The root is never removed.
    pub(crate) fn remove_subtree(&mut self, id: NodeId) -> usize {
        if id == ROOT {
            return 0;
        }
        let Some(node) = self.get(id) else { return 0 };
        let parent = node.parent;
        let segment = node.segment.clone();
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.remove(&segment);
        }
        let doomed = self.pre_order(id);
        for n in &doomed {
            self.nodes.remove(n);
        }
        doomed.len()
    }

    /// Indented dump of the tree, one node per line.
    pub(crate) fn render(&self) -> String {
        let mut out = String::new();
        for id in self.pre_order(ROOT) {
            let Some(node) = self.get(id) else { continue };
            let depth = self.upstream(id).count() - 1;
            let name = if id == ROOT { "<root>" } else { node.segment.as_str() };
            let _ = write!(
                out,
                "{:indent$}{name} = {:?}",
                "",
                node.bound,
                indent = depth * 2
            );
            if node.subscription.is_some() {
                out.push_str(" [listening]");
            }
            if node.terminal {
                out.push_str(" [terminal]");
            }
            out.push('\n');
        }
        out
    }
}

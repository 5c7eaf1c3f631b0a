//! Graph Nodes
//!
//! This module defines the vertex type of the dependency graph. Every
//! signal, computed value, and effect owns exactly one node; the generic
//! graph machinery operates only on node ids, kinds, and edge sets.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// The kind of node in the dependency graph.
///
/// The kind is fixed at creation and never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A leaf state cell. Signals are the roots of the graph: they have
    /// no dependencies, only subscribers.
    Signal,

    /// A memoized derivation. Computed nodes have dependencies and may
    /// have subscribers of their own.
    Computed,

    /// An effect. Effects are the leaves of the graph: they have
    /// dependencies but no subscribers (they produce side effects, not
    /// values).
    Effect,
}

/// A node in the dependency graph.
///
/// Edges are stored in both directions: `deps` are the nodes this node
/// reads from, `subs` are the nodes that read from this one. The two
/// sets are kept in lockstep by [`link`](super::link) and
/// [`unlink`](super::unlink); nothing else mutates them.
#[derive(Debug)]
pub struct Node {
    /// Unique identifier for this node.
    id: NodeId,

    /// What kind of node this is.
    kind: NodeKind,

    /// Nodes that this node depends on. Always empty for signals.
    deps: HashSet<NodeId>,

    /// Nodes that depend on this node. Always empty for effects.
    subs: HashSet<NodeId>,
}

impl Node {
    /// Create a new node with the given kind.
    pub fn new(kind: NodeKind) -> Self {
        Self {
            id: NodeId::new(),
            kind,
            deps: HashSet::new(),
            subs: HashSet::new(),
        }
    }

    /// Get the node's ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the node's kind.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Add a dependency (a node that this node reads from).
    pub(crate) fn add_dep(&mut self, node_id: NodeId) {
        self.deps.insert(node_id);
    }

    /// Remove a dependency.
    pub(crate) fn remove_dep(&mut self, node_id: NodeId) {
        self.deps.remove(&node_id);
    }

    /// Get all dependencies.
    pub fn deps(&self) -> &HashSet<NodeId> {
        &self.deps
    }

    /// Add a subscriber (a node that reads from this node).
    pub(crate) fn add_sub(&mut self, node_id: NodeId) {
        self.subs.insert(node_id);
    }

    /// Remove a subscriber.
    pub(crate) fn remove_sub(&mut self, node_id: NodeId) {
        self.subs.remove(&node_id);
    }

    /// Get all subscribers.
    pub fn subs(&self) -> &HashSet<NodeId> {
        &self.subs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_unique() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn new_node_has_no_edges() {
        let node = Node::new(NodeKind::Signal);
        assert_eq!(node.kind(), NodeKind::Signal);
        assert!(node.deps().is_empty());
        assert!(node.subs().is_empty());
    }

    #[test]
    fn edge_set_management() {
        let mut node = Node::new(NodeKind::Computed);
        let dep1 = NodeId::new();
        let dep2 = NodeId::new();

        node.add_dep(dep1);
        node.add_dep(dep2);
        node.add_dep(dep1); // sets are idempotent

        assert!(node.deps().contains(&dep1));
        assert!(node.deps().contains(&dep2));
        assert_eq!(node.deps().len(), 2);

        node.remove_dep(dep1);
        assert!(!node.deps().contains(&dep1));
        assert_eq!(node.deps().len(), 1);
    }
}

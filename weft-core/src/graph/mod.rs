//! Dependency Graph
//!
//! This module implements the dependency graph that tracks relationships
//! between reactive values and computations.
//!
//! # Overview
//!
//! The graph is a directed structure where:
//!
//! - Nodes represent signals, computed values, or effects
//! - An edge records that one node reads another: the reader lists the
//!   source in its `deps`, and the source lists the reader in its `subs`
//!
//! All edge mutation goes through [`link`] and [`unlink`], which keep the
//! two edge sets in lockstep. Concentrating mutation there makes the
//! deps/subs mirror property locally checkable, and lets [`link`] enforce
//! that a signal never acquires dependencies.
//!
//! # Design Decisions
//!
//! 1. We use a centralized node table rather than reference-counted
//!    cross-links between values, because signals, computed values, and
//!    effects form reference cycles that `Arc` cannot collect. Handles
//!    hold a `NodeId` plus their own typed state; the table owns only
//!    ids, kinds, and edge sets.
//!
//! 2. The table is indexed by node ID for O(1) lookups.
//!
//! 3. Accessors return snapshots, never guards. No graph lock is ever
//!    held while user code runs.

mod node;

pub use node::{Node, NodeId, NodeKind};

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use crate::error::ReactiveError;
use crate::hooks;

// Global node table. Maps node IDs to their kind and edge sets.
static GRAPH: OnceLock<RwLock<HashMap<NodeId, Node>>> = OnceLock::new();

fn graph() -> &'static RwLock<HashMap<NodeId, Node>> {
    GRAPH.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Create a node of the given kind and register it in the graph.
pub fn insert(kind: NodeKind) -> NodeId {
    let node = Node::new(kind);
    let id = node.id();
    graph().write().expect("graph lock poisoned").insert(id, node);
    hooks::register_node(id, kind);
    id
}

/// Remove a node, severing all incident edges in both directions.
///
/// No-op if the node is already gone.
pub fn remove(id: NodeId) {
    let removed = {
        let mut nodes = graph().write().expect("graph lock poisoned");
        match nodes.remove(&id) {
            Some(node) => {
                for dep in node.deps() {
                    if let Some(dep_node) = nodes.get_mut(dep) {
                        dep_node.remove_sub(id);
                    }
                }
                for sub in node.subs() {
                    if let Some(sub_node) = nodes.get_mut(sub) {
                        sub_node.remove_dep(id);
                    }
                }
                true
            }
            None => false,
        }
    };
    if removed {
        hooks::unregister_node(id);
    }
}

/// Insert the bidirectional edge `from` reads `to`.
///
/// Fails with [`ReactiveError::IllegalEdge`] when `from` is a signal:
/// signals are leaf state and never depend on anything. Idempotent, and
/// a silent no-op when either endpoint has been removed (a disposed node
/// may still run once more before its owner notices).
pub fn link(from: NodeId, to: NodeId) -> Result<(), ReactiveError> {
    let mut nodes = graph().write().expect("graph lock poisoned");
    let Some(from_node) = nodes.get(&from) else {
        return Ok(());
    };
    if from_node.kind() == NodeKind::Signal {
        return Err(ReactiveError::IllegalEdge { from, to });
    }
    if !nodes.contains_key(&to) {
        return Ok(());
    }
    nodes
        .get_mut(&from)
        .expect("node checked above")
        .add_dep(to);
    nodes.get_mut(&to).expect("node checked above").add_sub(from);
    Ok(())
}

/// Remove the bidirectional edge `from` reads `to`, if present.
pub fn unlink(from: NodeId, to: NodeId) {
    let mut nodes = graph().write().expect("graph lock poisoned");
    if let Some(from_node) = nodes.get_mut(&from) {
        from_node.remove_dep(to);
    }
    if let Some(to_node) = nodes.get_mut(&to) {
        to_node.remove_sub(from);
    }
}

/// Snapshot of the nodes `id` depends on.
pub fn deps_of(id: NodeId) -> Vec<NodeId> {
    graph()
        .read()
        .expect("graph lock poisoned")
        .get(&id)
        .map(|node| node.deps().iter().copied().collect())
        .unwrap_or_default()
}

/// Snapshot of the nodes that depend on `id`.
pub fn subs_of(id: NodeId) -> Vec<NodeId> {
    graph()
        .read()
        .expect("graph lock poisoned")
        .get(&id)
        .map(|node| node.subs().iter().copied().collect())
        .unwrap_or_default()
}

/// The kind of a node, or `None` if it has been removed.
pub fn kind_of(id: NodeId) -> Option<NodeKind> {
    graph()
        .read()
        .expect("graph lock poisoned")
        .get(&id)
        .map(Node::kind)
}

/// Number of live nodes in the graph.
pub fn node_count() -> usize {
    graph().read().expect("graph lock poisoned").len()
}

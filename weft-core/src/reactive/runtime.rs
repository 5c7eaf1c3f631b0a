//! Reactive Runtime
//!
//! The runtime connects the dependency graph to the live computed and
//! effect instances. It owns the registry that maps node ids back to the
//! objects holding kind-specific state, and it implements staleness
//! propagation when a value changes.
//!
//! # How It Works
//!
//! 1. When a computed or effect is created, it registers here under its
//!    node id.
//!
//! 2. When a signal's value changes, [`notify_changed`] walks the node's
//!    subscribers:
//!    a. Effects are handed to the scheduler (coalesced, run on flush).
//!    b. Computed values are marked stale; if that transition happened,
//!       the walk recurses so the whole downstream cone is invalidated.
//!    c. A computed that was already stale stops the recursion, which
//!       makes propagation idempotent.
//!
//! 3. Computed values are lazy: marking stale does no work until the
//!    next read pulls a recompute.
//!
//! # Thread Safety
//!
//! The registry is global and lock-protected so reactive values can be
//! shared across threads, while scheduling itself stays thread-local.
//! Entries are weak: the registry never keeps a computed or effect
//! alive, and dead entries are pruned when next looked up.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock, Weak};

use crate::graph::{self, NodeId};

use super::scheduler;

/// A live computed or effect reachable from the dependency graph.
pub(crate) trait Reactive: Send + Sync {
    /// The graph node this instance owns.
    fn node_id(&self) -> NodeId;

    /// Whether a change should schedule this instance (effects) or
    /// merely invalidate it (computed values).
    fn is_eager(&self) -> bool;

    /// Mark the cached value stale. Returns true only on a clean to
    /// stale transition, which is what gates recursive propagation.
    fn mark_stale(&self) -> bool;

    /// Whether this instance has been disposed.
    fn is_disposed(&self) -> bool;

    /// Re-run the computation. Only meaningful for eager instances;
    /// the scheduler calls this when flushing.
    fn run(&self);
}

static REGISTRY: OnceLock<RwLock<HashMap<NodeId, Weak<dyn Reactive>>>> = OnceLock::new();

fn registry() -> &'static RwLock<HashMap<NodeId, Weak<dyn Reactive>>> {
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Register a reactive instance under its node id.
pub(crate) fn register(reactive: Arc<dyn Reactive>) {
    registry()
        .write()
        .expect("registry lock poisoned")
        .insert(reactive.node_id(), Arc::downgrade(&reactive));
}

/// Remove a reactive instance from the registry.
pub(crate) fn unregister(id: NodeId) {
    registry()
        .write()
        .expect("registry lock poisoned")
        .remove(&id);
}

/// Look up a live instance. Dead weak entries are pruned here rather
/// than retained until dispose.
pub(crate) fn get(id: NodeId) -> Option<Arc<dyn Reactive>> {
    let weak = registry()
        .read()
        .expect("registry lock poisoned")
        .get(&id)
        .cloned()?;

    match weak.upgrade() {
        Some(reactive) => Some(reactive),
        None => {
            tracing::debug!(node = ?id, "pruning dead registry entry");
            registry()
                .write()
                .expect("registry lock poisoned")
                .remove(&id);
            None
        }
    }
}

/// Propagate a change at `origin` to everything downstream.
///
/// Effects are scheduled (the scheduler dedups and defers them);
/// computed values are marked stale and, on a fresh transition, walked
/// recursively. During an atomic rollback the scheduler is muted, so
/// this same walk invalidates computed values without running effects.
pub(crate) fn notify_changed(origin: NodeId) {
    for sub in graph::subs_of(origin) {
        let Some(reactive) = get(sub) else { continue };
        if reactive.is_eager() {
            scheduler::schedule_job(reactive);
        } else if reactive.mark_stale() {
            notify_changed(sub);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct MockReactive {
        id: NodeId,
        eager: bool,
        stale: AtomicBool,
        runs: AtomicUsize,
    }

    impl MockReactive {
        fn new(eager: bool) -> Arc<Self> {
            Arc::new(Self {
                id: NodeId::new(),
                eager,
                stale: AtomicBool::new(false),
                runs: AtomicUsize::new(0),
            })
        }
    }

    impl Reactive for MockReactive {
        fn node_id(&self) -> NodeId {
            self.id
        }

        fn is_eager(&self) -> bool {
            self.eager
        }

        fn mark_stale(&self) -> bool {
            !self.stale.swap(true, Ordering::SeqCst)
        }

        fn is_disposed(&self) -> bool {
            false
        }

        fn run(&self) {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn registry_round_trip() {
        let reactive = MockReactive::new(false);
        let id = reactive.id;

        register(reactive.clone() as Arc<dyn Reactive>);
        assert!(get(id).is_some());

        unregister(id);
        assert!(get(id).is_none());
    }

    #[test]
    fn dead_entries_are_pruned_on_lookup() {
        let reactive = MockReactive::new(false);
        let id = reactive.id;

        register(reactive.clone() as Arc<dyn Reactive>);
        drop(reactive);

        // The weak entry cannot upgrade, so lookup reports absence and
        // removes the entry.
        assert!(get(id).is_none());
        assert!(registry()
            .read()
            .expect("registry lock poisoned")
            .get(&id)
            .is_none());
    }

    #[test]
    fn mark_stale_reports_the_transition_once() {
        let reactive = MockReactive::new(false);
        assert!(reactive.mark_stale());
        assert!(!reactive.mark_stale());
    }
}

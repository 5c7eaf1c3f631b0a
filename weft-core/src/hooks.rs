//! Devtools Hooks
//!
//! An optional observation sink for external tooling. The runtime calls
//! these hooks at node creation, removal, every accepted write, and
//! around effect and computed executions. Correctness never depends on a
//! sink being installed; every method defaults to a no-op.

use std::sync::{Arc, OnceLock, RwLock};
use std::time::{Duration, Instant};

use crate::graph::{NodeId, NodeKind};

/// Observation points exposed to developer tooling.
///
/// Implement whichever methods are interesting; the rest stay no-ops.
pub trait DevtoolsHooks: Send + Sync {
    /// A node was created.
    fn register_node(&self, _id: NodeId, _kind: NodeKind) {}

    /// A node was removed from the graph.
    fn unregister_node(&self, _id: NodeId) {}

    /// A signal accepted a write (the equality gate passed).
    fn record_update(&self, _id: NodeId) {}

    /// An effect or computed body is about to run.
    fn run_started(&self, _id: NodeId) {}

    /// An effect or computed body finished running.
    fn run_finished(&self, _id: NodeId, _elapsed: Duration) {}
}

static HOOKS: OnceLock<RwLock<Option<Arc<dyn DevtoolsHooks>>>> = OnceLock::new();

fn slot() -> &'static RwLock<Option<Arc<dyn DevtoolsHooks>>> {
    HOOKS.get_or_init(|| RwLock::new(None))
}

/// Install a devtools sink, replacing any previous one.
pub fn set_devtools_hooks(hooks: Arc<dyn DevtoolsHooks>) {
    *slot().write().expect("hooks lock poisoned") = Some(hooks);
}

/// Remove the installed devtools sink, if any.
pub fn clear_devtools_hooks() {
    *slot().write().expect("hooks lock poisoned") = None;
}

// The lock is released before any hook method runs; a sink may call back
// into the runtime.
fn current() -> Option<Arc<dyn DevtoolsHooks>> {
    slot().read().expect("hooks lock poisoned").clone()
}

pub(crate) fn register_node(id: NodeId, kind: NodeKind) {
    if let Some(hooks) = current() {
        hooks.register_node(id, kind);
    }
}

pub(crate) fn unregister_node(id: NodeId) {
    if let Some(hooks) = current() {
        hooks.unregister_node(id);
    }
}

pub(crate) fn record_update(id: NodeId) {
    if let Some(hooks) = current() {
        hooks.record_update(id);
    }
}

/// Run `f`, reporting start and elapsed time to the sink when installed.
pub(crate) fn with_timing<R>(id: NodeId, f: impl FnOnce() -> R) -> R {
    match current() {
        Some(hooks) => {
            hooks.run_started(id);
            let start = Instant::now();
            let out = f();
            hooks.run_finished(id, start.elapsed());
            out
        }
        None => f(),
    }
}

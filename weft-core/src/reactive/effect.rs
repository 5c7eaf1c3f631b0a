//! Effect Implementation
//!
//! An Effect is a side-effecting computation that re-runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its body once to establish initial
//!    dependencies.
//!
//! 2. When any dependency changes, the scheduler queues the effect;
//!    queued effects are coalesced, so a synchronous burst of writes
//!    produces at most one re-run per effect.
//!
//! 3. Each run first drains the cleanups registered by the previous run
//!    (last registered, first run), drops the old dependency edges, and
//!    re-collects edges while the body executes.
//!
//! # Cleanup
//!
//! A body registers teardown work with [`on_cleanup`], or by returning a
//! closure when constructed through [`Effect::with_cleanup`]. Cleanups
//! run before the next body and on dispose. A panicking cleanup is
//! isolated: the remaining cleanups still run.
//!
//! # Dispose
//!
//! [`Effect::dispose`] is the cancellation primitive: it drains
//! cleanups, severs the effect's edges, and makes any still-queued run a
//! no-op. Dropping the last handle disposes implicitly.

use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::graph::{self, NodeId, NodeKind};
use crate::hooks;

use super::context;
use super::runtime::{self, Reactive};
use super::scheduler;

/// Teardown work registered by an effect body.
pub type Cleanup = Box<dyn FnOnce() + Send + Sync>;

thread_local! {
    // Effects currently executing on this thread, innermost last.
    // `on_cleanup` appends to the innermost entry's list.
    static ACTIVE_EFFECTS: RefCell<Vec<(NodeId, Arc<RwLock<Vec<Cleanup>>>)>> =
        RefCell::new(Vec::new());
}

/// Register teardown work with the innermost running effect.
///
/// The callback runs before the effect's next body, or on dispose,
/// whichever comes first. Outside a running effect this is a no-op
/// (logged, since it usually means a cleanup was lost).
pub fn on_cleanup(cleanup: impl FnOnce() + Send + Sync + 'static) {
    let registered = ACTIVE_EFFECTS.with(|stack| match stack.borrow().last() {
        Some((_, cleanups)) => {
            cleanups
                .write()
                .expect("cleanups lock poisoned")
                .push(Box::new(cleanup));
            true
        }
        None => false,
    });
    if !registered {
        tracing::warn!("on_cleanup called outside a running effect; callback dropped");
    }
}

/// Pops the active-effect entry on all exit paths.
struct ActiveEffectScope;

impl ActiveEffectScope {
    fn push(id: NodeId, cleanups: &Arc<RwLock<Vec<Cleanup>>>) -> Self {
        ACTIVE_EFFECTS.with(|stack| {
            stack.borrow_mut().push((id, Arc::clone(cleanups)));
        });
        ActiveEffectScope
    }
}

impl Drop for ActiveEffectScope {
    fn drop(&mut self) {
        ACTIVE_EFFECTS.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

struct EffectShared {
    /// This effect's node in the dependency graph.
    id: NodeId,

    /// The effect body.
    f: Box<dyn Fn() + Send + Sync>,

    /// Teardown registered by the latest run, drained LIFO.
    cleanups: Arc<RwLock<Vec<Cleanup>>>,

    /// Disposed effects never run again.
    disposed: AtomicBool,

    /// Number of completed runs.
    run_count: AtomicUsize,
}

impl EffectShared {
    fn execute(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        self.drain_cleanups();

        // Drop the old edges; the body rebuilds them as it reads.
        // Snapshot first: unlink mutates the underlying sets.
        for dep in graph::deps_of(self.id) {
            graph::unlink(self.id, dep);
        }

        let _scope = ActiveEffectScope::push(self.id, &self.cleanups);
        hooks::with_timing(self.id, || {
            context::with_observer(self.id, || (self.f)());
        });

        self.run_count.fetch_add(1, Ordering::SeqCst);
    }

    fn drain_cleanups(&self) {
        let mut cleanups =
            std::mem::take(&mut *self.cleanups.write().expect("cleanups lock poisoned"));
        // LIFO: last registered runs first. Each callback is isolated
        // so one panicking cleanup cannot starve the rest.
        while let Some(cleanup) = cleanups.pop() {
            if catch_unwind(AssertUnwindSafe(cleanup)).is_err() {
                tracing::warn!(node = ?self.id, "cleanup panicked; remaining cleanups still run");
            }
        }
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.drain_cleanups();
        graph::remove(self.id);
        runtime::unregister(self.id);
    }
}

impl Reactive for EffectShared {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn is_eager(&self) -> bool {
        true
    }

    fn mark_stale(&self) -> bool {
        false
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn run(&self) {
        self.execute();
    }
}

impl Drop for EffectShared {
    fn drop(&mut self) {
        // Backstop for handles dropped while a queued run still held
        // the allocation alive. No user code here: cleanups already ran
        // if anyone disposed, and drop glue must not re-enter the
        // scheduler.
        graph::remove(self.id);
        runtime::unregister(self.id);
    }
}

/// A side-effecting computation that re-runs when dependencies change.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
/// let count2 = count.clone();
///
/// let effect = Effect::new(move || {
///     println!("count is {}", count2.get());
/// });
///
/// count.set(5);
/// run_microtasks(); // prints "count is 5"
/// # drop(effect);
/// ```
pub struct Effect {
    shared: Arc<EffectShared>,
}

impl Effect {
    /// Create a new effect. The body runs immediately to establish its
    /// initial dependencies.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let effect = Self::build(Box::new(f));
        effect.execute();
        effect
    }

    /// Create an effect without running it.
    ///
    /// It collects no dependencies until the first [`Effect::execute`].
    pub fn new_lazy<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::build(Box::new(f))
    }

    /// Create an effect whose body returns its own teardown closure.
    ///
    /// Equivalent to calling [`on_cleanup`] with the returned closure at
    /// the end of the body. Runs immediately, like [`Effect::new`].
    pub fn with_cleanup<F, C>(f: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
        C: FnOnce() + Send + Sync + 'static,
    {
        Self::new(move || {
            let cleanup = f();
            on_cleanup(cleanup);
        })
    }

    fn build(f: Box<dyn Fn() + Send + Sync>) -> Self {
        let shared = Arc::new(EffectShared {
            id: graph::insert(NodeKind::Effect),
            f,
            cleanups: Arc::new(RwLock::new(Vec::new())),
            disposed: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
        });
        runtime::register(shared.clone() as Arc<dyn Reactive>);
        Self { shared }
    }

    /// This effect's node id.
    pub fn node_id(&self) -> NodeId {
        self.shared.id
    }

    /// Run the body now, draining previous cleanups first.
    pub fn execute(&self) {
        self.shared.execute();
    }

    /// Queue the effect for the next flush. Idempotent per flush; a
    /// no-op after dispose.
    pub fn schedule(&self) {
        scheduler::schedule_job(self.shared.clone() as Arc<dyn Reactive>);
    }

    /// Tear the effect down: drain cleanups, sever its edges, and make
    /// any further schedule or run a no-op. Idempotent.
    pub fn dispose(&self) {
        self.shared.dispose();
    }

    /// Whether the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::SeqCst)
    }

    /// Number of completed runs.
    pub fn run_count(&self) -> usize {
        self.shared.run_count.load(Ordering::SeqCst)
    }

    /// Number of dependencies collected by the latest run.
    pub fn dependency_count(&self) -> usize {
        graph::deps_of(self.shared.id).len()
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Drop for Effect {
    fn drop(&mut self) {
        // Last handle: dispose so cleanups run deterministically. When
        // a queued job still holds the allocation, that run proceeds
        // and the EffectShared backstop retires the node afterwards.
        if Arc::strong_count(&self.shared) == 1 && !self.shared.disposed.load(Ordering::SeqCst) {
            self.shared.dispose();
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.shared.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

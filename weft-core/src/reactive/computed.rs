//! Computed Implementation
//!
//! A Computed is a memoized derivation: push-invalidated, pull-
//! recomputed.
//!
//! # How Computed Values Work
//!
//! 1. Creation does nothing. The closure first runs on the first read.
//!
//! 2. While clean, reads return the cached value.
//!
//! 3. When any dependency changes, the value is marked stale and the
//!    invalidation keeps propagating downstream. No recompute happens
//!    yet.
//!
//! 4. The next read recomputes: old edges are dropped, the closure runs
//!    under this node as observer, and whatever it reads becomes the new
//!    dependency set. Equality gates the cached value only, never the
//!    re-tracking.
//!
//! # Why Lazy
//!
//! A signal change may invalidate many derivations; only the ones
//! actually read ever recompute. Derivations nobody reads stay stale at
//! zero cost.
//!
//! # Cycles
//!
//! A `computing` flag guards recomputation. A derivation that reads
//! itself, directly or through other derivations, fails the read instead
//! of recursing forever.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::ReactiveError;
use crate::graph::{self, NodeId, NodeKind};
use crate::hooks;

use super::context;
use super::runtime::{self, Reactive};

struct ComputedShared<T> {
    /// This derivation's node in the dependency graph.
    id: NodeId,

    /// The derivation body. Runs under this node as observer.
    compute: Box<dyn Fn() -> T + Send + Sync>,

    /// Cache gate: an equal recompute keeps the old value.
    equals: Box<dyn Fn(&T, &T) -> bool + Send + Sync>,

    /// The cached value. `None` until the first successful recompute.
    value: RwLock<Option<T>>,

    /// The cache is possibly out of date; next read recomputes.
    stale: AtomicBool,

    /// A value has been cached at least once.
    has_value: AtomicBool,

    /// Re-entrancy guard for cycle detection.
    computing: AtomicBool,
}

/// Resets the `computing` flag on all exit paths, panics included, so a
/// failed recompute leaves the derivation readable (stale, but not
/// poisoned).
struct ComputingReset<'a>(&'a AtomicBool);

impl Drop for ComputingReset<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<T> ComputedShared<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn read(&self) -> Result<T, ReactiveError> {
        if self.stale.load(Ordering::SeqCst) || !self.has_value.load(Ordering::SeqCst) {
            return self.recompute();
        }
        Ok(self
            .value
            .read()
            .expect("value lock poisoned")
            .clone()
            .expect("clean computed holds a value"))
    }

    fn recompute(&self) -> Result<T, ReactiveError> {
        if self.computing.load(Ordering::SeqCst) {
            return Err(ReactiveError::CycleDetected { node: self.id });
        }
        self.computing.store(true, Ordering::SeqCst);
        let _reset = ComputingReset(&self.computing);

        // Drop the old edges; the body rebuilds them as it reads.
        // Snapshot first: unlink mutates the underlying sets.
        for dep in graph::deps_of(self.id) {
            graph::unlink(self.id, dep);
        }

        let next = hooks::with_timing(self.id, || {
            context::with_observer(self.id, || (self.compute)())
        });

        // Equality gates the value update only; the edge rebuild above
        // happened regardless.
        let unchanged = self.has_value.load(Ordering::SeqCst) && {
            let current = self.value.read().expect("value lock poisoned");
            match current.as_ref() {
                Some(prev) => (self.equals)(prev, &next),
                None => false,
            }
        };

        let result = if unchanged {
            self.value
                .read()
                .expect("value lock poisoned")
                .clone()
                .expect("unchanged computed holds a value")
        } else {
            *self.value.write().expect("value lock poisoned") = Some(next.clone());
            self.has_value.store(true, Ordering::SeqCst);
            next
        };

        self.stale.store(false, Ordering::SeqCst);
        Ok(result)
    }
}

impl<T> Reactive for ComputedShared<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn is_eager(&self) -> bool {
        false
    }

    fn mark_stale(&self) -> bool {
        !self.stale.swap(true, Ordering::SeqCst)
    }

    fn is_disposed(&self) -> bool {
        false
    }

    fn run(&self) {
        // Computed values are lazy; they are never enqueued as jobs.
    }
}

impl<T> Drop for ComputedShared<T> {
    fn drop(&mut self) {
        // All handles are gone; nothing can read this derivation again.
        graph::remove(self.id);
        runtime::unregister(self.id);
    }
}

/// A memoized derived value that recomputes only when read after a
/// dependency changed.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(2);
/// let count2 = count.clone();
/// let doubled = Computed::new(move || count2.get() * 2);
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    shared: Arc<ComputedShared<T>>,
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a new computed value, gated by `PartialEq`.
    ///
    /// The closure does not run until the first read.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::new_with_equals(compute, T::eq)
    }
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new computed value with a custom equality predicate.
    pub fn new_with_equals<F>(
        compute: F,
        equals: impl Fn(&T, &T) -> bool + Send + Sync + 'static,
    ) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let shared = Arc::new(ComputedShared {
            id: graph::insert(NodeKind::Computed),
            compute: Box::new(compute),
            equals: Box::new(equals),
            value: RwLock::new(None),
            stale: AtomicBool::new(true),
            has_value: AtomicBool::new(false),
            computing: AtomicBool::new(false),
        });
        runtime::register(shared.clone() as Arc<dyn Reactive>);
        Self { shared }
    }

    /// This derivation's node id.
    pub fn node_id(&self) -> NodeId {
        self.shared.id
    }

    /// Get the current value, recomputing if stale.
    ///
    /// Fails with [`ReactiveError::CycleDetected`] when the recompute
    /// re-enters this derivation.
    pub fn try_get(&self) -> Result<T, ReactiveError> {
        context::track(self.shared.id);
        self.shared.read()
    }

    /// Get the current value, recomputing if stale.
    ///
    /// # Panics
    ///
    /// Panics on a dependency cycle. Use [`Computed::try_get`] to handle
    /// that case as a value.
    pub fn get(&self) -> T {
        match self.try_get() {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Read without tracking and without refreshing a stale cache.
    ///
    /// The one exception: a derivation that has never run computes here
    /// once (untracked), because there is no previous value to hand
    /// back. After that, `peek` returns the cache as-is, stale or not.
    pub fn peek(&self) -> T {
        if self.shared.has_value.load(Ordering::SeqCst) {
            return self
                .shared
                .value
                .read()
                .expect("value lock poisoned")
                .clone()
                .expect("cached computed holds a value");
        }
        match self.shared.recompute() {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Whether a value has been cached.
    pub fn has_value(&self) -> bool {
        self.shared.has_value.load(Ordering::SeqCst)
    }

    /// Whether the cache is marked out of date.
    pub fn is_stale(&self) -> bool {
        self.shared.stale.load(Ordering::SeqCst)
    }

    /// Number of nodes currently depending on this derivation.
    pub fn subscriber_count(&self) -> usize {
        graph::subs_of(self.shared.id).len()
    }

    /// Sever all incident edges and drop the cached value.
    ///
    /// Downstream subscribers simply lose this dependency; they
    /// re-collect on their next run. Reading a disposed derivation
    /// recomputes from scratch, outside the graph.
    pub fn dispose(&self) {
        graph::remove(self.shared.id);
        runtime::unregister(self.shared.id);
        self.shared.stale.store(true, Ordering::SeqCst);
        self.shared.has_value.store(false, Ordering::SeqCst);
        *self.shared.value.write().expect("value lock poisoned") = None;
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.shared.id)
            .field("stale", &self.is_stale())
            .field("has_value", &self.has_value())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Signal;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn computes_on_first_access_only() {
        let calls = Arc::new(AtomicI32::new(0));
        let calls_inner = calls.clone();

        let computed = Computed::new(move || {
            calls_inner.fetch_add(1, Ordering::SeqCst);
            42
        });

        assert!(!computed.has_value());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(computed.get(), 42);
        assert_eq!(computed.get(), 42);
        assert_eq!(computed.get(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(computed.has_value());
    }

    #[test]
    fn recomputes_after_dependency_change() {
        let source = Signal::new(10);
        let source_inner = source.clone();
        let doubled = Computed::new(move || source_inner.get() * 2);

        assert_eq!(doubled.get(), 20);
        assert!(!doubled.is_stale());

        source.set(5);
        assert!(doubled.is_stale());
        assert_eq!(doubled.get(), 10);
    }

    #[test]
    fn staleness_propagates_through_chains() {
        let source = Signal::new(1);
        let source_inner = source.clone();
        let doubled = Computed::new(move || source_inner.get() * 2);
        let doubled_inner = doubled.clone();
        let plus_ten = Computed::new(move || doubled_inner.get() + 10);

        assert_eq!(plus_ten.get(), 12);

        source.set(3);
        assert!(doubled.is_stale());
        assert!(plus_ten.is_stale());
        assert_eq!(plus_ten.get(), 16);
    }

    #[test]
    fn equal_recompute_keeps_the_old_value() {
        let source = Signal::new(1);
        let source_inner = source.clone();
        // Collapses many inputs to one output.
        let sign = Computed::new(move || if source_inner.get() >= 0 { 1 } else { -1 });

        assert_eq!(sign.get(), 1);

        source.set(7);
        assert_eq!(sign.get(), 1);
        assert!(!sign.is_stale());
    }

    #[test]
    fn cycle_is_detected_not_recursed() {
        let slot: Arc<RwLock<Option<Computed<i32>>>> = Arc::new(RwLock::new(None));
        let slot_inner = slot.clone();

        let selfish = Computed::new(move || {
            let guard = slot_inner.read().expect("slot lock poisoned");
            match guard.as_ref() {
                Some(me) => me.try_get().map(|v| v + 1).unwrap_or(-1),
                None => 0,
            }
        });
        *slot.write().expect("slot lock poisoned") = Some(selfish.clone());

        // The inner read fails with CycleDetected; the closure maps it
        // to -1, so the outer read completes with that value.
        assert_eq!(selfish.get(), -1);
    }

    #[test]
    fn panicking_body_leaves_a_readable_derivation() {
        let source = Signal::new(0);
        let source_inner = source.clone();
        let fussy = Computed::new(move || {
            let v = source_inner.get();
            assert!(v >= 0, "negative input");
            v * 2
        });

        source.set(-1);
        let panicked =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| fussy.get())).is_err();
        assert!(panicked);

        // Still stale, not poisoned: fixing the input fixes the read.
        assert!(fussy.is_stale());
        source.set(4);
        assert_eq!(fussy.get(), 8);
    }

    #[test]
    fn peek_does_not_refresh_a_stale_cache() {
        let source = Signal::new(1);
        let source_inner = source.clone();
        let doubled = Computed::new(move || source_inner.get() * 2);

        assert_eq!(doubled.get(), 2);
        source.set(10);

        // Stale data is fine for peek.
        assert_eq!(doubled.peek(), 2);
        assert!(doubled.is_stale());

        assert_eq!(doubled.get(), 20);
        assert_eq!(doubled.peek(), 20);
    }

    #[test]
    fn first_peek_computes_untracked() {
        let source = Signal::new(3);
        let source_inner = source.clone();
        let doubled = Computed::new(move || source_inner.get() * 2);

        let observer = graph::insert(NodeKind::Effect);
        context::with_observer(observer, || {
            assert_eq!(doubled.peek(), 6);
        });

        // The observer did not subscribe to the derivation, but the
        // derivation did subscribe to its own inputs.
        assert!(graph::deps_of(observer).is_empty());
        assert_eq!(source.subscriber_count(), 1);

        graph::remove(observer);
    }

    #[test]
    fn dispose_severs_edges_and_resets() {
        let source = Signal::new(1);
        let source_inner = source.clone();
        let doubled = Computed::new(move || source_inner.get() * 2);

        assert_eq!(doubled.get(), 2);
        assert_eq!(source.subscriber_count(), 1);

        doubled.dispose();
        assert_eq!(source.subscriber_count(), 0);
        assert!(!doubled.has_value());
        assert!(doubled.is_stale());

        // A disposed derivation still answers reads, outside the graph.
        assert_eq!(doubled.get(), 2);
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn clone_shares_state() {
        let calls = Arc::new(AtomicI32::new(0));
        let calls_inner = calls.clone();
        let computed = Computed::new(move || {
            calls_inner.fetch_add(1, Ordering::SeqCst);
            42
        });

        let clone = computed.clone();
        assert_eq!(computed.get(), 42);
        assert_eq!(clone.get(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(computed.node_id(), clone.node_id());
    }
}

//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive: a leaf cell of
//! mutable state with equality-gated writes.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within an observer scope (a computed
//!    recompute or an effect run), the observer is linked to the
//!    signal's graph node.
//!
//! 2. When a signal's value changes, downstream computed values are
//!    marked stale and downstream effects are scheduled.
//!
//! 3. Writes that the equality predicate considers equal are dropped
//!    before any of that happens.
//!
//! # Equality
//!
//! The default predicate is `PartialEq::eq`. Note that for floats this
//! means a `NaN` write always propagates (`NaN != NaN`); supply a
//! custom predicate through [`Signal::new_with_equals`] if bitwise
//! identity is wanted.
//!
//! # Thread Safety
//!
//! The value is protected by a `RwLock` and handles are cheap clones
//! sharing the same cell. Writes from another thread schedule effects
//! on that thread's queue.

use std::fmt::Debug;
use std::sync::{Arc, RwLock};

use crate::error::ReactiveError;
use crate::graph::{self, NodeId, NodeKind};
use crate::hooks;

use super::context;
use super::runtime;
use super::scheduler;

/// A reactive signal holding a value of type `T`.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// // Read the value (tracked inside observer scopes)
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// This signal's node in the dependency graph.
    id: NodeId,

    /// The current value.
    value: Arc<RwLock<T>>,

    /// Write gate: writes of an equal value are dropped.
    equals: Arc<dyn Fn(&T, &T) -> bool + Send + Sync>,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a new signal with the given initial value, gated by
    /// `PartialEq`.
    pub fn new(value: T) -> Self {
        Self::new_with_equals(value, T::eq)
    }
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new signal with a custom equality predicate.
    pub fn new_with_equals(
        value: T,
        equals: impl Fn(&T, &T) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: graph::insert(NodeKind::Signal),
            value: Arc::new(RwLock::new(value)),
            equals: Arc::new(equals),
        }
    }

    /// This signal's node id.
    pub fn node_id(&self) -> NodeId {
        self.id
    }

    /// Get the current value.
    ///
    /// If called within an observer scope, the observer becomes a
    /// subscriber of this signal.
    pub fn get(&self) -> T {
        context::track(self.id);
        self.value.read().expect("value lock poisoned").clone()
    }

    /// Get the current value without establishing a dependency.
    pub fn peek(&self) -> T {
        self.value.read().expect("value lock poisoned").clone()
    }

    /// Set a new value and notify subscribers.
    ///
    /// If the equality predicate accepts the pair, the write is dropped
    /// with no side effect at all. Inside an atomic scope the previous
    /// value is recorded (first write wins) before the cell changes, so
    /// a rollback can restore it.
    pub fn set(&self, value: T) {
        {
            let mut current = self.value.write().expect("value lock poisoned");
            if (self.equals)(&current, &value) {
                return;
            }
            if scheduler::in_atomic() {
                let prev = current.clone();
                let cell = Arc::clone(&self.value);
                scheduler::record_atomic_write(
                    self.id,
                    Box::new(move || {
                        *cell.write().expect("value lock poisoned") = prev;
                    }),
                );
            }
            *current = value;
        }
        hooks::record_update(self.id);
        runtime::notify_changed(self.id);
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let next = {
            let current = self.value.read().expect("value lock poisoned");
            f(&current)
        };
        self.set(next);
    }

    /// Subscribe an observer node to this signal.
    ///
    /// Fails with [`ReactiveError::IllegalEdge`] when the observer is a
    /// signal. The returned guard unlinks on drop. An effect subscribed
    /// this way is scheduled on the next write; its run then re-collects
    /// dependencies as usual.
    pub fn subscribe(&self, observer: NodeId) -> Result<SubscriptionGuard, ReactiveError> {
        if graph::kind_of(observer) == Some(NodeKind::Signal) {
            return Err(ReactiveError::IllegalEdge {
                from: observer,
                to: self.id,
            });
        }
        graph::link(observer, self.id)?;
        Ok(SubscriptionGuard {
            observer,
            dep: self.id,
        })
    }

    /// Number of nodes currently subscribed to this signal.
    pub fn subscriber_count(&self) -> usize {
        graph::subs_of(self.id).len()
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            value: Arc::clone(&self.value),
            equals: Arc::clone(&self.equals),
        }
    }
}

impl<T> Drop for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        // Last handle gone (closures capturing a clone count as
        // handles): retire the graph node. A racing clone-drop on
        // another thread can at worst leak the node, never double-free.
        if Arc::strong_count(&self.value) == 1 {
            graph::remove(self.id);
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id)
            .field("value", &self.peek())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Active subscription created by [`Signal::subscribe`].
///
/// Dropping the guard removes the edge.
#[derive(Debug)]
#[must_use = "dropping the guard immediately cancels the subscription"]
pub struct SubscriptionGuard {
    observer: NodeId,
    dep: NodeId,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        graph::unlink(self.observer, self.dep);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        signal.set(42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn peek_does_not_track() {
        let signal = Signal::new(7);
        let observer = graph::insert(NodeKind::Effect);

        context::with_observer(observer, || {
            assert_eq!(signal.peek(), 7);
        });

        assert!(graph::subs_of(signal.node_id()).is_empty());
        graph::remove(observer);
    }

    #[test]
    fn equal_writes_are_dropped() {
        let signal = Signal::new(1);
        let observer = graph::insert(NodeKind::Effect);

        context::with_observer(observer, || {
            signal.get();
        });

        // Equal write: the subscriber set is untouched and no update
        // hook fires; most importantly no stale marking happens, which
        // the integration tests assert through effect run counts.
        signal.set(1);
        assert_eq!(signal.get(), 1);
        assert_eq!(signal.subscriber_count(), 1);

        graph::remove(observer);
    }

    #[test]
    fn custom_equality_gates_writes() {
        // Compare only the integral part.
        let signal = Signal::new_with_equals(1.25_f64, |a, b| a.trunc() == b.trunc());

        signal.set(1.75);
        assert_eq!(signal.peek(), 1.25); // gated: same integral part

        signal.set(2.5);
        assert_eq!(signal.peek(), 2.5);
    }

    #[test]
    fn subscribe_rejects_signal_observers() {
        let a = Signal::new(0);
        let b = Signal::new(1);

        let err = b.subscribe(a.node_id()).unwrap_err();
        assert!(matches!(err, ReactiveError::IllegalEdge { .. }));
    }

    #[test]
    fn subscription_guard_unlinks_on_drop() {
        let signal = Signal::new(0);
        let observer = graph::insert(NodeKind::Computed);

        let guard = signal.subscribe(observer).unwrap();
        assert_eq!(signal.subscriber_count(), 1);

        drop(guard);
        assert_eq!(signal.subscriber_count(), 0);

        graph::remove(observer);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);

        signal2.set(100);
        assert_eq!(signal1.get(), 100);
    }

    #[test]
    fn last_handle_drop_retires_the_node() {
        let signal = Signal::new(0);
        let id = signal.node_id();
        let clone = signal.clone();

        drop(signal);
        assert_eq!(graph::kind_of(id), Some(NodeKind::Signal));

        drop(clone);
        assert_eq!(graph::kind_of(id), None);
    }

    #[test]
    fn signal_ids_are_unique() {
        let s1 = Signal::new(0);
        let s2 = Signal::new(0);
        let s3 = Signal::new(0);

        assert_ne!(s1.node_id(), s2.node_id());
        assert_ne!(s2.node_id(), s3.node_id());
        assert_ne!(s1.node_id(), s3.node_id());
    }
}

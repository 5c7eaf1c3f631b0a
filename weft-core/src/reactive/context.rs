//! Observer Context
//!
//! The observer context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal or computed
//! value is read, we can link the current observer to it.
//!
//! # Implementation
//!
//! We use a thread-local stack of node ids. When a computation starts
//! (a computed recompute or an effect run), its node is pushed; when it
//! completes, it is popped. Nested computations (an effect that reads a
//! computed value) form a LIFO stack, and the innermost observer is the
//! one that collects dependencies.
//!
//! The stack is restored by an RAII guard on every exit path, including
//! panics. Observer scopes are never held across awaits; only the atomic
//! scope in the scheduler spans suspension points.

use std::cell::RefCell;

use crate::graph::{self, NodeId};

thread_local! {
    static OBSERVER_STACK: RefCell<Vec<NodeId>> = RefCell::new(Vec::new());
}

/// Guard that pops the observer when dropped.
///
/// This keeps the stack balanced even if the computation panics.
struct ObserverGuard {
    observer: NodeId,
}

impl ObserverGuard {
    fn push(observer: NodeId) -> Self {
        OBSERVER_STACK.with(|stack| stack.borrow_mut().push(observer));
        Self { observer }
    }
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        OBSERVER_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Catch mismatched push/pop pairs early.
            debug_assert_eq!(
                popped,
                Some(self.observer),
                "observer stack out of balance: expected {:?}, got {:?}",
                self.observer,
                popped
            );
        });
    }
}

/// Run `f` with `observer` as the current observer.
///
/// The previous observer (if any) is saved on entry and restored on all
/// exits. Reads performed inside `f` link `observer` to the nodes read.
pub fn with_observer<R>(observer: NodeId, f: impl FnOnce() -> R) -> R {
    let _guard = ObserverGuard::push(observer);
    f()
}

/// The innermost currently running observer, if any.
pub fn current_observer() -> Option<NodeId> {
    OBSERVER_STACK.with(|stack| stack.borrow().last().copied())
}

/// Record that the current observer (if any) depends on `dep`.
///
/// Called by signals and computed values when they are read. Outside an
/// observer scope this is a no-op.
pub fn track(dep: NodeId) {
    if let Some(observer) = current_observer() {
        graph::link(observer, dep).expect("observers are never signals");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;

    #[test]
    fn observer_scope_restores_on_exit() {
        let id = NodeId::new();

        assert!(current_observer().is_none());

        let out = with_observer(id, || {
            assert_eq!(current_observer(), Some(id));
            "done"
        });

        assert_eq!(out, "done");
        assert!(current_observer().is_none());
    }

    #[test]
    fn nested_scopes_form_a_lifo_stack() {
        let outer = NodeId::new();
        let inner = NodeId::new();

        with_observer(outer, || {
            assert_eq!(current_observer(), Some(outer));
            with_observer(inner, || {
                assert_eq!(current_observer(), Some(inner));
            });
            assert_eq!(current_observer(), Some(outer));
        });

        assert!(current_observer().is_none());
    }

    #[test]
    fn observer_restored_after_panic() {
        let outer = NodeId::new();
        let inner = NodeId::new();

        with_observer(outer, || {
            let result = std::panic::catch_unwind(|| {
                with_observer(inner, || panic!("boom"));
            });
            assert!(result.is_err());
            assert_eq!(current_observer(), Some(outer));
        });
    }

    #[test]
    fn track_links_to_the_current_observer() {
        let sig = graph::insert(NodeKind::Signal);
        let eff = graph::insert(NodeKind::Effect);

        // Untracked read: no observer, no edge.
        track(sig);
        assert!(graph::subs_of(sig).is_empty());

        with_observer(eff, || {
            track(sig);
            track(sig); // idempotent
        });

        assert_eq!(graph::deps_of(eff), vec![sig]);
        assert_eq!(graph::subs_of(sig), vec![eff]);

        graph::remove(sig);
        graph::remove(eff);
    }
}

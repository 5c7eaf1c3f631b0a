//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computed
//! values, and effects, plus the scheduler that coalesces effect runs.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A [`Signal`] is a container for mutable state. When a signal is read
//! within an observer scope (a computed recompute or an effect run), the
//! reader is registered as a dependent. When the signal's value changes,
//! dependent computed values are invalidated and dependent effects are
//! scheduled.
//!
//! ## Computed values
//!
//! A [`Computed`] is a derived value that caches its result. Changes
//! push staleness down the graph; the actual recompute happens lazily on
//! the next read.
//!
//! ## Effects
//!
//! An [`Effect`] is a side-effecting computation that re-runs when its
//! dependencies change. Effects own a cleanup stack drained before each
//! re-run and on dispose.
//!
//! ## Scopes
//!
//! [`batch`] defers effect runs until the scope exits. [`atomic`] (and
//! its alias [`transaction`]) additionally records every signal's
//! pre-scope value and rolls the writes back if the scope fails;
//! [`atomic_async`] spans an async computation the same way.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local observer stack to detect
//! dependencies automatically, the approach used by SolidJS, Vue 3, and
//! Leptos. Scheduling state is equally thread-local: one runtime per
//! thread, cooperative within it.

mod computed;
mod context;
mod effect;
mod microtask;
mod runtime;
mod scheduler;
mod signal;

pub use computed::Computed;
pub use context::{current_observer, track, with_observer};
pub use effect::{on_cleanup, Cleanup, Effect};
pub use microtask::{
    clear_microtask_driver, run_microtasks, set_microtask_driver, MicrotaskDriver,
};
pub use scheduler::{
    atomic, atomic_async, batch, flush_sync, in_atomic, record_atomic_write, transaction,
};
pub use signal::{Signal, SubscriptionGuard};

/// Read access shared by signals and computed values.
///
/// Framework adapters hold sources through this trait: `get` for
/// tracked reads inside observer scopes, `peek` when possibly-stale
/// data is acceptable.
pub trait Readable<T> {
    /// Read the current value, tracked.
    fn get(&self) -> T;

    /// Read without establishing a dependency. For computed values this
    /// may return stale data; see [`Computed::peek`].
    fn peek(&self) -> T;
}

impl<T> Readable<T> for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn get(&self) -> T {
        Signal::get(self)
    }

    fn peek(&self) -> T {
        Signal::peek(self)
    }
}

impl<T> Readable<T> for Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn get(&self) -> T {
        Computed::get(self)
    }

    fn peek(&self) -> T {
        Computed::peek(self)
    }
}

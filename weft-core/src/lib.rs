//! Weft Core
//!
//! This crate provides a fine-grained reactivity runtime: declare cells
//! of state (signals), memoized derivations (computed values), and side
//! effects, and the runtime guarantees that whenever state changes,
//! exactly the affected derivations are recomputed and affected effects
//! re-executed, in a consistent order, with minimal work.
//!
//! # Architecture
//!
//! The crate is organized into a few modules:
//!
//! - `reactive`: the reactive primitives, observer tracking, and the
//!   scheduler (batching, atomic scopes with rollback, coalesced
//!   flushing)
//! - `graph`: the dependency graph of node ids and bidirectional edges
//! - `error`: the runtime's typed errors
//! - `hooks`: optional observation points for developer tooling
//!
//! # Example
//!
//! ```rust,ignore
//! use weft_core::{Signal, Computed, Effect, run_microtasks};
//!
//! // Create a signal
//! let count = Signal::new(0);
//!
//! // Create a derived value
//! let count2 = count.clone();
//! let doubled = Computed::new(move || count2.get() * 2);
//!
//! // Create an effect
//! let count3 = count.clone();
//! let doubled2 = doubled.clone();
//! let effect = Effect::new(move || {
//!     println!("count: {}, doubled: {}", count3.get(), doubled2.get());
//! });
//!
//! // Update the signal; the effect re-runs on the next flush
//! count.set(5);
//! run_microtasks();
//! // prints: "count: 5, doubled: 10"
//! # drop(effect);
//! ```
//!
//! # Threading model
//!
//! A runtime instance is one thread's worth of observer stack, job
//! queue, and atomic-scope logs; flushing is single-threaded and
//! cooperative. The graph and value cells are lock-protected, so
//! handles may be sent across threads, but writes schedule effects on
//! the writing thread's queue.

pub mod error;
pub mod graph;
pub mod hooks;
pub mod reactive;

pub use error::ReactiveError;
pub use graph::{NodeId, NodeKind};
pub use hooks::{clear_devtools_hooks, set_devtools_hooks, DevtoolsHooks};
pub use reactive::{
    atomic, atomic_async, batch, flush_sync, in_atomic, on_cleanup, run_microtasks, transaction,
    Cleanup, Computed, Effect, MicrotaskDriver, Readable, Signal, SubscriptionGuard,
};

//! Error types for the reactivity runtime.
//!
//! This module provides strongly-typed errors with actionable context.
//! All errors carry the relevant node identifiers to aid debugging.
//!
//! User code running inside computed or effect bodies is infallible at
//! the type level; a panicking body propagates per the rules documented
//! on [`Computed`](crate::reactive::Computed) and
//! [`Effect`](crate::reactive::Effect). A fallible atomic closure's
//! error passes through [`atomic`](crate::reactive::atomic) untouched
//! after rollback, so it is never wrapped here.

use crate::graph::NodeId;
use thiserror::Error;

/// The error type for reactivity runtime operations.
#[derive(Error, Debug)]
pub enum ReactiveError {
    /// An edge was requested with a signal as its source. Signals are
    /// leaf state cells and never depend on other nodes.
    #[error("illegal edge: node {from:?} is a signal and cannot depend on {to:?}")]
    IllegalEdge {
        /// The node that would have acquired the dependency.
        from: NodeId,
        /// The node it would have depended on.
        to: NodeId,
    },

    /// A computed value's evaluation re-entered itself, directly or
    /// through other computed values.
    #[error("cycle detected: computed {node:?} re-entered its own evaluation")]
    CycleDetected {
        /// The node whose evaluation was re-entered.
        node: NodeId,
    },

    /// The job queue kept refilling across flush rounds. Almost always
    /// an effect writing a signal it also reads.
    #[error("infinite update loop: job queue still non-empty after {rounds} flush rounds")]
    InfiniteUpdateLoop {
        /// Number of drain rounds executed before giving up.
        rounds: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_nodes() {
        let from = NodeId::new();
        let to = NodeId::new();
        let err = ReactiveError::IllegalEdge { from, to };
        let msg = err.to_string();
        assert!(msg.contains("illegal edge"));
        assert!(msg.contains(&format!("{from:?}")));

        let err = ReactiveError::InfiniteUpdateLoop { rounds: 10_001 };
        assert!(err.to_string().contains("10001"));
    }
}

//! Update Scheduler
//!
//! The scheduler decides when queued effects actually run. It coalesces
//! synchronous bursts of writes into a single flush per effect, defers
//! flushing inside `batch`/`transaction`/`atomic` scopes, and gives
//! atomic scopes a write log so a failed scope can restore every signal
//! it touched.
//!
//! # Coalescing
//!
//! A write outside any scope posts one flush to the microtask queue; the
//! job queue dedups by node id, so however many dependencies change, an
//! effect runs at most once per flush. Inside a scope, jobs accumulate
//! and the flush runs synchronously when the outermost scope exits.
//!
//! # Atomic scopes
//!
//! Entering an atomic scope pushes a fresh write log. Signals record
//! their first-seen previous value into the innermost log before writing
//! (first write wins, so the log always holds the value from when the
//! scope began). On commit, the log merges into its parent (again first
//! write wins), which makes nesting compose: the outermost log ends up
//! holding pre-outermost values for every signal written anywhere in the
//! nest. On rollback, the values are restored, downstream computed
//! values are re-invalidated, and the pending queue is discarded; the
//! `muted` counter keeps the restore writes from scheduling effects.
//!
//! # Threading
//!
//! All scheduler state is thread-local. A runtime instance is one
//! thread's worth of queue, depths, and logs; writes from another thread
//! schedule work on that other thread.

use std::cell::RefCell;
use std::collections::HashSet;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::ReactiveError;
use crate::graph::NodeId;

use super::microtask;
use super::runtime::{self, Reactive};

/// Flush rounds tolerated before concluding that effects keep
/// rescheduling each other forever.
const MAX_FLUSH_ROUNDS: usize = 10_000;

/// Restores one signal to its pre-scope value.
type RestoreFn = Box<dyn FnOnce()>;

/// First-seen previous values for one atomic scope.
struct WriteLog {
    /// Insertion-ordered entries. Each node appears at most once.
    entries: Vec<(NodeId, RestoreFn)>,
    seen: HashSet<NodeId>,
}

impl WriteLog {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Record a previous value. First write wins: later writes to the
    /// same node within the scope do not replace the entry.
    fn record(&mut self, node: NodeId, restore: RestoreFn) {
        if self.seen.insert(node) {
            self.entries.push((node, restore));
        }
    }

    /// Fold this log into `parent`, keeping the parent's entry wherever
    /// both logs saw the same node.
    fn merge_into(self, parent: &mut WriteLog) {
        for (node, restore) in self.entries {
            if parent.seen.insert(node) {
                parent.entries.push((node, restore));
            }
        }
    }
}

struct Scheduler {
    /// Pending jobs, insertion-ordered, deduped by `queued_ids`.
    queue: Vec<Arc<dyn Reactive>>,
    queued_ids: HashSet<NodeId>,

    /// A flush has been posted to the microtask queue.
    scheduled: bool,

    /// Depth of batch scopes, atomic scopes included.
    batch_depth: usize,

    /// Depth of atomic scopes. Always `atomic_logs.len()`.
    atomic_depth: usize,
    atomic_logs: Vec<WriteLog>,

    /// Non-zero while a rollback restores values; suppresses scheduling.
    muted: usize,
}

impl Scheduler {
    fn new() -> Self {
        Self {
            queue: Vec::new(),
            queued_ids: HashSet::new(),
            scheduled: false,
            batch_depth: 0,
            atomic_depth: 0,
            atomic_logs: Vec::new(),
            muted: 0,
        }
    }
}

thread_local! {
    static SCHEDULER: RefCell<Scheduler> = RefCell::new(Scheduler::new());
}

// All access goes through this helper; the borrow never outlives `f`,
// so jobs and restore closures always run with the scheduler released.
fn with<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
    SCHEDULER.with(|scheduler| f(&mut scheduler.borrow_mut()))
}

/// Enqueue a job for the next flush.
///
/// Disposed jobs and jobs arriving during a rollback are ignored. The
/// queue dedups by node id, so scheduling is idempotent per flush.
pub(crate) fn schedule_job(job: Arc<dyn Reactive>) {
    if job.is_disposed() {
        return;
    }
    let post_flush = with(|s| {
        if s.muted > 0 {
            return false;
        }
        if s.queued_ids.insert(job.node_id()) {
            s.queue.push(job);
        }
        if !s.scheduled && s.batch_depth == 0 {
            s.scheduled = true;
            true
        } else {
            false
        }
    });
    if post_flush {
        microtask::post(Box::new(flush_jobs));
    }
}

/// Drain the queue until it stays empty.
///
/// Jobs may schedule new jobs; each drain of the queue is one round,
/// and more than [`MAX_FLUSH_ROUNDS`] rounds means some effect keeps
/// invalidating itself. A panicking job is isolated and logged so the
/// remaining jobs of its round still run.
pub(crate) fn flush_jobs() {
    with(|s| s.scheduled = false);
    let mut rounds = 0usize;
    loop {
        let snapshot = with(|s| {
            s.queued_ids.clear();
            std::mem::take(&mut s.queue)
        });
        if snapshot.is_empty() {
            break;
        }
        for job in snapshot {
            if job.is_disposed() {
                continue;
            }
            if catch_unwind(AssertUnwindSafe(|| job.run())).is_err() {
                tracing::error!(
                    node = ?job.node_id(),
                    "effect panicked during flush; continuing with remaining jobs"
                );
            }
        }
        rounds += 1;
        if rounds > MAX_FLUSH_ROUNDS {
            panic!("{}", ReactiveError::InfiniteUpdateLoop { rounds });
        }
    }
}

/// Run pending jobs now instead of waiting for the microtask flush.
pub fn flush_sync() {
    let pending = with(|s| s.scheduled || !s.queue.is_empty());
    if pending {
        flush_jobs();
    }
}

/// Whether an atomic scope is open on this thread.
pub fn in_atomic() -> bool {
    with(|s| s.atomic_depth > 0)
}

/// Record a signal's previous value into the innermost atomic log.
///
/// No-op outside an atomic scope, and for nodes the scope has already
/// seen. `restore` must write the previous value back without invoking
/// any equality gate or notification. Exposed for state-cell
/// implementations; not intended for application code.
pub fn record_atomic_write(node: NodeId, restore: Box<dyn FnOnce()>) {
    with(|s| {
        if let Some(log) = s.atomic_logs.last_mut() {
            log.record(node, restore);
        }
    });
}

/// Defer flushing until `f` returns.
///
/// Effects scheduled inside the batch run at most once, synchronously at
/// batch exit, and observe the batch's final values. Batches nest; only
/// the outermost exit flushes.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let _guard = BatchGuard::enter();
    f()
}

struct BatchGuard;

impl BatchGuard {
    fn enter() -> Self {
        with(|s| s.batch_depth += 1);
        BatchGuard
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let flush = with(|s| {
            s.batch_depth -= 1;
            s.batch_depth == 0
        });
        // Depth is rebalanced even when unwinding, but the flush waits
        // for the next microtask then: running user effects from a Drop
        // during a panic risks an abort on a second panic.
        if flush && !std::thread::panicking() {
            flush_jobs();
        }
    }
}

/// Run `f` in an atomic scope: a batch whose writes are undone if `f`
/// fails.
///
/// On `Ok` the scope commits and, if it was the outermost scope, flushes
/// synchronously. On `Err` every signal written inside the scope is
/// restored to its pre-scope value, downstream computed values are
/// re-invalidated, pending effects are discarded unrun, and the error is
/// returned unchanged. A panic inside `f` rolls back the same way
/// before propagating.
///
/// Scopes nest: a committed inner scope folds its log into the outer
/// one, so an outer rollback still restores pre-outermost values.
pub fn atomic<T, E>(f: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
    let scope = AtomicScope::enter();
    match f() {
        Ok(value) => {
            scope.commit();
            Ok(value)
        }
        Err(err) => {
            scope.rollback();
            Err(err)
        }
    }
}

/// Alias for [`atomic`].
pub fn transaction<T, E>(f: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
    atomic(f)
}

/// Atomic scope spanning an async computation.
///
/// The scope opens when the returned future is first polled and settles
/// with the future: commit on `Ok`, rollback on `Err`, and rollback if
/// the future is dropped before completing. Writes made by other code
/// interleaved on the same thread during an await land in this scope's
/// log; see the crate docs for the interleaving contract. The returned
/// future is intentionally `!Send`: the scope lives in thread-local
/// state and must be polled where it was created.
pub async fn atomic_async<T, E, F>(fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    let scope = AtomicScope::enter();
    match fut.await {
        Ok(value) => {
            scope.commit();
            Ok(value)
        }
        Err(err) => {
            scope.rollback();
            Err(err)
        }
    }
}

/// Open atomic scope. Rolls back from `Drop` unless settled explicitly,
/// which covers both panics and cancelled futures.
struct AtomicScope {
    settled: bool,
    // Thread-local scope state; keep the owning future off other threads.
    _not_send: PhantomData<*const ()>,
}

impl AtomicScope {
    fn enter() -> Self {
        with(|s| {
            s.batch_depth += 1;
            s.atomic_depth += 1;
            s.atomic_logs.push(WriteLog::new());
        });
        Self {
            settled: false,
            _not_send: PhantomData,
        }
    }

    fn commit(mut self) {
        self.settled = true;
        exit_commit();
    }

    fn rollback(mut self) {
        self.settled = true;
        exit_rollback();
    }
}

impl Drop for AtomicScope {
    fn drop(&mut self) {
        if !self.settled {
            exit_rollback();
        }
    }
}

fn exit_commit() {
    let flush = with(|s| {
        let log = s.atomic_logs.pop().expect("atomic log stack out of balance");
        s.atomic_depth -= 1;
        if let Some(parent) = s.atomic_logs.last_mut() {
            log.merge_into(parent);
        }
        s.batch_depth -= 1;
        s.batch_depth == 0
    });
    if flush && !std::thread::panicking() {
        flush_jobs();
    }
}

fn exit_rollback() {
    let log = with(|s| {
        let log = s.atomic_logs.pop().expect("atomic log stack out of balance");
        s.atomic_depth -= 1;
        s.muted += 1;
        log
    });

    // Restore every first-seen value, then re-invalidate downstream
    // computed values. The muted counter keeps these propagations from
    // scheduling effects: nothing downstream may observe the scope's
    // intermediate state.
    let restored: Vec<NodeId> = log.entries.iter().map(|(node, _)| *node).collect();
    for (_, restore) in log.entries {
        restore();
    }
    for node in &restored {
        runtime::notify_changed(*node);
    }

    let discarded = with(|s| {
        let discarded = std::mem::take(&mut s.queue);
        s.queued_ids.clear();
        s.scheduled = false;
        s.muted -= 1;
        s.batch_depth -= 1;
        discarded
    });
    // Dropped outside the borrow; a job's drop glue may touch the graph.
    drop(discarded);

    tracing::debug!(
        restored = restored.len(),
        "atomic scope rolled back; pending jobs discarded"
    );
}

//! Microtask Queue
//!
//! The scheduler coalesces effect runs by posting a single flush
//! callback "at the end of the current task". Rust has no ambient
//! microtask queue, so this module provides one: a thread-local FIFO
//! drained by [`run_microtasks`], which hosts call at their natural
//! yield points and tests call to drive flushes deterministically.
//!
//! A host with a real run loop can install a [`MicrotaskDriver`] to
//! forward posts to it instead.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

type Task = Box<dyn FnOnce()>;

/// Destination for posted tasks when the built-in queue is not used.
///
/// Implementations must run each task before the host's next macrotask,
/// after the currently executing synchronous block completes.
pub trait MicrotaskDriver {
    /// Accept a task for deferred execution.
    fn post(&self, task: Box<dyn FnOnce()>);
}

thread_local! {
    static QUEUE: RefCell<VecDeque<Task>> = RefCell::new(VecDeque::new());
    static DRIVER: RefCell<Option<Rc<dyn MicrotaskDriver>>> = RefCell::new(None);
}

/// Install a driver for this thread, replacing the built-in queue.
pub fn set_microtask_driver(driver: Rc<dyn MicrotaskDriver>) {
    DRIVER.with(|slot| *slot.borrow_mut() = Some(driver));
}

/// Restore the built-in thread-local queue.
pub fn clear_microtask_driver() {
    DRIVER.with(|slot| *slot.borrow_mut() = None);
}

/// Post a task to the current thread's microtask destination.
pub(crate) fn post(task: Task) {
    let driver = DRIVER.with(|slot| slot.borrow().clone());
    match driver {
        Some(driver) => driver.post(task),
        None => QUEUE.with(|queue| queue.borrow_mut().push_back(task)),
    }
}

/// Drain the built-in queue to quiescence.
///
/// Tasks posted while draining run in the same call, FIFO. Does nothing
/// when a custom driver is installed (the driver owns execution then).
pub fn run_microtasks() {
    loop {
        let task = QUEUE.with(|queue| queue.borrow_mut().pop_front());
        match task {
            Some(task) => task(),
            None => break,
        }
    }
}

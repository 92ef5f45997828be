//! Deadlock detection for [`crate::Future::stall_while_pending`].
//!
//! Each thread keeps a stack of the futures it is currently in the middle
//! of resolving (by identity, a stable address taken before any `Arc` is
//! dropped). Entering a `stall_while_pending` call that would recurse back
//! onto a future already on this thread's stack — directly, or transitively
//! through a `WhenAll` continuation — returns `DeadlockDetected` instead of
//! blocking forever.

use std::cell::RefCell;

thread_local! {
    static RESOLUTION_STACK: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

#[must_use]
pub fn is_resolving(identity: usize) -> bool {
    RESOLUTION_STACK.with(|stack| stack.borrow().contains(&identity))
}

/// RAII marker pushed onto the calling thread's resolution stack for the
/// duration of a `stall_while_pending` call (and any continuation work it
/// drives synchronously).
pub struct ResolutionMoment;

impl ResolutionMoment {
    pub fn enter(identity: usize) -> Self {
        RESOLUTION_STACK.with(|stack| stack.borrow_mut().push(identity));
        Self
    }
}

impl Drop for ResolutionMoment {
    fn drop(&mut self) {
        RESOLUTION_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

//! Double-buffered asset futures.
//!
//! Resolution writes into a back buffer; publication to the front buffer
//! that readers see happens only on a [`FrameBarrier`](crate::FrameBarrier)
//! sweep (or immediately, for [`Future::set_asset_foreground`]). Once the
//! front buffer is set it never changes again: a `Future` resolves exactly
//! once, matching the "no re-resolution" invariant.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex};
use rg_depval::{DependencyValidation, HasDepVal};

use crate::deadlock::ResolutionMoment;
use crate::error::AssetError;
use crate::frame_barrier::{BarrierParticipant, FrameBarrier};

/// The three states an asset future can be observed in. `Ready` and
/// `Invalid` are both terminal: a future resolves exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetState {
    Pending,
    Ready,
    Invalid,
}

/// A snapshot of a future's front buffer, borrowed for the duration of the
/// call. Distinct from [`AssetState`] in that it also hands back the
/// resolved value or invalid-state diagnostics.
pub enum Peek<'a, T> {
    Pending,
    Ready(&'a T),
    Invalid {
        depval: DependencyValidation,
        log: String,
    },
}

/// A type-erased, reusable step of asynchronous resolution work.
///
/// Implementations are expected to call [`Future::set_asset`] or
/// [`Future::set_invalid_asset`] on `future` when they have an answer, and
/// return `true` while more polling is needed, `false` once done (whether
/// or not an answer was actually produced this call).
pub trait PollFn<T>: Send {
    fn poll(&mut self, future: &Future<T>) -> bool;
}

impl<T, F> PollFn<T> for F
where
    F: FnMut(&Future<T>) -> bool + Send,
{
    fn poll(&mut self, future: &Future<T>) -> bool {
        self(future)
    }
}

struct FrontSlot<T> {
    state: AssetState,
    value: Option<T>,
    depval: DependencyValidation,
    log: String,
}

struct BackSlot<T> {
    state: AssetState,
    value: Option<T>,
    depval: DependencyValidation,
    log: String,
    poll_fn: Option<Box<dyn PollFn<T>>>,
}

impl<T> BackSlot<T> {
    fn pending() -> Self {
        Self {
            state: AssetState::Pending,
            value: None,
            depval: DependencyValidation::empty(),
            log: String::new(),
            poll_fn: None,
        }
    }
}

/// An asset resolved asynchronously: either still pending, resolved to a
/// value, or resolved to an invalid state with a depval describing what to
/// watch before retrying and a human-readable log explaining why.
///
/// Always held behind [`FutureHandle`]; construct with [`FutureHandle::new`].
pub struct Future<T: HasDepVal> {
    front: OnceCell<FrontSlot<T>>,
    back: Mutex<BackSlot<T>>,
    condvar: Condvar,
    initializer: String,
    barrier: Arc<FrameBarrier>,
    barrier_marker: Mutex<Option<u64>>,
    self_weak: Weak<Future<T>>,
    foreground: AtomicBool,
}

impl<T: HasDepVal> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("initializer", &self.initializer)
            .field("state", &self.asset_state())
            .finish()
    }
}

/// A cheaply-clonable handle to a [`Future`].
pub struct FutureHandle<T: HasDepVal>(Arc<Future<T>>);

impl<T: HasDepVal> Clone for FutureHandle<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: HasDepVal> std::ops::Deref for FutureHandle<T> {
    type Target = Future<T>;
    fn deref(&self) -> &Future<T> {
        &self.0
    }
}

impl<T: HasDepVal + Send + Sync + 'static> FutureHandle<T> {
    /// Builds a new, pending future registered against `barrier`.
    /// `initializer` names what is being resolved, for diagnostics.
    #[must_use]
    pub fn new(initializer: impl Into<String>, barrier: Arc<FrameBarrier>) -> Self {
        let arc = Arc::new_cyclic(|weak| Future {
            front: OnceCell::new(),
            back: Mutex::new(BackSlot::pending()),
            condvar: Condvar::new(),
            initializer: initializer.into(),
            barrier,
            barrier_marker: Mutex::new(None),
            self_weak: weak.clone(),
            foreground: AtomicBool::new(false),
        });
        Self(arc)
    }

    /// Builds a future that is immediately ready, bypassing the back
    /// buffer and the frame barrier entirely.
    #[must_use]
    pub fn ready(initializer: impl Into<String>, barrier: Arc<FrameBarrier>, value: T) -> Self {
        let handle = Self::new(initializer, barrier);
        handle.set_asset_foreground(value, String::new());
        handle
    }

    #[must_use]
    pub fn as_arc(&self) -> Arc<Future<T>> {
        self.0.clone()
    }
}

impl<T: HasDepVal + Send + Sync + 'static> Future<T> {
    pub(crate) fn identity(&self) -> usize {
        std::ptr::addr_of!(*self) as usize
    }

    #[must_use]
    pub fn initializer(&self) -> &str {
        &self.initializer
    }

    #[must_use]
    pub fn asset_state(&self) -> AssetState {
        self.front.get().map_or(AssetState::Pending, |s| s.state)
    }

    #[must_use]
    pub fn peek(&self) -> Peek<'_, T> {
        match self.front.get() {
            None => Peek::Pending,
            Some(slot) => match slot.state {
                AssetState::Ready => Peek::Ready(slot.value.as_ref().expect("ready slot carries a value")),
                AssetState::Invalid => Peek::Invalid {
                    depval: slot.depval.clone(),
                    log: slot.log.clone(),
                },
                AssetState::Pending => unreachable!("front buffer is never published while pending"),
            },
        }
    }

    /// Returns the value if ready, `None` if pending or invalid.
    pub fn try_actualize(&self) -> Option<&T> {
        match self.peek() {
            Peek::Ready(value) => Some(value),
            Peek::Pending | Peek::Invalid { .. } => None,
        }
    }

    /// Returns the value, or an error describing why there isn't one yet.
    pub fn actualize(&self) -> Result<&T, AssetError> {
        match self.peek() {
            Peek::Ready(value) => Ok(value),
            Peek::Pending => Err(AssetError::PendingAsset {
                initializer: self.initializer.clone(),
            }),
            Peek::Invalid { depval, log } => Err(AssetError::InvalidAsset {
                initializer: self.initializer.clone(),
                depval,
                log,
            }),
        }
    }

    fn register_with_barrier(&self) {
        let mut marker = self.barrier_marker.lock();
        if marker.is_some() {
            return;
        }
        let weak_dyn: Weak<dyn BarrierParticipant> = self.self_weak.clone();
        *marker = Some(self.barrier.register_weak(weak_dyn));
    }

    fn deregister_from_barrier(&self) {
        if let Some(marker) = self.barrier_marker.lock().take() {
            self.barrier.deregister(marker);
        }
    }

    fn publish_locked(&self, back: &mut BackSlot<T>) {
        debug_assert_ne!(back.state, AssetState::Pending);
        if self.front.get().is_some() {
            return;
        }
        let slot = FrontSlot {
            state: back.state,
            value: back.value.take(),
            depval: back.depval.clone(),
            log: std::mem::take(&mut back.log),
        };
        let _ = self.front.set(slot);
        self.condvar.notify_all();
    }

    /// Resolves the future to a value. The value's own [`HasDepVal::dep_val`]
    /// becomes the future's depval. Publication happens on the next frame
    /// barrier sweep.
    pub fn set_asset(&self, value: T, log: impl Into<String>) {
        let depval = value.dep_val();
        {
            let mut back = self.back.lock();
            back.value = Some(value);
            back.depval = depval;
            back.log = log.into();
            back.state = AssetState::Ready;
        }
        self.register_with_barrier();
        self.condvar.notify_all();
    }

    /// Resolves the future to an invalid state. `depval` should describe
    /// what, once changed, is worth retrying resolution over.
    pub fn set_invalid_asset(&self, depval: DependencyValidation, log: impl Into<String>) {
        {
            let mut back = self.back.lock();
            back.value = None;
            back.depval = depval;
            back.log = log.into();
            back.state = AssetState::Invalid;
        }
        self.register_with_barrier();
        self.condvar.notify_all();
    }

    /// Resolves and publishes immediately, bypassing the frame barrier.
    /// Intended for values already known at construction time.
    pub fn set_asset_foreground(&self, value: T, log: impl Into<String>) {
        self.foreground.store(true, Ordering::Release);
        let depval = value.dep_val();
        let slot = FrontSlot {
            state: AssetState::Ready,
            value: Some(value),
            depval,
            log: log.into(),
        };
        let _ = self.front.set(slot);
        self.deregister_from_barrier();
        self.condvar.notify_all();
    }

    /// Installs a polling function, invoking it once immediately. If it
    /// resolves synchronously (returns `false` having already called
    /// `set_asset`/`set_invalid_asset`), publication happens right away
    /// rather than waiting for a frame barrier.
    pub fn set_polling_function(&self, mut poll_fn: Box<dyn PollFn<T>>) {
        let still_pending = poll_fn.poll(self);
        if still_pending {
            let mut back = self.back.lock();
            back.poll_fn = Some(poll_fn);
            drop(back);
            self.register_with_barrier();
            return;
        }

        let mut back = self.back.lock();
        if back.state != AssetState::Pending {
            self.publish_locked(&mut back);
            drop(back);
            self.deregister_from_barrier();
        }
    }

    fn run_frame_barrier_step(&self) {
        if self.front.get().is_some() {
            self.deregister_from_barrier();
            return;
        }

        let taken = { self.back.lock().poll_fn.take() };

        if let Some(mut poll_fn) = taken {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| poll_fn.poll(self)));
            let mut back = self.back.lock();
            match outcome {
                Ok(true) => back.poll_fn = Some(poll_fn),
                Ok(false) => {}
                Err(_) => {
                    back.state = AssetState::Invalid;
                    back.value = None;
                    back.log = format!("polling function for '{}' panicked", self.initializer);
                    back.depval = DependencyValidation::empty();
                }
            }
        }

        let mut back = self.back.lock();
        if back.state != AssetState::Pending {
            self.publish_locked(&mut back);
        }
        if back.poll_fn.is_none() {
            drop(back);
            self.deregister_from_barrier();
        }
    }

    /// Blocks the calling thread until the future resolves or `timeout`
    /// elapses, driving any installed polling function synchronously in
    /// the meantime. `timeout` of [`Duration::ZERO`] checks once without
    /// blocking.
    ///
    /// Returns [`AssetError::DeadlockDetected`] instead of blocking if this
    /// thread is already in the middle of resolving this same future
    /// (directly or transitively through a `WhenAll` chain).
    pub fn stall_while_pending(&self, timeout: Duration) -> Result<StallOutcome, AssetError> {
        if crate::deadlock::is_resolving(self.identity()) {
            return Err(AssetError::DeadlockDetected {
                initializer: self.initializer.clone(),
            });
        }

        if self.front.get().is_some() {
            return Ok(StallOutcome::Resolved(self.asset_state()));
        }

        let _moment = ResolutionMoment::enter(self.identity());
        let deadline = if timeout.is_zero() {
            None
        } else {
            Some(Instant::now() + timeout)
        };

        const QUANTUM: Duration = Duration::from_micros(50);

        loop {
            let taken = { self.back.lock().poll_fn.take() };
            if let Some(mut poll_fn) = taken {
                let still_pending =
                    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| poll_fn.poll(self)))
                        .unwrap_or(false);
                let mut back = self.back.lock();
                if still_pending {
                    back.poll_fn = Some(poll_fn);
                }
            }

            {
                let mut back = self.back.lock();
                if back.state != AssetState::Pending {
                    self.publish_locked(&mut back);
                    drop(back);
                    self.deregister_from_barrier();
                    return Ok(StallOutcome::Resolved(self.asset_state()));
                }
            }

            match deadline {
                None => return Ok(StallOutcome::TimedOut),
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return Ok(StallOutcome::TimedOut);
                    }
                    let mut back = self.back.lock();
                    if back.state == AssetState::Pending {
                        self.condvar.wait_for(&mut back, QUANTUM);
                    }
                }
            }
        }
    }
}

impl<T: HasDepVal + Send + Sync + 'static> BarrierParticipant for Future<T> {
    fn on_frame_barrier(&self) {
        self.run_frame_barrier_step();
    }
}

/// The result of [`Future::stall_while_pending`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallOutcome {
    Resolved(AssetState),
    TimedOut,
}

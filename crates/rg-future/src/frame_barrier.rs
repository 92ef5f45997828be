//! Frame-barrier publication.
//!
//! A [`Future`](crate::Future) resolved on a background thread does not
//! publish its value the instant it is known: it sits in the back buffer
//! until the next [`FrameBarrier::run_once`] sweep, so every reader within a
//! frame sees a single consistent snapshot instead of a future flipping
//! under them mid-frame. Futures register themselves weakly and deregister
//! once published (or once resolved via [`crate::Future::set_asset_foreground`],
//! which bypasses the barrier entirely).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

use parking_lot::Mutex;

/// Anything that wants a callback on each frame-barrier sweep while it has
/// unpublished work pending.
pub trait BarrierParticipant: Send + Sync {
    fn on_frame_barrier(&self);
}

/// A registry of weakly-held participants, swept once per frame.
///
/// Held by whatever owns the asset pipeline for a frame (a `Core`, or a
/// test harness) and threaded explicitly into every [`crate::Future`] at
/// construction, rather than reached through a process-wide global.
#[derive(Default)]
pub struct FrameBarrier {
    participants: Mutex<HashMap<u64, Weak<dyn BarrierParticipant>>>,
    next_id: AtomicU64,
}

impl FrameBarrier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a participant, returning a marker to later [`Self::deregister`] it.
    pub fn register_weak(&self, participant: Weak<dyn BarrierParticipant>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.participants.lock().insert(id, participant);
        id
    }

    pub fn deregister(&self, marker: u64) {
        self.participants.lock().remove(&marker);
    }

    /// Visits every still-live participant once. Participants whose strong
    /// handle has since been dropped are pruned instead of visited.
    pub fn run_once(&self) {
        let span = tracing::trace_span!("frame_barrier_sweep");
        let _enter = span.enter();

        let snapshot: Vec<(u64, Weak<dyn BarrierParticipant>)> = {
            let participants = self.participants.lock();
            participants.iter().map(|(id, p)| (*id, p.clone())).collect()
        };

        let mut dead = Vec::new();
        for (id, participant) in snapshot {
            match participant.upgrade() {
                Some(p) => p.on_frame_barrier(),
                None => dead.push(id),
            }
        }
        if !dead.is_empty() {
            let mut participants = self.participants.lock();
            for id in dead {
                participants.remove(&id);
            }
        }
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.participants.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct Counter(AtomicUsize);
    impl BarrierParticipant for Counter {
        fn on_frame_barrier(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn sweep_visits_every_live_participant() {
        let barrier = FrameBarrier::new();
        let a = Arc::new(Counter(AtomicUsize::new(0)));
        let b = Arc::new(Counter(AtomicUsize::new(0)));
        barrier.register_weak(Arc::downgrade(&a) as Weak<dyn BarrierParticipant>);
        barrier.register_weak(Arc::downgrade(&b) as Weak<dyn BarrierParticipant>);

        barrier.run_once();

        assert_eq!(a.0.load(Ordering::SeqCst), 1);
        assert_eq!(b.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_participant_is_pruned_without_panicking() {
        let barrier = FrameBarrier::new();
        {
            let a = Arc::new(Counter(AtomicUsize::new(0)));
            barrier.register_weak(Arc::downgrade(&a) as Weak<dyn BarrierParticipant>);
        }
        assert_eq!(barrier.pending_count(), 1);
        barrier.run_once();
        assert_eq!(barrier.pending_count(), 0);
    }

    #[test]
    fn deregister_stops_future_sweeps() {
        let barrier = FrameBarrier::new();
        let a = Arc::new(Counter(AtomicUsize::new(0)));
        let marker = barrier.register_weak(Arc::downgrade(&a) as Weak<dyn BarrierParticipant>);
        barrier.deregister(marker);
        barrier.run_once();
        assert_eq!(a.0.load(Ordering::SeqCst), 0);
    }
}

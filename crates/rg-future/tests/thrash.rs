//! End-to-end thrash scenario: spawn a large number of futures with
//! randomized construction delays and invalidity, abandon a small
//! fraction, and check that every non-abandoned future reaches a
//! terminal state with no deadlock ever raised from the driving thread.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

use rg_depval::{DependencyValidation, Plain};
use rg_future::{AssetError, AssetState, FrameBarrier, FutureHandle};

const COUNT: usize = 10_000;

#[test]
fn thrash_many_futures_all_terminate_without_deadlock() {
    let barrier = Arc::new(FrameBarrier::new());
    let rng = Arc::new(Mutex::new(StdRng::seed_from_u64(0x5eed_dead_beef)));

    // Indices whose handle we intentionally drop without ever driving
    // them: abandonment by all consumers is the expected cancellation
    // path, so these must not cause anything else to hang.
    let abandoned: Vec<bool> = (0..COUNT)
        .map(|_| rng.lock().unwrap().gen_bool(0.01))
        .collect();

    let mut handles: Vec<Option<FutureHandle<Plain<u32>>>> = Vec::with_capacity(COUNT);
    for i in 0..COUNT {
        let handle = FutureHandle::<Plain<u32>>::new(format!("thrash-{i}"), barrier.clone());

        let invalid = rng.lock().unwrap().gen_bool(0.5);
        let polls_needed = rng.lock().unwrap().gen_range(0..4u32);
        let calls = AtomicU32::new(0);

        handle.set_polling_function(Box::new(move |future| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < polls_needed {
                return true;
            }
            if invalid {
                future.set_invalid_asset(DependencyValidation::watching(["thrash.input"]), "thrash invalid");
            } else {
                future.set_asset(Plain(n), "thrash resolved");
            }
            false
        }));

        handles.push(if abandoned[i] { None } else { Some(handle) });
    }

    let deadlocks = Arc::new(AtomicUsize::new(0));
    let worker_count = std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get);
    let chunk_size = (COUNT + worker_count - 1) / worker_count;

    std::thread::scope(|scope| {
        for chunk in handles.chunks_mut(chunk_size) {
            let deadlocks = deadlocks.clone();
            scope.spawn(move || {
                for slot in chunk.iter() {
                    let Some(handle) = slot else { continue };
                    match handle.stall_while_pending(Duration::from_millis(200)) {
                        Ok(_) => {}
                        Err(AssetError::DeadlockDetected { .. }) => {
                            deadlocks.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(other) => panic!("unexpected error driving thrash future: {other}"),
                    }
                }
            });
        }
    });

    assert_eq!(deadlocks.load(Ordering::SeqCst), 0, "no thread should deadlock on its own futures");

    for (i, slot) in handles.iter().enumerate() {
        let Some(handle) = slot else { continue };
        assert_ne!(
            handle.asset_state(),
            AssetState::Pending,
            "future {i} should have reached a terminal state"
        );
    }
}

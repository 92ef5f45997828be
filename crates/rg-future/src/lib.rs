//! Asset futures, frame-barrier publication and `WhenAll` continuations.
//!
//! This crate is the concurrency substrate the rest of the asset core is
//! built on: a [`Future<T>`] is a double-buffered, cooperatively-polled
//! promise for a `T` that publishes at a frame barrier; [`continuation`]
//! composes several of them into a downstream future via a user
//! continuation function.

pub mod continuation;
mod deadlock;
pub mod error;
pub mod frame_barrier;
pub mod future;

pub use error::AssetError;
pub use frame_barrier::{BarrierParticipant, FrameBarrier};
pub use future::{AssetState, Future, FutureHandle, Peek, PollFn, StallOutcome};

//! `WhenAll` continuations: await a tuple of futures, run a continuation
//! once every input is `Ready`, and publish the result to a downstream
//! future.
//!
//! Rather than a variadic generic, fixed-arity tuple structs cover the
//! arities actually used by callers (2 through 8), plus [`WhenAllDyn`] for
//! a runtime-determined, homogeneously-typed collection.

use std::sync::Arc;

use rg_depval::{DependencyValidation, HasDepVal};

use crate::error::AssetError;
use crate::frame_barrier::{BarrierParticipant, FrameBarrier};
use crate::future::{Future, FutureHandle, Peek};

fn subasset_failure_log(index: usize, log: &str) -> String {
    let detail = if log.is_empty() { "<<no log>>" } else { log };
    format!("Failed to actualize subasset number ({index}): {detail}")
}

/// Generates a `WhenAllN<T0, T1, ...>` tuple struct plus its `then` and
/// `then_chained` methods.
///
/// `$t` are the struct's generic type parameters; `$v` are distinct
/// lowercase identifiers used only as `new`'s parameter names and local
/// variables, so they never collide with the type parameters; `$idx` is
/// the matching tuple index.
macro_rules! define_when_all {
    ($struct_name:ident, $doc:literal, [$(($t:ident, $v:ident, $idx:tt)),+ $(,)?]) => {
        #[doc = $doc]
        pub struct $struct_name<$($t: HasDepVal + Send + Sync + 'static),+>($(pub FutureHandle<$t>),+);

        impl<$($t: HasDepVal + Send + Sync + 'static),+> $struct_name<$($t),+> {
            #[must_use]
            pub fn new($($v: FutureHandle<$t>),+) -> Self {
                Self($($v),+)
            }

            /// Awaits every input, then runs `continuation` once against
            /// the actualized values, publishing its result (or
            /// propagating the first invalid input) to the returned
            /// future.
            pub fn then<U, K>(
                self,
                initializer: impl Into<String>,
                barrier: Arc<FrameBarrier>,
                mut continuation: K,
            ) -> FutureHandle<U>
            where
                U: HasDepVal + Send + Sync + 'static,
                K: FnMut($($t),+) -> Result<U, AssetError> + Send + 'static,
                $($t: Clone,)+
            {
                let output = FutureHandle::<U>::new(initializer, barrier);
                let this = self;
                let poll_fn = move |future: &Future<U>| -> bool {
                    let mut first_invalid: Option<(DependencyValidation, String)> = None;
                    let mut any_pending = false;
                    $(
                        this.$idx.on_frame_barrier();
                        match this.$idx.peek() {
                            Peek::Pending => any_pending = true,
                            Peek::Invalid { depval, log } => {
                                if first_invalid.is_none() {
                                    first_invalid = Some((depval, subasset_failure_log($idx, &log)));
                                }
                            }
                            Peek::Ready(_) => {}
                        }
                    )+
                    if let Some((depval, log)) = first_invalid {
                        future.set_invalid_asset(depval, log);
                        return false;
                    }
                    if any_pending {
                        return true;
                    }
                    let _moment = crate::deadlock::ResolutionMoment::enter(future.identity());
                    let result = continuation(
                        $(this.$idx.try_actualize().expect("checked ready above").clone()),+
                    );
                    match result {
                        Ok(value) => future.set_asset(value, String::new()),
                        Err(err) => future.set_invalid_asset(err.depval(), err.log()),
                    }
                    false
                };
                output.set_polling_function(Box::new(poll_fn));
                output
            }

            /// Like [`Self::then`], but `continuation` receives the
            /// output future itself and is responsible for resolving it
            /// (directly, or by installing a further polling function
            /// for chained asynchrony). Used when the continuation's
            /// result is itself only available asynchronously.
            pub fn then_chained<U, K>(
                self,
                initializer: impl Into<String>,
                barrier: Arc<FrameBarrier>,
                mut continuation: K,
            ) -> FutureHandle<U>
            where
                U: HasDepVal + Send + Sync + 'static,
                K: FnMut(&Future<U>, $($t),+) + Send + 'static,
                $($t: Clone,)+
            {
                let output = FutureHandle::<U>::new(initializer, barrier);
                let this = self;
                let poll_fn = move |future: &Future<U>| -> bool {
                    let mut first_invalid: Option<(DependencyValidation, String)> = None;
                    let mut any_pending = false;
                    $(
                        this.$idx.on_frame_barrier();
                        match this.$idx.peek() {
                            Peek::Pending => any_pending = true,
                            Peek::Invalid { depval, log } => {
                                if first_invalid.is_none() {
                                    first_invalid = Some((depval, subasset_failure_log($idx, &log)));
                                }
                            }
                            Peek::Ready(_) => {}
                        }
                    )+
                    if let Some((depval, log)) = first_invalid {
                        future.set_invalid_asset(depval, log);
                        return false;
                    }
                    if any_pending {
                        return true;
                    }
                    let _moment = crate::deadlock::ResolutionMoment::enter(future.identity());
                    continuation(
                        future,
                        $(this.$idx.try_actualize().expect("checked ready above").clone()),+
                    );
                    false
                };
                output.set_polling_function(Box::new(poll_fn));
                output
            }
        }
    };
}

define_when_all!(WhenAll2, "Awaits two futures.", [(A, a, 0), (B, b, 1)]);
define_when_all!(WhenAll3, "Awaits three futures.", [(A, a, 0), (B, b, 1), (C, c, 2)]);
define_when_all!(
    WhenAll4,
    "Awaits four futures.",
    [(A, a, 0), (B, b, 1), (C, c, 2), (D, d, 3)]
);
define_when_all!(
    WhenAll5,
    "Awaits five futures.",
    [(A, a, 0), (B, b, 1), (C, c, 2), (D, d, 3), (E, e, 4)]
);
define_when_all!(
    WhenAll6,
    "Awaits six futures.",
    [(A, a, 0), (B, b, 1), (C, c, 2), (D, d, 3), (E, e, 4), (F, f, 5)]
);
define_when_all!(
    WhenAll7,
    "Awaits seven futures.",
    [
        (A, a, 0),
        (B, b, 1),
        (C, c, 2),
        (D, d, 3),
        (E, e, 4),
        (F, f, 5),
        (G, g, 6)
    ]
);
define_when_all!(
    WhenAll8,
    "Awaits eight futures.",
    [
        (A, a, 0),
        (B, b, 1),
        (C, c, 2),
        (D, d, 3),
        (E, e, 4),
        (F, f, 5),
        (G, g, 6),
        (H, h, 7)
    ]
);

/// Awaits a runtime-determined, homogeneously-typed collection of
/// futures. Used when the arity isn't known until runtime (e.g. one
/// future per dependency discovered during shader-graph instantiation),
/// beyond where the fixed-arity overloads are ergonomic.
pub struct WhenAllDyn<T: HasDepVal + Send + Sync + 'static> {
    inputs: Vec<FutureHandle<T>>,
}

impl<T: HasDepVal + Send + Sync + 'static> WhenAllDyn<T> {
    #[must_use]
    pub fn new(inputs: Vec<FutureHandle<T>>) -> Self {
        Self { inputs }
    }

    pub fn then<U, K>(self, initializer: impl Into<String>, barrier: Arc<FrameBarrier>, mut continuation: K) -> FutureHandle<U>
    where
        U: HasDepVal + Send + Sync + 'static,
        T: Clone,
        K: FnMut(Vec<T>) -> Result<U, AssetError> + Send + 'static,
    {
        let output = FutureHandle::<U>::new(initializer, barrier);
        let inputs = self.inputs;
        let poll_fn = move |future: &Future<U>| -> bool {
            let mut first_invalid: Option<(DependencyValidation, String)> = None;
            let mut any_pending = false;
            for (idx, input) in inputs.iter().enumerate() {
                input.on_frame_barrier();
                match input.peek() {
                    Peek::Pending => any_pending = true,
                    Peek::Invalid { depval, log } => {
                        if first_invalid.is_none() {
                            first_invalid = Some((depval, subasset_failure_log(idx, &log)));
                        }
                    }
                    Peek::Ready(_) => {}
                }
            }
            if let Some((depval, log)) = first_invalid {
                future.set_invalid_asset(depval, log);
                return false;
            }
            if any_pending {
                return true;
            }
            let values: Vec<T> = inputs
                .iter()
                .map(|input| input.try_actualize().expect("checked ready above").clone())
                .collect();
            let _moment = crate::deadlock::ResolutionMoment::enter(future.identity());
            match continuation(values) {
                Ok(value) => future.set_asset(value, String::new()),
                Err(err) => future.set_invalid_asset(err.depval(), err.log()),
            }
            false
        };
        output.set_polling_function(Box::new(poll_fn));
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rg_depval::Plain;

    fn barrier() -> Arc<FrameBarrier> {
        Arc::new(FrameBarrier::new())
    }

    #[test]
    fn all_ready_sums_values() {
        let b = barrier();
        let a = FutureHandle::<Plain<u32>>::new("a", b.clone());
        let bb = FutureHandle::<Plain<u32>>::new("b", b.clone());
        let c = FutureHandle::<Plain<u32>>::new("c", b.clone());
        a.set_asset_foreground(Plain(0), "");
        bb.set_asset_foreground(Plain(1), "");
        c.set_asset_foreground(Plain(2), "");

        let out = WhenAll3::new(a, bb, c).then("sum", b, |x, y, z| Ok(Plain(x.0 + y.0 + z.0)));
        assert_eq!(out.try_actualize().unwrap().0, 3);
    }

    #[test]
    fn invalid_input_propagates_with_indexed_log() {
        let b = barrier();
        let a = FutureHandle::<Plain<u32>>::new("a", b.clone());
        let bb = FutureHandle::<Plain<u32>>::new("b", b.clone());
        let c = FutureHandle::<Plain<u32>>::new("c", b.clone());
        a.set_asset_foreground(Plain(0), "");
        bb.set_invalid_asset(rg_depval::DependencyValidation::empty(), "bad input");
        c.set_asset_foreground(Plain(2), "");

        let out = WhenAll3::new(a, bb, c).then("sum", b, |x, y, z| Ok(Plain(x.0 + y.0 + z.0)));
        match out.peek() {
            Peek::Invalid { log, .. } => {
                assert_eq!(log, "Failed to actualize subasset number (1): bad input");
            }
            _ => panic!("expected invalid"),
        }
    }

    #[test]
    fn invalid_input_after_pending_input_still_propagates() {
        let b = barrier();
        let a = FutureHandle::<Plain<u32>>::new("a", b.clone());
        let bb = FutureHandle::<Plain<u32>>::new("b", b.clone());
        // `a` stays pending; `bb` is invalid. The output must still go
        // invalid rather than wait on `a`.
        bb.set_invalid_asset(rg_depval::DependencyValidation::empty(), "bad input");

        let out = WhenAll2::new(a, bb).then("sum", b, |x, y| Ok(Plain(x.0 + y.0)));
        match out.peek() {
            Peek::Invalid { log, .. } => {
                assert_eq!(log, "Failed to actualize subasset number (1): bad input");
            }
            _ => panic!("expected invalid"),
        }
    }

    #[test]
    fn pending_input_keeps_output_pending() {
        let b = barrier();
        let a = FutureHandle::<Plain<u32>>::new("a", b.clone());
        let bb = FutureHandle::<Plain<u32>>::new("b", b.clone());
        a.set_asset_foreground(Plain(1), "");
        // `bb` stays pending.

        let out = WhenAll2::new(a, bb.clone()).then("sum", b.clone(), |x, y| Ok(Plain(x.0 + y.0)));
        assert!(matches!(out.peek(), Peek::Pending));
        bb.set_asset(Plain(41), "");
        b.run_once();
        assert_eq!(out.try_actualize().unwrap().0, 42);
    }

    #[test]
    fn continuation_error_becomes_invalid() {
        let b = barrier();
        let a = FutureHandle::<Plain<u32>>::new("a", b.clone());
        a.set_asset_foreground(Plain(7), "");
        let out = WhenAll2::new(a, FutureHandle::<Plain<u32>>::ready("b", b.clone(), Plain(1))).then(
            "fails",
            b,
            |_x, _y| {
                Err(AssetError::ConstructionError {
                    message: "no good".into(),
                    depval: None,
                })
            },
        );
        match out.peek() {
            Peek::Invalid { log, .. } => assert_eq!(log, "construction failed: no good"),
            _ => panic!("expected invalid"),
        }
    }

    #[test]
    fn dyn_arity_awaits_all_inputs() {
        let b = barrier();
        let inputs: Vec<_> = (0..5)
            .map(|i| FutureHandle::<Plain<u32>>::ready(format!("n{i}"), b.clone(), Plain(i)))
            .collect();
        let out = WhenAllDyn::new(inputs).then("sum", b, |values| {
            Ok(Plain(values.iter().map(|p| p.0).sum::<u32>()))
        });
        assert_eq!(out.try_actualize().unwrap().0, 0 + 1 + 2 + 3 + 4);
    }
}

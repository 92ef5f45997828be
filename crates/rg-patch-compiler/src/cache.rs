//! A concurrent, single-flight cache of compiled patch collections keyed
//! by [`Fingerprint`].
//!
//! Uses the same `parking_lot::Mutex`-guarded map pattern as
//! `rg_depval::FileChangeRegistry`'s per-path cells: a short lock only
//! protects the map of slots, never the (potentially slow) compilation
//! itself. Concurrent callers asking for the same fingerprint
//! share one [`once_cell::sync::OnceCell`] slot, so only one of them
//! actually runs the compiler; the rest block on `get_or_try_init` until
//! it finishes.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use rg_shader_graph::Fingerprint;

use crate::compiled::CompiledShaderPatchCollection;
use crate::error::PatchCompilerError;

type Slot = Arc<OnceCell<Arc<CompiledShaderPatchCollection>>>;

#[derive(Default)]
pub struct PatchCollectionCache {
    entries: Mutex<HashMap<Fingerprint, Slot>>,
}

impl PatchCollectionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached collection for `fingerprint`, compiling it with
    /// `compile` if this is the first request for it (or if a previous
    /// attempt failed, since a failed compile never occupies the slot).
    pub fn get_or_compile(
        &self,
        fingerprint: Fingerprint,
        compile: impl FnOnce() -> Result<CompiledShaderPatchCollection, PatchCompilerError>,
    ) -> Result<Arc<CompiledShaderPatchCollection>, PatchCompilerError> {
        let slot = {
            let mut entries = self.entries.lock();
            entries.entry(fingerprint).or_insert_with(|| Arc::new(OnceCell::new())).clone()
        };

        if let Some(hit) = slot.get() {
            tracing::trace!(%fingerprint, "patch collection cache hit");
            return Ok(hit.clone());
        }

        tracing::trace!(%fingerprint, "patch collection cache miss, compiling");
        slot.get_or_try_init(|| compile().map(Arc::new)).cloned()
    }

    /// Drops the cached entry for `fingerprint`, if any, so the next
    /// request recompiles from scratch.
    pub fn invalidate(&self, fingerprint: Fingerprint) {
        self.entries.lock().remove(&fingerprint);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::compiled::CompiledShaderPatchCollection;

    #[test]
    fn second_request_for_same_fingerprint_does_not_recompile() {
        let cache = PatchCollectionCache::new();
        let calls = AtomicU32::new(0);
        let fp = Fingerprint(1);

        for _ in 0..3 {
            let result = cache.get_or_compile(fp, || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(CompiledShaderPatchCollection::default())
            });
            assert!(result.is_ok());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_compile_does_not_poison_the_slot() {
        let cache = PatchCollectionCache::new();
        let fp = Fingerprint(2);

        let first = cache.get_or_compile(fp, || Err(PatchCompilerError::EmptyCollection));
        assert!(first.is_err());

        let second = cache.get_or_compile(fp, || Ok(CompiledShaderPatchCollection::default()));
        assert!(second.is_ok());
    }

    #[test]
    fn invalidate_forces_recompile() {
        let cache = PatchCollectionCache::new();
        let calls = AtomicU32::new(0);
        let fp = Fingerprint(3);

        cache
            .get_or_compile(fp, || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(CompiledShaderPatchCollection::default())
            })
            .unwrap();
        cache.invalidate(fp);
        cache
            .get_or_compile(fp, || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(CompiledShaderPatchCollection::default())
            })
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}

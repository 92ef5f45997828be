//! Dependency validation handles (depvals).
//!
//! A [`DependencyValidation`] tracks a set of named dependencies (usually
//! file paths) and a monotonic validation index that strictly increases
//! whenever one of those dependencies is invalidated. Futures and compiled
//! shader patch collections carry a depval so that downstream consumers can
//! ask "has anything this depended on changed since I was built?" without
//! re-deriving the answer from scratch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

/// A single named, independently bumpable dependency.
#[derive(Debug, Clone)]
struct WatchEntry {
    path: Arc<str>,
    cell: Arc<AtomicU64>,
    baseline: u64,
}

#[derive(Debug)]
struct Inner {
    entries: Vec<WatchEntry>,
}

/// A cheaply-clonable handle describing what a cached or computed value
/// depends on, and whether any of those dependencies have changed.
///
/// Composition is `union`, and "has anything changed" is
/// `validation_index() > 0`.
#[derive(Debug, Clone)]
pub struct DependencyValidation(Arc<Inner>);

impl Default for DependencyValidation {
    fn default() -> Self {
        Self::empty()
    }
}

impl DependencyValidation {
    /// A depval with no watched dependencies. Never goes out of date.
    #[must_use]
    pub fn empty() -> Self {
        Self(Arc::new(Inner { entries: Vec::new() }))
    }

    /// Builds a depval watching the given paths through the global
    /// [`FileChangeRegistry`], capturing the registry's current generation
    /// for each as the baseline.
    pub fn watching<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FileChangeRegistry::global().build_depval(paths)
    }

    /// Union of two depvals' watched dependency sets. Where both watch the
    /// same path, the earlier (lower) baseline is kept, so a depval formed
    /// from an already-invalidated input stays invalidated.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut entries = self.0.entries.clone();
        for candidate in &other.0.entries {
            if let Some(existing) = entries.iter_mut().find(|e| e.path == candidate.path) {
                existing.baseline = existing.baseline.min(candidate.baseline);
            } else {
                entries.push(candidate.clone());
            }
        }
        Self(Arc::new(Inner { entries }))
    }

    /// The monotonic validation index: zero means nothing watched has
    /// changed since this depval was built; any positive value means at
    /// least one watched dependency changed at least once.
    #[must_use]
    pub fn validation_index(&self) -> u64 {
        self.0
            .entries
            .iter()
            .map(|e| e.cell.load(Ordering::Acquire).saturating_sub(e.baseline))
            .sum()
    }

    #[must_use]
    pub fn is_out_of_date(&self) -> bool {
        self.validation_index() > 0
    }

    /// The set of paths this depval watches, for diagnostics.
    pub fn watched_paths(&self) -> impl Iterator<Item = &str> {
        self.0.entries.iter().map(|e| e.path.as_ref())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.entries.is_empty()
    }

    /// Explicit "simulate change": bumps every dependency this depval
    /// watches, regardless of whether anything on disk actually changed.
    ///
    /// There is no file-system watcher in this crate to hang a richer
    /// semantics off of; callers that want a depval to look stale call
    /// this directly.
    pub fn bump(&self) {
        for entry in &self.0.entries {
            entry.cell.fetch_add(1, Ordering::AcqRel);
        }
    }
}

/// Types that can report a [`DependencyValidation`] describing what they
/// were built from. `Future<T>` requires `T: HasDepVal` so that resolved
/// assets contribute their own dependency information.
///
/// There is no blanket implementation for all `T` (that would require
/// specialization, which is not stable): payload types that don't carry a
/// depval of their own should be wrapped in [`Plain`].
pub trait HasDepVal {
    fn dep_val(&self) -> DependencyValidation;
}

/// Wraps a payload with no intrinsic dependency information so it can be
/// used as a `Future<T>` value type, e.g. `Future<Plain<u32>>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Plain<T>(pub T);

impl<T> HasDepVal for Plain<T> {
    fn dep_val(&self) -> DependencyValidation {
        DependencyValidation::empty()
    }
}

impl<T> From<T> for Plain<T> {
    fn from(value: T) -> Self {
        Plain(value)
    }
}

impl<T> std::ops::Deref for Plain<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0
    }
}

/// Process-wide registry of per-path change generations. Conceptually the
/// "global mutable state" the design notes call out; exposed explicitly
/// here (rather than only as a hidden static) so a `Core` can hold its own
/// registry in tests without cross-talking with the process default.
#[derive(Default)]
pub struct FileChangeRegistry {
    cells: Mutex<std::collections::HashMap<String, Arc<AtomicU64>>>,
}

static GLOBAL_REGISTRY: Lazy<FileChangeRegistry> = Lazy::new(FileChangeRegistry::default);

impl FileChangeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide default registry.
    pub fn global() -> &'static Self {
        &GLOBAL_REGISTRY
    }

    fn cell_for(&self, path: &str) -> Arc<AtomicU64> {
        let mut cells = self.cells.lock();
        cells
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone()
    }

    /// Builds a depval watching `paths` against this registry.
    pub fn build_depval<I, S>(&self, paths: I) -> DependencyValidation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = paths
            .into_iter()
            .map(|p| {
                let path: Arc<str> = Arc::from(p.into());
                let cell = self.cell_for(&path);
                let baseline = cell.load(Ordering::Acquire);
                WatchEntry {
                    path,
                    cell,
                    baseline,
                }
            })
            .collect();
        DependencyValidation(Arc::new(Inner { entries }))
    }

    /// Marks `path` as changed: every depval watching it (built before this
    /// call) observes a strictly larger `validation_index()` afterwards.
    pub fn touch(&self, path: &str) {
        let cell = self.cell_for(path);
        let previous = cell.fetch_add(1, Ordering::AcqRel);
        tracing::trace!(path, generation = previous + 1, "file change registered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_depval_is_not_out_of_date() {
        let registry = FileChangeRegistry::new();
        let depval = registry.build_depval(["a.txt", "b.txt"]);
        assert_eq!(depval.validation_index(), 0);
        assert!(!depval.is_out_of_date());
    }

    #[test]
    fn touch_invalidates_watchers() {
        let registry = FileChangeRegistry::new();
        let depval = registry.build_depval(["shader.graph"]);
        assert!(!depval.is_out_of_date());
        registry.touch("shader.graph");
        assert!(depval.is_out_of_date());
        assert_eq!(depval.validation_index(), 1);
    }

    #[test]
    fn touch_does_not_affect_unrelated_watchers() {
        let registry = FileChangeRegistry::new();
        let a = registry.build_depval(["a.txt"]);
        let b = registry.build_depval(["b.txt"]);
        registry.touch("a.txt");
        assert!(a.is_out_of_date());
        assert!(!b.is_out_of_date());
    }

    #[test]
    fn union_preserves_already_out_of_date_side() {
        let registry = FileChangeRegistry::new();
        let a = registry.build_depval(["a.txt"]);
        registry.touch("a.txt");
        let b = registry.build_depval(["b.txt"]);
        let merged = a.union(&b);
        assert!(merged.is_out_of_date());
        assert_eq!(merged.watched_paths().count(), 2);
    }

    #[test]
    fn explicit_bump_marks_stale_without_registry() {
        let depval = DependencyValidation::watching(["x.txt"]);
        assert!(!depval.is_out_of_date());
        depval.bump();
        assert!(depval.is_out_of_date());
    }

    #[test]
    fn empty_depval_never_out_of_date() {
        let depval = DependencyValidation::empty();
        depval.bump();
        assert!(!depval.is_out_of_date());
    }
}

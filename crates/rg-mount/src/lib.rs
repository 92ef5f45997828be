//! A prioritized, path-hashed virtual mounting tree.
//!
//! Mounts are tried highest-to-lowest priority (insertion order). A lookup
//! hashes the request path's leading segments one depth at a time, memoizes
//! the partial hashes as it goes, and compares against each mount's
//! precomputed hash. Mount/unmount bump a `change_id`; a lookup that spans
//! a yield point re-validates against the current `change_id` and reports
//! [`LookupOutcome::Invalidated`] if the tree changed underneath it, rather
//! than risk returning a candidate against a stale mount list.

mod error;
mod path;

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::ReentrantMutex;

pub use error::MountError;
pub use path::PathKind;

const INITIAL_SEED: u64 = 0;

fn hash_segment(seed: u64, segment: &str) -> u64 {
    xxhash_rust::xxh3::xxh3_64_with_seed(segment.as_bytes(), seed)
}

fn fold_hash(segments: &[String]) -> u64 {
    segments
        .iter()
        .fold(INITIAL_SEED, |acc, s| hash_segment(acc, s))
}

/// A mounted filesystem: translates a path relative to its mount point
/// into whatever marker the filesystem needs for subsequent load
/// operations. File-format parsing and actual I/O are out of scope here;
/// this trait only resolves "does this path exist under this mount, and
/// what do I call it once translated".
pub trait MountedFileSystem: Send + Sync {
    /// Attempts to translate `relative_path` (already stripped of the
    /// matched mount-point prefix) into a marker string the filesystem
    /// understands. Returns `None` if this filesystem has nothing at that
    /// path.
    fn try_translate(&self, relative_path: &str) -> Option<String>;
}

struct MountEntry {
    id: u64,
    depth: usize,
    hash: u64,
    mount_point: String,
    filesystem: Arc<dyn MountedFileSystem>,
}

struct TreeState {
    mounts: Vec<MountEntry>,
    change_id: u64,
    next_id: u64,
}

/// The result of a filesystem match: enough to hand off to a loader.
#[derive(Clone)]
pub struct Candidate {
    pub filesystem: Arc<dyn MountedFileSystem>,
    pub translated_path: String,
    pub mount_point: String,
    pub mount_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Found(CandidateHandle),
    NoCandidates,
    /// The mount list changed between two steps of this lookup. The
    /// caller should start a fresh lookup.
    Invalidated,
}

/// [`Candidate`] minus the `dyn` filesystem handle, which isn't
/// `PartialEq`; used only so `LookupOutcome` can derive equality for
/// tests. Real callers use [`Lookup::next`], which returns the full
/// [`Candidate`] through [`Found`](LookupOutcome::Found) instead — see
/// [`Lookup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateHandle {
    pub mount_point: String,
    pub mount_id: u64,
    pub translated_path: String,
}

impl From<&Candidate> for CandidateHandle {
    fn from(c: &Candidate) -> Self {
        Self {
            mount_point: c.mount_point.clone(),
            mount_id: c.mount_id,
            translated_path: c.translated_path.clone(),
        }
    }
}

/// The prioritized mount list plus an optional default (catch-all)
/// filesystem used for fully-qualified requests that don't name a
/// specific mount.
pub struct MountingTree {
    state: ReentrantMutex<RefCell<TreeState>>,
    default_mount: parking_lot::RwLock<Option<Arc<dyn MountedFileSystem>>>,
    generation: AtomicU64,
}

impl Default for MountingTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MountingTree {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ReentrantMutex::new(RefCell::new(TreeState {
                mounts: Vec::new(),
                change_id: 1,
                next_id: 1,
            })),
            default_mount: parking_lot::RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn set_default_filesystem(&self, filesystem: Arc<dyn MountedFileSystem>) {
        *self.default_mount.write() = Some(filesystem);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Mounts `filesystem` at `mount_point`. Earlier mounts take priority
    /// over later ones with an overlapping prefix.
    pub fn mount(&self, mount_point: &str, filesystem: Arc<dyn MountedFileSystem>) -> u64 {
        let segments = path::mount_point_segments(mount_point);
        let hash = fold_hash(&segments);
        let normalized = segments.join("/");

        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        state.change_id += 1;
        state.mounts.push(MountEntry {
            id,
            depth: segments.len(),
            hash,
            mount_point: normalized,
            filesystem,
        });
        tracing::trace!(mount_id = id, mount_point, "mounted filesystem");
        id
    }

    pub fn unmount(&self, mount_id: u64) {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        state.mounts.retain(|m| m.id != mount_id);
        state.change_id += 1;
        tracing::trace!(mount_id, "unmounted filesystem");
    }

    #[must_use]
    pub fn mount_point(&self, mount_id: u64) -> Option<String> {
        let guard = self.state.lock();
        let state = guard.borrow();
        state
            .mounts
            .iter()
            .find(|m| m.id == mount_id)
            .map(|m| m.mount_point.clone())
    }

    /// Begins a lookup for `request`. The returned [`Lookup`] is driven by
    /// repeated calls to [`Lookup::next`]; each call re-checks that the
    /// mount list hasn't changed since the previous call.
    #[must_use]
    pub fn lookup<'a>(&'a self, request: &str) -> Lookup<'a> {
        let (segments, kind) = path::configure(request);
        Lookup {
            tree: self,
            segments,
            kind,
            next_mount_idx: 0,
            next_hash_depth: 0,
            cached_hashes: Vec::new(),
            change_id: 0,
            fq_done: false,
            last_candidate: None,
        }
    }

    /// Convenience for callers that don't need to yield between
    /// candidates: drives a [`Lookup`] to its first `Found` or terminal
    /// outcome.
    #[must_use]
    pub fn resolve(&self, request: &str) -> LookupResult {
        let mut lookup = self.lookup(request);
        loop {
            match lookup.next() {
                LookupOutcome::Found(_) => return LookupResult::Found(lookup.last_candidate.take().unwrap()),
                LookupOutcome::NoCandidates => return LookupResult::NoCandidates,
                LookupOutcome::Invalidated => return LookupResult::Invalidated,
            }
        }
    }

    /// Like [`Self::resolve`], but for callers that want `?`-friendly
    /// `Result` plumbing instead of matching on [`LookupResult`] directly.
    pub fn resolve_strict(&self, request: &str) -> Result<Candidate, MountError> {
        match self.resolve(request) {
            LookupResult::Found(candidate) => Ok(candidate),
            LookupResult::NoCandidates => Err(MountError::NoCandidates),
            LookupResult::Invalidated => Err(MountError::LookupInvalidated),
        }
    }
}

/// Like [`LookupOutcome`] but carries the real [`Candidate`] (including
/// its `dyn` filesystem handle) for callers that just want "the first
/// match".
pub enum LookupResult {
    Found(Candidate),
    NoCandidates,
    Invalidated,
}

/// Drives one lookup across candidate mounts in priority order.
pub struct Lookup<'a> {
    tree: &'a MountingTree,
    segments: Vec<String>,
    kind: PathKind,
    next_mount_idx: usize,
    next_hash_depth: usize,
    cached_hashes: Vec<u64>,
    change_id: u64,
    fq_done: bool,
    last_candidate: Option<Candidate>,
}

impl<'a> Lookup<'a> {
    /// Advances to the next candidate, re-validating the mount list's
    /// `change_id` against the snapshot taken on the first call.
    pub fn next(&mut self) -> LookupOutcome {
        let guard = self.tree.state.lock();
        let state = guard.borrow();

        if self.change_id == 0 {
            self.change_id = state.change_id;
        } else if self.change_id != state.change_id {
            return LookupOutcome::Invalidated;
        }

        let kind = self.kind.clone();
        match kind {
            PathKind::FullyQualified { mount_id, remainder } => {
                if self.fq_done {
                    return LookupOutcome::NoCandidates;
                }
                self.fq_done = true;

                let resolved = match mount_id {
                    Some(id) => state
                        .mounts
                        .iter()
                        .find(|m| m.id == id)
                        .map(|m| (m.filesystem.clone(), m.mount_point.clone(), m.id)),
                    None => self
                        .tree
                        .default_mount
                        .read()
                        .clone()
                        .map(|fs| (fs, String::new(), 0)),
                };

                let Some((fs, mount_point, id)) = resolved else {
                    return LookupOutcome::NoCandidates;
                };
                match fs.try_translate(&remainder) {
                    Some(translated) => {
                        let candidate = Candidate {
                            filesystem: fs,
                            translated_path: translated,
                            mount_point,
                            mount_id: id,
                        };
                        let handle = CandidateHandle::from(&candidate);
                        self.last_candidate = Some(candidate);
                        LookupOutcome::Found(handle)
                    }
                    None => LookupOutcome::NoCandidates,
                }
            }
            PathKind::Normal => loop {
                if self.next_mount_idx >= state.mounts.len() {
                    return LookupOutcome::NoCandidates;
                }
                let idx = self.next_mount_idx;
                self.next_mount_idx += 1;

                let depth = state.mounts[idx].depth;

                if depth == 0 {
                    let remainder = self.segments.join("/");
                    if let Some(translated) = state.mounts[idx].filesystem.try_translate(&remainder) {
                        let candidate = Candidate {
                            filesystem: state.mounts[idx].filesystem.clone(),
                            translated_path: translated,
                            mount_point: state.mounts[idx].mount_point.clone(),
                            mount_id: state.mounts[idx].id,
                        };
                        let handle = CandidateHandle::from(&candidate);
                        self.last_candidate = Some(candidate);
                        return LookupOutcome::Found(handle);
                    }
                    continue;
                }

                if depth > self.segments.len() {
                    continue;
                }

                while self.next_hash_depth < depth {
                    let seed = if self.next_hash_depth == 0 {
                        INITIAL_SEED
                    } else {
                        self.cached_hashes[self.next_hash_depth - 1]
                    };
                    let h = hash_segment(seed, &self.segments[self.next_hash_depth]);
                    self.cached_hashes.push(h);
                    self.next_hash_depth += 1;
                }

                if self.cached_hashes[depth - 1] == state.mounts[idx].hash {
                    let remainder = self.segments[depth..].join("/");
                    if let Some(translated) = state.mounts[idx].filesystem.try_translate(&remainder) {
                        let candidate = Candidate {
                            filesystem: state.mounts[idx].filesystem.clone(),
                            translated_path: translated,
                            mount_point: state.mounts[idx].mount_point.clone(),
                            mount_id: state.mounts[idx].id,
                        };
                        let handle = CandidateHandle::from(&candidate);
                        self.last_candidate = Some(candidate);
                        return LookupOutcome::Found(handle);
                    }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MapFs(std::collections::HashMap<String, String>);
    impl MountedFileSystem for MapFs {
        fn try_translate(&self, relative_path: &str) -> Option<String> {
            self.0.get(relative_path).cloned()
        }
    }

    fn fs_with(entries: &[(&str, &str)]) -> Arc<MapFs> {
        Arc::new(MapFs(
            entries
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        ))
    }

    #[test]
    fn finds_candidate_in_highest_priority_mount() {
        let tree = MountingTree::new();
        tree.mount("one/two", fs_with(&[("three.txt", "HIGH")]));
        tree.mount("one", fs_with(&[("two/three.txt", "LOW")]));

        match tree.resolve("one/two/three.txt") {
            LookupResult::Found(c) => assert_eq!(c.translated_path, "HIGH"),
            _ => panic!("expected a match"),
        }
    }

    #[test]
    fn falls_through_to_lower_priority_mount() {
        let tree = MountingTree::new();
        tree.mount("one/two", fs_with(&[("nomatch.txt", "x")]));
        tree.mount("one", fs_with(&[("two/three.txt", "LOW")]));

        match tree.resolve("one/two/three.txt") {
            LookupResult::Found(c) => assert_eq!(c.translated_path, "LOW"),
            _ => panic!("expected a match"),
        }
    }

    #[test]
    fn depth_zero_mount_matches_everything() {
        let tree = MountingTree::new();
        tree.mount("", fs_with(&[("anything/here.txt", "ROOT")]));
        match tree.resolve("anything/here.txt") {
            LookupResult::Found(c) => assert_eq!(c.translated_path, "ROOT"),
            _ => panic!("expected a match"),
        }
    }

    #[test]
    fn unmount_mid_enumeration_invalidates() {
        let tree = MountingTree::new();
        let id_a = tree.mount("one", fs_with(&[]));
        tree.mount("two", fs_with(&[("x", "Y")]));

        let mut lookup = tree.lookup("two/x");
        // Prime the change_id snapshot.
        assert!(matches!(lookup.next(), LookupOutcome::Found(_) | LookupOutcome::NoCandidates));

        // A second, independent lookup should observe the unmount.
        tree.unmount(id_a);
        let mut second = tree.lookup("two/x");
        let outcome = second.next();
        // First call on a fresh Lookup always snapshots rather than
        // invalidating; it's a concurrent *in-flight* lookup that would see
        // Invalidated on its next call.
        assert!(matches!(outcome, LookupOutcome::Found(_)));

        assert!(matches!(lookup.next(), LookupOutcome::Invalidated));
    }

    #[test]
    fn fully_qualified_named_mount_bypasses_priority() {
        let tree = MountingTree::new();
        let id = tree.mount("irrelevant", fs_with(&[("file.txt", "NAMED")]));
        match tree.resolve(&format!("{id}:/file.txt")) {
            LookupResult::Found(c) => assert_eq!(c.translated_path, "NAMED"),
            _ => panic!("expected a match"),
        }
    }

    #[test]
    fn fully_qualified_default_mount_used_for_absolute_path() {
        let tree = MountingTree::new();
        tree.set_default_filesystem(fs_with(&[("/abs/file.txt", "DEFAULT")]));
        match tree.resolve("/abs/file.txt") {
            LookupResult::Found(c) => assert_eq!(c.translated_path, "DEFAULT"),
            _ => panic!("expected a match"),
        }
    }

    #[test]
    fn no_candidates_when_nothing_matches() {
        let tree = MountingTree::new();
        tree.mount("one", fs_with(&[]));
        assert!(matches!(tree.resolve("one/missing.txt"), LookupResult::NoCandidates));
    }

    #[test]
    fn resolve_strict_turns_no_candidates_into_an_error() {
        let tree = MountingTree::new();
        tree.mount("one", fs_with(&[]));
        assert!(matches!(tree.resolve_strict("one/missing.txt"), Err(MountError::NoCandidates)));
    }

    #[test]
    fn resolve_strict_succeeds_on_a_match() {
        let tree = MountingTree::new();
        tree.mount("one", fs_with(&[("file.txt", "OK")]));
        assert_eq!(tree.resolve_strict("one/file.txt").unwrap().translated_path, "OK");
    }
}

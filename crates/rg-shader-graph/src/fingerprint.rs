//! Instantiation requests and the deterministic fingerprint folded over
//! them.
//!
//! The hash is zero for an unparameterized (empty-bindings) request,
//! otherwise a left fold over `parameter_bindings` in declaration order —
//! hashing `(name, subtree_hash)` per binding, with each binding's own
//! curried-parameter names folded in immediately after it — followed by
//! `implements_archive_name` when non-empty. The per-subtree hash only
//! covers that subtree's own archive name and nested bindings; the
//! caller's running accumulator is never threaded into it, so each
//! subtree's contribution is self-contained and order only matters at
//! the level it's folded in at.

use std::sync::Arc;

use xxhash_rust::xxh3::xxh3_64;

use crate::provider::GraphProvider;

const DEFAULT_SEED: u64 = 0xdeaf_1234_5678_90ab;

fn hash64(bytes: &[u8]) -> u64 {
    xxh3_64(bytes)
}

fn hash64_combine(text: &str, seed: u64) -> u64 {
    let mut buf = Vec::with_capacity(text.len() + 8);
    buf.extend_from_slice(text.as_bytes());
    buf.extend_from_slice(&seed.to_le_bytes());
    hash64(&buf)
}

/// A 64-bit value deterministically identifying a patch collection or an
/// instantiation request tree. Stable across processes for identical
/// inputs (see [`InstantiationRequest::fingerprint`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Fingerprint(pub u64);

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl Fingerprint {
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(hash64(bytes))
    }

    #[must_use]
    pub fn of_text(text: &str) -> Self {
        Self::of_bytes(text.as_bytes())
    }
}

/// A recursive description of how to resolve a patch collection:
/// an archive name, its named parameter bindings (each itself an
/// [`InstantiationRequest`]), a list of parameters to curry through to
/// the caller, and an optional `implements` override for patches that
/// don't declare their own interface (e.g. raw HLSL patches).
///
/// `parameter_bindings` is an ordered list rather than a map: the
/// fingerprint fold is order-sensitive, so two requests built with the
/// same bindings in a different order are different requests and must
/// fingerprint differently.
#[derive(Debug, Clone, Default)]
pub struct InstantiationRequest {
    pub archive_name: String,
    pub parameter_bindings: Vec<(String, InstantiationRequest)>,
    pub curried_params: Vec<String>,
    pub implements_archive_name: String,
    /// Overrides the default graph provider for this subtree only.
    /// Deliberately excluded from [`Self::fingerprint`] and from
    /// [`PartialEq`]: two requests that differ only in which provider
    /// resolves their archive names still dedup as the same instantiation,
    /// since the provider is an injection seam rather than part of the
    /// request's own identity.
    pub custom_provider: Option<Arc<dyn GraphProvider>>,
}

impl PartialEq for InstantiationRequest {
    fn eq(&self, other: &Self) -> bool {
        self.archive_name == other.archive_name
            && self.parameter_bindings == other.parameter_bindings
            && self.curried_params == other.curried_params
            && self.implements_archive_name == other.implements_archive_name
    }
}
impl Eq for InstantiationRequest {}

impl InstantiationRequest {
    #[must_use]
    pub fn new(archive_name: impl Into<String>) -> Self {
        Self {
            archive_name: archive_name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn implementing(mut self, implements_archive_name: impl Into<String>) -> Self {
        self.implements_archive_name = implements_archive_name.into();
        self
    }

    #[must_use]
    pub fn with_binding(mut self, name: impl Into<String>, request: InstantiationRequest) -> Self {
        self.parameter_bindings.push((name.into(), request));
        self
    }

    #[must_use]
    pub fn with_curried(mut self, param: impl Into<String>) -> Self {
        self.curried_params.push(param.into());
        self
    }

    /// Hashes `dep`'s own archive name plus its nested bindings (but not
    /// any accumulator from the caller — see the module doc).
    fn subtree_hash(&self) -> u64 {
        let mut result = hash64(self.archive_name.as_bytes());
        for (name, child) in &self.parameter_bindings {
            result = hash64_combine(name, child.subtree_hash());
        }
        result
    }

    /// The deterministic fingerprint of this request's parameterization:
    /// `0` for an unparameterized (no bindings) request, otherwise a fold
    /// over bindings in declaration order, then curried-parameter names,
    /// then `implements_archive_name` if set.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        if self.parameter_bindings.is_empty() {
            return Fingerprint(0);
        }
        let mut result = DEFAULT_SEED;
        for (name, child) in &self.parameter_bindings {
            result = hash64_combine(name, child.subtree_hash());
            for curried in &child.curried_params {
                result = hash64_combine(curried, result);
            }
        }
        if !self.implements_archive_name.is_empty() {
            result = hash64_combine(&self.implements_archive_name, result);
        }
        Fingerprint(result)
    }

    #[must_use]
    pub fn instance_hash(&self) -> u64 {
        self.fingerprint().0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparameterized_request_hashes_to_zero() {
        let req = InstantiationRequest::new("graph::Default_PerPixel");
        assert_eq!(req.fingerprint(), Fingerprint(0));
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let req = InstantiationRequest::new("graph::deferred_pass_main")
            .with_binding("perPixel", InstantiationRequest::new("graph::Default_PerPixel"));
        assert_eq!(req.fingerprint(), req.fingerprint());
    }

    #[test]
    fn binding_order_changes_fingerprint() {
        let a = InstantiationRequest::new("main")
            .with_binding("a", InstantiationRequest::new("x"))
            .with_binding("b", InstantiationRequest::new("y"));
        let b = InstantiationRequest::new("main")
            .with_binding("b", InstantiationRequest::new("y"))
            .with_binding("a", InstantiationRequest::new("x"));
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn equal_requests_have_equal_fingerprints() {
        let a = InstantiationRequest::new("main").with_binding("a", InstantiationRequest::new("x"));
        let b = InstantiationRequest::new("main").with_binding("a", InstantiationRequest::new("x"));
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn curried_params_affect_fingerprint() {
        let base = InstantiationRequest::new("main")
            .with_binding("a", InstantiationRequest::new("x"));
        let curried = InstantiationRequest::new("main")
            .with_binding("a", InstantiationRequest::new("x").with_curried("scale"));
        assert_ne!(base.fingerprint(), curried.fingerprint());
    }

    #[test]
    fn implements_override_affects_fingerprint() {
        let base = InstantiationRequest::new("main").with_binding("a", InstantiationRequest::new("x"));
        let implementing = base.clone().implementing("deferred_pass_main");
        assert_ne!(base.fingerprint(), implementing.fingerprint());
    }
}

//! Error type for mounting-tree lookups.

#[derive(Debug, Clone, Copy, thiserror::Error)]
pub enum MountError {
    /// The mount list changed between two steps of an in-flight lookup;
    /// the caller should discard it and start a fresh one.
    #[error("mount list changed during lookup; retry with a fresh lookup")]
    LookupInvalidated,

    /// No mounted filesystem had anything at the requested path.
    #[error("no mounted filesystem matched the requested path")]
    NoCandidates,
}

//! Error and outcome types shared by every asset future and continuation.

use rg_depval::DependencyValidation;

/// Failure modes surfaced by [`crate::Future`] resolution and continuations.
///
/// `PendingAsset` and `InvalidAsset` are not really "errors" in the panic
/// sense: they are the two ways a `try_actualize`/`actualize` call can fail
/// to hand back a value, surfaced through `Result` because that is the
/// idiomatic way to force callers to handle both.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AssetError {
    #[error("asset from '{initializer}' has not resolved yet")]
    PendingAsset { initializer: String },

    #[error("asset from '{initializer}' resolved to invalid: {log}")]
    InvalidAsset {
        initializer: String,
        depval: DependencyValidation,
        log: String,
    },

    /// Raised by a continuation or polling function constructing a new
    /// asset from already-actualized inputs. `depval`, if present, is
    /// folded into the resulting future's invalid-state depval so the
    /// failure clears when its cause is fixed.
    #[error("construction failed: {message}")]
    ConstructionError {
        message: String,
        depval: Option<DependencyValidation>,
    },

    #[error("{message}")]
    GenericFailure { message: String },

    /// A thread tried to stall on a future it is already in the middle of
    /// resolving (directly, or transitively through a `WhenAll` chain).
    /// Waiting would never make progress, so this is reported instead of
    /// hanging.
    #[error("deadlock detected resolving '{initializer}'")]
    DeadlockDetected { initializer: String },
}

impl AssetError {
    #[must_use]
    pub fn depval(&self) -> DependencyValidation {
        match self {
            Self::InvalidAsset { depval, .. } => depval.clone(),
            Self::ConstructionError { depval, .. } => depval.clone().unwrap_or_default(),
            Self::PendingAsset { .. } | Self::GenericFailure { .. } | Self::DeadlockDetected { .. } => {
                DependencyValidation::empty()
            }
        }
    }

    #[must_use]
    pub fn log(&self) -> String {
        match self {
            Self::InvalidAsset { log, .. } => log.clone(),
            other => other.to_string(),
        }
    }
}

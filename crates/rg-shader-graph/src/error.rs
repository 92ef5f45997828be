//! Error types for shader-graph instantiation and descriptor-set linking.

use crate::provider::ProviderError;

#[derive(Debug, thiserror::Error)]
pub enum ShaderGraphError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("capture '{name}' conflicts: previously declared as '{existing_type}', now '{new_type}'")]
    CaptureConflict {
        name: String,
        existing_type: String,
        new_type: String,
    },

    #[error("descriptor slot '{0}' has no placement in the fixed layout")]
    LinkMismatch(String),
}

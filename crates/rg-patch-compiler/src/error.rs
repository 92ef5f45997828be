//! Error type for patch-collection text parsing and compilation.

use crate::text::TextFormatError;

#[derive(Debug, thiserror::Error)]
pub enum PatchCompilerError {
    #[error(transparent)]
    Text(#[from] TextFormatError),

    #[error(transparent)]
    ShaderGraph(#[from] rg_shader_graph::ShaderGraphError),

    #[error("patch collection has no patches")]
    EmptyCollection,

    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

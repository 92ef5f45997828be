//! Compiles a patch-collection text document into an immutable
//! [`CompiledShaderPatchCollection`], on top of the shader-graph
//! instantiator and descriptor-set linker.
//!
//! `text` parses and serializes the patch-collection text format;
//! `compiler` orchestrates instantiation and linking; `cache` memoizes
//! compiled collections by content fingerprint so repeated requests for
//! the same patch collection don't re-run the (potentially expensive)
//! graph expansion.

pub mod cache;
pub mod compiled;
pub mod compiler;
pub mod error;
pub mod text;

pub use cache::PatchCollectionCache;
pub use compiled::{CompiledShaderPatchCollection, OverrideStage};
pub use compiler::{compile, CompileOptions};
pub use error::PatchCompilerError;
pub use text::TextFormatError;

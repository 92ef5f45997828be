//! The injected seam between this crate and graph-syntax parsing / HLSL
//! code generation, which stay out of scope: file-format parsing is
//! treated as pure functions from bytes to parsed structures, supplied by
//! whatever concrete [`GraphProvider`] the caller wires in.
//!
//! A [`GraphProvider`] resolves archive names to parsed structures and
//! performs the actual graph-to-source-text expansion
//! (`generate_function`); this crate's instantiator (`instantiate`) is
//! the orchestration layer that walks a request tree, dedupes, merges
//! captures, and extracts selector relevance by inspecting the
//! already-parsed graph's edges.

use std::collections::BTreeMap;

use rg_depval::DependencyValidation;

use crate::fingerprint::InstantiationRequest;

/// Parameter direction in a node-graph function signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    In,
    Out,
}

/// One parameter of a node-graph function signature (either a graph's
/// top-level signature, or the captured-parameter list that feeds the
/// material descriptor set).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Parameter {
    pub name: String,
    pub type_name: String,
    pub direction: Direction,
    pub default_value: Option<String>,
    pub semantic: Option<String>,
}

impl Parameter {
    #[must_use]
    pub fn input(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            direction: Direction::In,
            default_value: None,
            semantic: None,
        }
    }

    #[must_use]
    pub fn output(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            direction: Direction::Out,
            default_value: None,
            semantic: None,
        }
    }
}

/// A node-graph function's signature: ordered input/output parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NodeGraphSignature {
    pub parameters: Vec<Parameter>,
}

impl NodeGraphSignature {
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// A single conditioned edge of a parsed node graph. `condition` holds the
/// raw preprocessor expression text guarding this edge (e.g.
/// `"defined(HAS_NORMAL_MAP)"`), if any; selector-relevance extraction
/// scans these for `defined(...)` tokens.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GraphEdge {
    pub condition: Option<String>,
}

/// The file a depval or diagnostic should be attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct DepFileState {
    pub path: String,
}

/// An already-parsed node-graph file, as handed back by [`GraphProvider::find_graph`].
#[derive(Debug, Clone)]
pub struct ParsedGraph {
    pub name: String,
    pub signature: NodeGraphSignature,
    pub edges: Vec<GraphEdge>,
    pub depval: DependencyValidation,
    pub file_state: DepFileState,
}

/// A single entry point exposed by an instantiated shader.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ShaderEntryPoint {
    pub name: String,
    pub signature: NodeGraphSignature,
    pub implements_name: String,
    pub implements_signature: NodeGraphSignature,
}

/// Target shading language; affects only CB element packing order (see
/// `build_material_descriptor_set`'s internal packing pass in
/// `descriptor_link.rs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderLanguage {
    Hlsl,
}

/// Options threaded through a single `GenerateFunction` call.
#[derive(Debug, Clone)]
pub struct GenerateFunctionOptions {
    pub selectors: BTreeMap<String, String>,
    pub filter_with_selectors: bool,
    pub shader_language: ShaderLanguage,
    pub material_descriptor_set_index: Option<usize>,
    pub generate_dangling_inputs: bool,
}

impl Default for GenerateFunctionOptions {
    fn default() -> Self {
        Self {
            selectors: BTreeMap::new(),
            filter_with_selectors: false,
            shader_language: ShaderLanguage::Hlsl,
            material_descriptor_set_index: None,
            generate_dangling_inputs: false,
        }
    }
}

/// A dependency discovered while generating a function: either a nested
/// graph-syntax instantiation to expand recursively, or a plain include
/// of a raw shader file.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub instantiation: InstantiationRequest,
    pub is_graph_syntax_file: bool,
}

/// The result of expanding one instantiation's graph into a function
/// body, as produced by [`GraphProvider::generate_function`].
#[derive(Debug, Clone)]
pub struct GenerateFunctionResult {
    pub source_fragments: Vec<String>,
    pub entry_point: ShaderEntryPoint,
    pub dependencies: Vec<Dependency>,
    pub captures: Vec<Parameter>,
    pub depval: DependencyValidation,
    pub dep_file_states: Vec<DepFileState>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("no graph found with archive name '{0}'")]
    GraphNotFound(String),
    #[error("no signature found with archive name '{0}'")]
    SignatureNotFound(String),
    #[error("failed generating function for '{0}': {1}")]
    GenerationFailed(String, String),
}

/// The injected seam for graph-syntax resolution and codegen. Implemented
/// by whatever owns the actual shader-graph parser/compiler; this crate
/// only orchestrates calls against it.
pub trait GraphProvider: Send + Sync {
    /// Whether `archive_name` should be treated as a graph-syntax file
    /// (recurse via [`Self::find_graph`] + [`Self::generate_function`])
    /// or a raw shader file (just an include).
    fn is_graph_syntax(&self, archive_name: &str) -> bool;

    fn find_graph(&self, archive_name: &str) -> Result<ParsedGraph, ProviderError>;

    fn find_signature(&self, archive_name: &str) -> Result<NodeGraphSignature, ProviderError>;

    /// The source file backing a raw (non-graph) archive name, used to
    /// populate `raw_shader_file_includes` and the watched-file depval.
    fn raw_source_file(&self, archive_name: &str) -> Result<DepFileState, ProviderError>;

    fn generate_function(
        &self,
        graph: &ParsedGraph,
        function_name: &str,
        request: &InstantiationRequest,
        options: &GenerateFunctionOptions,
    ) -> Result<GenerateFunctionResult, ProviderError>;
}

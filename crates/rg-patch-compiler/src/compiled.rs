//! The compiled, immutable result of compiling a patch collection: the
//! expanded shader source and entry points (via `rg_shader_graph`'s
//! instantiator), a linked descriptor-set layout, and the bookkeeping
//! metadata the rest of the engine needs alongside the patch list itself
//! (descriptor set, preconfiguration name, per-stage override shaders).

use std::collections::BTreeMap;

use rg_depval::DependencyValidation;
use rg_shader_graph::{DescriptorSetLayout, Fingerprint, InstantiationRequest, ShaderEntryPoint};

use crate::text;

/// Which pipeline stage an override shader file replaces. Matches the
/// original's `ShaderStage`-indexed `_overrideShaders[3]` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OverrideStage {
    Vertex = 0,
    Geometry = 1,
    Pixel = 2,
}

/// An immutable, fully compiled patch collection. Shared by `Arc` once
/// built — nothing here is mutated after [`crate::compiler::compile`]
/// returns it.
#[derive(Debug, Clone, Default)]
pub struct CompiledShaderPatchCollection {
    /// The source patches this collection was built from, in declaration
    /// order (before any sorting `GetHash()` applies internally).
    pub patches: Vec<(String, InstantiationRequest)>,
    /// Concatenated HLSL source and per-patch entry points from
    /// instantiating every patch as its own root.
    pub source_fragments: Vec<String>,
    pub entry_points: Vec<ShaderEntryPoint>,
    /// The linked material descriptor set, if a fixed pipeline layout was
    /// supplied to the compiler; `None` when compiling against no fixed
    /// layout (captures are still collected, just not linked).
    pub material_descriptor_set: Option<DescriptorSetLayout>,
    /// Selector name to governing `defined(...)` condition text.
    pub filtering_rules: BTreeMap<String, String>,
    pub preconfiguration: Option<String>,
    pub override_shaders: [Option<String>; 3],
    pub depval: DependencyValidation,
}

impl CompiledShaderPatchCollection {
    /// A deterministic content hash: identical deserialized patch text
    /// plus identical metadata always hashes equal.
    ///
    /// Computed over the canonical serialized patch text rather than
    /// instantiated source, so it depends only on the patch collection's
    /// own declared content, not on whatever a particular `GraphProvider`
    /// happens to expand it to.
    #[must_use]
    pub fn content_hash(&self) -> Fingerprint {
        let mut canonical = text::serialize(&self.patches);
        canonical.push('\x1f');
        canonical.push_str(self.preconfiguration.as_deref().unwrap_or(""));
        for stage in &self.override_shaders {
            canonical.push('\x1f');
            canonical.push_str(stage.as_deref().unwrap_or(""));
        }
        Fingerprint::of_text(&canonical)
    }

    #[must_use]
    pub fn override_shader(&self, stage: OverrideStage) -> Option<&str> {
        self.override_shaders[stage as usize].as_deref()
    }
}

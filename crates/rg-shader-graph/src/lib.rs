//! Shader-patch instantiation: expanding a request tree into HLSL source
//! plus entry points, and linking the resulting captures against a fixed
//! pipeline descriptor-set layout.
//!
//! Graph parsing and graph-to-source codegen stay out of this crate,
//! reached only through the injected [`provider::GraphProvider`] seam;
//! everything here is orchestration over already-parsed structures.

pub mod descriptor_link;
pub mod error;
pub mod fingerprint;
pub mod instantiate;
pub mod layout;
pub mod provider;

pub use descriptor_link::{build_material_descriptor_set, link_to_fixed_layout, AllowSlotTypeModification};
pub use error::ShaderGraphError;
pub use fingerprint::{Fingerprint, InstantiationRequest};
pub use instantiate::{filtered_defines_table, instantiate_shader, instantiate_single, InstantiatedShader};
pub use layout::{CbElement, ConstantBufferLayout, DescriptorSetLayout, DescriptorSlot, SlotType};
pub use provider::{
    DepFileState, Dependency, Direction, GenerateFunctionOptions, GenerateFunctionResult, GraphEdge, GraphProvider,
    NodeGraphSignature, Parameter, ParsedGraph, ProviderError, ShaderEntryPoint, ShaderLanguage,
};

//! Descriptor-set and constant-buffer layout types shared by the
//! material descriptor set builder and the fixed-layout linker.

use std::sync::Arc;

/// The kind of resource a descriptor-set slot binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SlotType {
    ConstantBuffer,
    Texture,
    Sampler,
    UnorderedAccess,
    /// A `UnorderedAccess`/`Texture` slot that additionally carries a
    /// dynamic offset; compatible with a plain `UnorderedAccess`/`Texture`
    /// slot as an upgrade.
    UnorderedAccessDynamicOffset,
}

impl SlotType {
    /// Whether `self` may be placed into a fixed-layout slot: exact
    /// match, or a non-dynamic-offset UB/UAV slot upgrading to the fixed
    /// layout's dynamic-offset variant.
    #[must_use]
    pub fn compatible_with(self, fixed: SlotType) -> bool {
        if self == fixed {
            return true;
        }
        matches!(
            (self, fixed),
            (SlotType::UnorderedAccess, SlotType::UnorderedAccessDynamicOffset)
                | (SlotType::ConstantBuffer, SlotType::UnorderedAccessDynamicOffset)
        )
    }
}

/// One primitive-typed element of a constant buffer (as opposed to a
/// texture/sampler/UAV capture, which becomes a descriptor slot instead).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CbElement {
    pub name: String,
    pub type_name: String,
}

/// A constant-buffer layout: a named, ordered list of elements. Shared by
/// pointer equality once deduplicated: two `Arc<ConstantBufferLayout>`
/// with the same contents collapse to one allocation so `cb_idx`
/// back-references compare equal by `Arc::ptr_eq`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ConstantBufferLayout {
    pub name: String,
    pub elements: Vec<CbElement>,
}

/// One slot of a descriptor set: either a constant buffer (`cb_idx`
/// indexes into the owning layout's `constant_buffers`) or a
/// texture/sampler/UAV resource.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DescriptorSlot {
    pub name: String,
    pub slot_idx: Option<u32>,
    pub slot_type: SlotType,
    pub array_count: u32,
    pub cb_idx: Option<usize>,
    pub fixed_sampler_idx: Option<u32>,
}

/// A descriptor set: an ordered list of slots plus the constant-buffer
/// layouts those slots of type [`SlotType::ConstantBuffer`] reference.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct DescriptorSetLayout {
    pub slots: Vec<DescriptorSlot>,
    pub constant_buffers: Vec<ConstantBufferLayout>,
    pub fixed_samplers: Vec<String>,
}

impl DescriptorSetLayout {
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&DescriptorSlot> {
        self.slots.iter().find(|s| s.name == name)
    }

    #[must_use]
    pub fn find_by_index(&self, idx: u32) -> Option<&DescriptorSlot> {
        self.slots.iter().find(|s| s.slot_idx == Some(idx))
    }
}

/// A handle to an immutable [`DescriptorSetLayout`], shared by reference
/// count once built (`CompiledShaderPatchCollection` and
/// `InstantiatedShader` both reference it this way).
pub type DescriptorSetLayoutHandle = Arc<DescriptorSetLayout>;

//! Building a material descriptor set out of a shader's captured
//! parameters, and linking a built descriptor set against a fixed
//! pipeline-layout descriptor set.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ShaderGraphError;
use crate::layout::{CbElement, ConstantBufferLayout, DescriptorSetLayout, DescriptorSlot, SlotType};
use crate::provider::{Direction, Parameter};

const DEFAULT_MATERIAL_CB_NAME: &str = "BasicMaterialConstants";

fn resource_slot_type(type_name: &str) -> Option<SlotType> {
    if type_name.starts_with("RWTexture") || type_name.starts_with("RWBuffer") || type_name.starts_with("RWStructuredBuffer") {
        Some(SlotType::UnorderedAccess)
    } else if type_name.starts_with("Texture") || type_name.starts_with("Buffer") {
        Some(SlotType::Texture)
    } else if type_name == "SamplerState" || type_name == "SamplerComparisonState" {
        Some(SlotType::Sampler)
    } else {
        None
    }
}

/// Groups captured parameters into constant-buffer elements plus resource
/// slots. A capture whose type names a texture/sampler/UAV resource
/// becomes its own descriptor slot; every other (primitive-typed) input
/// capture becomes an element of a constant buffer, grouped by the text
/// before the first `.` in its name (e.g. `material.roughness` groups
/// under `material`), falling back to [`DEFAULT_MATERIAL_CB_NAME`] for
/// ungrouped captures. Elements within a buffer are sorted by name for
/// deterministic, content-addressable packing.
#[must_use]
pub fn build_material_descriptor_set(captures: &[Parameter]) -> DescriptorSetLayout {
    let mut cb_groups: BTreeMap<String, Vec<CbElement>> = BTreeMap::new();
    let mut resource_slots: Vec<DescriptorSlot> = Vec::new();

    for capture in captures {
        if capture.direction != Direction::In {
            continue;
        }
        if let Some(slot_type) = resource_slot_type(&capture.type_name) {
            resource_slots.push(DescriptorSlot {
                name: capture.name.clone(),
                slot_idx: None,
                slot_type,
                array_count: 1,
                cb_idx: None,
                fixed_sampler_idx: None,
            });
        } else {
            let cb_name = capture
                .name
                .split_once('.')
                .map(|(prefix, _)| prefix.to_string())
                .unwrap_or_else(|| DEFAULT_MATERIAL_CB_NAME.to_string());
            cb_groups.entry(cb_name).or_default().push(CbElement {
                name: capture.name.clone(),
                type_name: capture.type_name.clone(),
            });
        }
    }

    let mut constant_buffers = Vec::with_capacity(cb_groups.len());
    let mut cb_slots = Vec::with_capacity(cb_groups.len());
    for (name, mut elements) in cb_groups {
        elements.sort_by(|a, b| a.name.cmp(&b.name));
        optimize_cb_element_order(&mut elements);
        cb_slots.push(DescriptorSlot {
            name: name.clone(),
            slot_idx: None,
            slot_type: SlotType::ConstantBuffer,
            array_count: 1,
            cb_idx: Some(constant_buffers.len()),
            fixed_sampler_idx: None,
        });
        constant_buffers.push(ConstantBufferLayout { name, elements });
    }

    let mut slots = cb_slots;
    slots.extend(resource_slots);
    slots.sort_by(|a, b| a.name.cmp(&b.name));

    DescriptorSetLayout {
        slots,
        constant_buffers,
        fixed_samplers: Vec::new(),
    }
}

/// Register units (of 4 bytes each) a scalar/vector HLSL type occupies.
/// Matrices and anything this crate doesn't recognize are treated as a
/// full register: under-counting would risk packing something across a
/// boundary the real compiler wouldn't allow.
fn element_units(type_name: &str) -> u32 {
    match type_name {
        "float" | "int" | "uint" | "bool" => 1,
        "float2" | "int2" | "uint2" => 2,
        "float3" | "int3" | "uint3" => 3,
        "float4" | "int4" | "uint4" => 4,
        _ => 4,
    }
}

/// Reorders `elements` (already alphabetically sorted) to reduce the
/// padding HLSL's 16-byte constant-buffer register packing would
/// otherwise leave behind, while keeping the result deterministic for a
/// given input set.
///
/// A greedy first-fit pass: elements are taken off the alphabetical list
/// in order, except that once an element wouldn't fit in the register
/// currently being filled, later elements are searched (in their
/// existing relative order) for the first one that still fits, so a
/// small element can fill a gap a larger one would otherwise leave as
/// padding.
fn optimize_cb_element_order(elements: &mut Vec<CbElement>) {
    let mut remaining: Vec<CbElement> = std::mem::take(elements);
    let mut result = Vec::with_capacity(remaining.len());
    let mut register_space = 4u32;

    while !remaining.is_empty() {
        if register_space == 0 {
            register_space = 4;
            continue;
        }
        let units = |e: &CbElement| element_units(&e.type_name);
        match remaining.iter().position(|e| units(e) <= register_space) {
            Some(idx) => {
                register_space -= units(&remaining[idx]);
                result.push(remaining.remove(idx));
            }
            None => register_space = 0,
        }
    }

    *elements = result;
}

/// Whether linking may place a `built` slot into a `fixed` slot of a
/// merely compatible (rather than identical) type. See
/// [`SlotType::compatible_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowSlotTypeModification {
    No,
    Yes,
}

/// Links `built` (typically the output of [`build_material_descriptor_set`])
/// against `fixed`, a descriptor set whose slot indices and types are
/// already pinned by a pipeline layout.
///
/// Placement proceeds in three passes, each claiming unclaimed `fixed`
/// slots: (1) a `built` slot that already carries an explicit
/// `slot_idx` (e.g. from a previous link pass) keeps that index if
/// `fixed` still has it; (2) remaining slots are matched to `fixed` by
/// name; (3) anything left is matched to the first remaining `fixed`
/// slot whose type is compatible (or, with
/// `allow_slot_type_modification`, any remaining slot regardless of
/// type). Constant buffers are then deduplicated by content before the
/// result is sorted by final slot index. A `built` slot with no
/// placement after all three passes fails the link.
pub fn link_to_fixed_layout(
    built: &DescriptorSetLayout,
    fixed: &DescriptorSetLayout,
    allow_slot_type_modification: AllowSlotTypeModification,
) -> Result<DescriptorSetLayout, ShaderGraphError> {
    let mut claimed = vec![false; fixed.slots.len()];
    let mut placement: Vec<Option<usize>> = vec![None; built.slots.len()];

    for (bi, bslot) in built.slots.iter().enumerate() {
        if let Some(want_idx) = bslot.slot_idx {
            if let Some(fi) = fixed.slots.iter().position(|f| f.slot_idx == Some(want_idx)) {
                if !claimed[fi] {
                    placement[bi] = Some(fi);
                    claimed[fi] = true;
                }
            }
        }
    }

    for (bi, bslot) in built.slots.iter().enumerate() {
        if placement[bi].is_some() {
            continue;
        }
        if let Some(fi) = fixed.slots.iter().position(|f| f.name == bslot.name) {
            if !claimed[fi] {
                placement[bi] = Some(fi);
                claimed[fi] = true;
            }
        }
    }

    for (bi, bslot) in built.slots.iter().enumerate() {
        if placement[bi].is_some() {
            continue;
        }
        let found = fixed.slots.iter().enumerate().find(|(fi, f)| {
            !claimed[*fi]
                && (allow_slot_type_modification == AllowSlotTypeModification::Yes
                    || bslot.slot_type.compatible_with(f.slot_type))
        });
        if let Some((fi, _)) = found {
            placement[bi] = Some(fi);
            claimed[fi] = true;
        }
    }

    // Step 4: with the escape hatch, anything still unplaced after all
    // three passes gets a freshly allocated index past the highest index
    // either side already uses. Without it, a built slot left unplaced is
    // a hard failure, and any fixed-layout slot nothing claimed is copied
    // through verbatim so the final set still matches the pipeline
    // layout's shape.
    let mut next_fresh_idx = fixed
        .slots
        .iter()
        .filter_map(|s| s.slot_idx)
        .chain(built.slots.iter().filter_map(|s| s.slot_idx))
        .max()
        .map_or(0, |max| max + 1);

    let mut fresh_placements: Vec<Option<DescriptorSlot>> = vec![None; built.slots.len()];
    for (bi, bslot) in built.slots.iter().enumerate() {
        if placement[bi].is_some() {
            continue;
        }
        if allow_slot_type_modification == AllowSlotTypeModification::Yes {
            fresh_placements[bi] = Some(DescriptorSlot {
                name: bslot.name.clone(),
                slot_idx: Some(next_fresh_idx),
                slot_type: bslot.slot_type,
                array_count: bslot.array_count,
                cb_idx: bslot.cb_idx,
                fixed_sampler_idx: None,
            });
            next_fresh_idx += 1;
        } else {
            tracing::warn!(slot = %bslot.name, "descriptor slot has no placement in the fixed layout");
            return Err(ShaderGraphError::LinkMismatch(bslot.name.clone()));
        }
    }

    let mut dedup_cbs: Vec<ConstantBufferLayout> = Vec::new();
    let mut cb_remap: Vec<usize> = Vec::with_capacity(built.constant_buffers.len());
    for cb in &built.constant_buffers {
        if let Some(existing) = dedup_cbs.iter().position(|e| e == cb) {
            cb_remap.push(existing);
        } else {
            dedup_cbs.push(cb.clone());
            cb_remap.push(dedup_cbs.len() - 1);
        }
    }

    let mut result_slots: Vec<DescriptorSlot> = Vec::with_capacity(built.slots.len());
    for (bi, bslot) in built.slots.iter().enumerate() {
        if let Some(fresh) = fresh_placements[bi].take() {
            result_slots.push(DescriptorSlot {
                cb_idx: fresh.cb_idx.map(|idx| cb_remap[idx]),
                ..fresh
            });
            continue;
        }
        let fi = placement[bi].expect("checked above");
        let fixed_slot = &fixed.slots[fi];
        result_slots.push(DescriptorSlot {
            name: bslot.name.clone(),
            slot_idx: fixed_slot.slot_idx,
            slot_type: fixed_slot.slot_type,
            array_count: bslot.array_count,
            cb_idx: bslot.cb_idx.map(|idx| cb_remap[idx]),
            fixed_sampler_idx: fixed_slot.fixed_sampler_idx,
        });
    }

    if allow_slot_type_modification == AllowSlotTypeModification::No {
        for (fi, fixed_slot) in fixed.slots.iter().enumerate() {
            if !claimed[fi] {
                result_slots.push(fixed_slot.clone());
            }
        }
    }

    result_slots.sort_by_key(|s| s.slot_idx.unwrap_or(u32::MAX));

    Ok(DescriptorSetLayout {
        slots: result_slots,
        constant_buffers: dedup_cbs,
        fixed_samplers: fixed.fixed_samplers.clone(),
    })
}

/// An `Arc`-shared handle to a built constant-buffer layout, used once a
/// layout has been linked and is ready to be shared across callers.
pub type SharedConstantBuffer = Arc<ConstantBufferLayout>;

#[cfg(test)]
mod tests {
    use super::*;

    fn texture(name: &str) -> Parameter {
        Parameter::input(name, "Texture2D")
    }

    fn scalar(name: &str, ty: &str) -> Parameter {
        Parameter::input(name, ty)
    }

    #[test]
    fn packing_fills_gaps_a_pure_alphabetical_order_would_waste() {
        let mut elements = vec![
            CbElement { name: "a".into(), type_name: "float3".into() },
            CbElement { name: "b".into(), type_name: "float3".into() },
            CbElement { name: "c".into(), type_name: "float".into() },
            CbElement { name: "d".into(), type_name: "float".into() },
        ];
        optimize_cb_element_order(&mut elements);
        let names: Vec<&str> = elements.iter().map(|e| e.name.as_str()).collect();
        // Alphabetical order would pack as [a(3)][b(3)][c(1)pad3][d(1)pad3]
        // (4 registers of waste); the optimizer should slot `c` into the
        // single unit `a` leaves behind in its register, then `d` into
        // `b`'s, using two registers instead of four.
        assert_eq!(names, vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn primitive_captures_group_into_default_cb() {
        let layout = build_material_descriptor_set(&[scalar("roughness", "float"), scalar("metallic", "float")]);
        assert_eq!(layout.constant_buffers.len(), 1);
        assert_eq!(layout.constant_buffers[0].name, DEFAULT_MATERIAL_CB_NAME);
        assert_eq!(layout.constant_buffers[0].elements.len(), 2);
    }

    #[test]
    fn prefixed_captures_group_by_dot_prefix() {
        let layout = build_material_descriptor_set(&[scalar("material.roughness", "float"), scalar("light.intensity", "float")]);
        let names: Vec<_> = layout.constant_buffers.iter().map(|cb| cb.name.clone()).collect();
        assert!(names.contains(&"material".to_string()));
        assert!(names.contains(&"light".to_string()));
    }

    #[test]
    fn texture_captures_become_resource_slots_not_cb_elements() {
        let layout = build_material_descriptor_set(&[texture("albedoMap")]);
        assert!(layout.constant_buffers.is_empty());
        assert_eq!(layout.slots.len(), 1);
        assert_eq!(layout.slots[0].slot_type, SlotType::Texture);
    }

    fn fixed_layout() -> DescriptorSetLayout {
        DescriptorSetLayout {
            slots: vec![
                DescriptorSlot {
                    name: "BasicMaterialConstants".into(),
                    slot_idx: Some(0),
                    slot_type: SlotType::ConstantBuffer,
                    array_count: 1,
                    cb_idx: None,
                    fixed_sampler_idx: None,
                },
                DescriptorSlot {
                    name: "albedoMap".into(),
                    slot_idx: Some(1),
                    slot_type: SlotType::Texture,
                    array_count: 1,
                    cb_idx: None,
                    fixed_sampler_idx: None,
                },
            ],
            constant_buffers: Vec::new(),
            fixed_samplers: Vec::new(),
        }
    }

    #[test]
    fn links_by_name_to_fixed_indices() {
        let built = build_material_descriptor_set(&[scalar("roughness", "float"), texture("albedoMap")]);
        let linked = link_to_fixed_layout(&built, &fixed_layout(), AllowSlotTypeModification::No).unwrap();
        let cb_slot = linked.find_by_name("BasicMaterialConstants").unwrap();
        assert_eq!(cb_slot.slot_idx, Some(0));
        let tex_slot = linked.find_by_name("albedoMap").unwrap();
        assert_eq!(tex_slot.slot_idx, Some(1));
    }

    #[test]
    fn unplaceable_slot_is_a_link_mismatch() {
        let built = build_material_descriptor_set(&[texture("normalMap")]);
        let err = link_to_fixed_layout(&built, &fixed_layout(), AllowSlotTypeModification::No).unwrap_err();
        assert!(matches!(err, ShaderGraphError::LinkMismatch(name) if name == "normalMap"));
    }

    #[test]
    fn unused_fixed_slots_are_copied_through_without_the_escape_hatch() {
        let built = build_material_descriptor_set(&[scalar("roughness", "float")]);
        let linked = link_to_fixed_layout(&built, &fixed_layout(), AllowSlotTypeModification::No).unwrap();
        // `albedoMap` in the fixed layout has no corresponding built slot,
        // but should still appear in the output so the final set matches
        // the pipeline layout's shape.
        assert!(linked.find_by_name("albedoMap").is_some());
    }

    #[test]
    fn unplaceable_slot_gets_fresh_index_with_the_escape_hatch() {
        let built = build_material_descriptor_set(&[texture("normalMap")]);
        let linked = link_to_fixed_layout(&built, &fixed_layout(), AllowSlotTypeModification::Yes).unwrap();
        let slot = linked.find_by_name("normalMap").unwrap();
        assert_eq!(slot.slot_idx, Some(2));
    }

    #[test]
    fn identical_constant_buffers_deduplicate() {
        let mut built = build_material_descriptor_set(&[scalar("roughness", "float")]);
        // A second, content-identical CB with no slot referencing it directly
        // (e.g. contributed by a sibling instantiation sharing the same
        // layout) should still collapse into the first during linking.
        let duplicate_cb = built.constant_buffers[0].clone();
        built.constant_buffers.push(duplicate_cb);
        let linked = link_to_fixed_layout(&built, &fixed_layout(), AllowSlotTypeModification::No).unwrap();
        assert_eq!(linked.constant_buffers.len(), 1);
    }
}

//! Arranges VS/GS/PS shader patches into final HLSL fragments by
//! tracking attribute liveness backwards through the pipeline, then
//! emitting each fragment forwards.
//!
//! [`arrange`] is the single entry point both historical call sites
//! (technique-level and parser-level sprite/auto-pipeline builders)
//! converge on, parameterized by a [`SystemPatchLibrary`] so each keeps
//! its own system-patch set without duplicating the arrangement logic
//! itself.

pub mod arranger;
pub mod error;
pub mod system_patches;
pub mod types;
pub mod writer;

pub use arranger::{arrange_stage, execution_order, ArrangedStage};
pub use error::SpritePipelineError;
pub use system_patches::default_library;
pub use types::{Attribute, PipelineNode, Stage, StagePatch, StageTag, SystemPatch, SystemPatchLibrary};
pub use writer::{render_geometry_fragment, render_linear_fragment, FragmentWriter};

/// The rendered fragments for a fully arranged pipeline: a vertex
/// fragment, an optional geometry fragment (present only if any GS
/// patches were supplied), and a pixel fragment.
#[derive(Debug, Clone)]
pub struct ArrangedPipeline {
    pub vertex_fragment: String,
    pub geometry_fragment: Option<String>,
    pub pixel_fragment: String,
}

/// Arranges and renders a full sprite (or auto) pipeline.
///
/// `patches` is the heterogeneous set of user patches tagged by stage
/// intent; `ia_attributes` are the attributes available from the input
/// assembler; `ps_required_outputs` are the pixel stage's mandatory
/// outputs (typically just `SV_Target`).
///
/// Arrangement runs back to front — pixel stage first, to discover what
/// it needs from the geometry stage (if any), then the geometry stage to
/// discover what it needs from the vertex stage, then the vertex stage
/// against the real IA attributes — mirroring the backwards-liveness
/// process described for a single stage, threaded across stage
/// boundaries. Rendering then runs front to back.
pub fn arrange(
    patches: &[StagePatch],
    ia_attributes: &[Attribute],
    ps_required_outputs: &[Attribute],
    library: &SystemPatchLibrary,
) -> Result<ArrangedPipeline, SpritePipelineError> {
    let vs_patches: Vec<StagePatch> = patches.iter().filter(|p| p.tag.stage() == Stage::Vertex).cloned().collect();
    let gs_patches: Vec<StagePatch> = patches.iter().filter(|p| p.tag.stage() == Stage::Geometry).cloned().collect();
    let ps_patches: Vec<StagePatch> = patches.iter().filter(|p| p.tag.stage() == Stage::Pixel).cloned().collect();

    let ps_arranged = arrange_stage(&ps_patches, ps_required_outputs, &[], library)?;

    let (gs_arranged, vs_required): (Option<ArrangedStage>, Vec<Attribute>) = if gs_patches.is_empty() {
        (None, ps_arranged.required_inputs.clone())
    } else {
        let mut gs_required = ps_arranged.required_inputs.clone();
        // The geometry stage always needs a clip-space position to pass
        // through to the rasterizer; which of its four output vertices
        // that becomes is an emission-time detail of `render_geometry_fragment`,
        // not something the liveness sweep needs to track per-vertex.
        gs_required.push(Attribute::new("SV_Position", "float4"));
        let arranged = arrange_stage(&gs_patches, &gs_required, &[], library)?;
        let vs_required = arranged.required_inputs.clone();
        (Some(arranged), vs_required)
    };

    let vs_arranged = arrange_stage(&vs_patches, &vs_required, ia_attributes, library)?;

    let ia_names: std::collections::BTreeSet<&str> = ia_attributes.iter().map(|a| a.semantic.as_str()).collect();
    let unresolved: Vec<String> = vs_arranged
        .required_inputs
        .iter()
        .filter(|a| !ia_names.contains(a.semantic.as_str()))
        .map(|a| a.semantic.clone())
        .collect();
    if !unresolved.is_empty() {
        return Err(SpritePipelineError::UnresolvedVertexInputs(unresolved));
    }

    let vs_order = execution_order(vs_arranged.nodes, ia_attributes);
    let vertex_fragment = render_linear_fragment("SpriteVS", ia_attributes, &vs_required, &vs_order);

    let geometry_fragment = gs_arranged.map(|gs| {
        let gs_order = execution_order(gs.nodes, &vs_required);
        render_geometry_fragment("SpriteGS", &vs_required, &ps_arranged.required_inputs, &gs_order)
    });

    let ps_inputs = if geometry_fragment.is_some() { ps_arranged.required_inputs.clone() } else { vs_required.clone() };
    let ps_order = execution_order(ps_arranged.nodes, &ps_inputs);
    let pixel_fragment = render_linear_fragment("SpritePS", &ps_inputs, ps_required_outputs, &ps_order);

    Ok(ArrangedPipeline {
        vertex_fragment,
        geometry_fragment,
        pixel_fragment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_stage_pipeline_arranges_and_renders_nonempty_fragments() {
        let patches = vec![
            StagePatch {
                name: "vsMain".into(),
                tag: StageTag::SpriteVs,
                call_expr: "VsMain".into(),
                inputs: vec![Attribute::new("POSITION", "float3"), Attribute::new("COLOR", "float4")],
                outputs: vec![Attribute::new("SV_Position", "float4"), Attribute::new("COLOR", "float4")],
            },
            StagePatch {
                name: "gsMain".into(),
                tag: StageTag::SpriteGs,
                call_expr: "GsMain".into(),
                inputs: vec![Attribute::new("COLOR", "float4")],
                outputs: vec![Attribute::new("COLOR", "float4")],
            },
            StagePatch {
                name: "psMain".into(),
                tag: StageTag::SpritePs,
                call_expr: "PsMain".into(),
                inputs: vec![Attribute::new("COLOR", "float4")],
                outputs: vec![Attribute::new("SV_Target", "float4")],
            },
        ];
        let ia = vec![Attribute::new("POSITION", "float3"), Attribute::new("COLOR", "float4")];
        let ps_required = vec![Attribute::new("SV_Target", "float4")];

        let arranged = arrange(&patches, &ia, &ps_required, &default_library()).unwrap();
        assert!(!arranged.vertex_fragment.is_empty());
        assert!(arranged.geometry_fragment.is_some());
        let gs_fragment = arranged.geometry_fragment.unwrap();
        assert!(gs_fragment.contains("Input"));
        assert!(gs_fragment.contains("Output"));
        assert!(gs_fragment.contains("TriangleStream_Append"));
        assert!(!arranged.pixel_fragment.is_empty());
    }

    #[test]
    fn pipeline_without_geometry_patches_has_no_gs_fragment() {
        let patches = vec![
            StagePatch {
                name: "vsMain".into(),
                tag: StageTag::AutoVs,
                call_expr: "VsMain".into(),
                inputs: vec![Attribute::new("POSITION", "float3")],
                outputs: vec![Attribute::new("SV_Position0", "float4")],
            },
            StagePatch {
                name: "psMain".into(),
                tag: StageTag::AutoPs,
                call_expr: "PsMain".into(),
                inputs: vec![],
                outputs: vec![Attribute::new("SV_Target", "float4")],
            },
        ];
        let ia = vec![Attribute::new("POSITION", "float3")];
        let ps_required = vec![Attribute::new("SV_Target", "float4")];

        let arranged = arrange(&patches, &ia, &ps_required, &default_library()).unwrap();
        assert!(arranged.geometry_fragment.is_none());
    }
}

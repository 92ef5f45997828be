//! The built-in library of system patches the arranger draws on to fill
//! gaps the user's own patches leave unprovided.
//!
//! A small, representative set: enough to cover the common sprite/auto
//! pipeline cases (projecting a world-space position, defaulting an
//! unauthored color or normal) without trying to be an exhaustive shader
//! standard library — callers needing more register their own
//! [`SystemPatch`]es alongside these.

use crate::types::{Attribute, SystemPatch, SystemPatchLibrary};

/// The default system-patch library shared by both historical call sites
/// (technique-level and parser-level sprite/auto-pipeline builders),
/// factored into one value per the recorded Open Question on that
/// duplication.
#[must_use]
pub fn default_library() -> SystemPatchLibrary {
    SystemPatchLibrary::new(vec![
        SystemPatch {
            name: "ProjectPosition".into(),
            call_expr: "ProjectPosition".into(),
            inputs: vec![Attribute::new("POSITION", "float3")],
            outputs: vec![Attribute::new("SV_Position", "float4")],
        },
        SystemPatch {
            name: "DefaultColor".into(),
            call_expr: "DefaultColor".into(),
            inputs: vec![],
            outputs: vec![Attribute::new("COLOR", "float4")],
        },
        SystemPatch {
            name: "DefaultNormal".into(),
            call_expr: "DefaultNormal".into(),
            inputs: vec![],
            outputs: vec![Attribute::new("NORMAL", "float3")],
        },
        SystemPatch {
            name: "DefaultTexCoord".into(),
            call_expr: "DefaultTexCoord".into(),
            inputs: vec![],
            outputs: vec![Attribute::new("TEXCOORD", "float2")],
        },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_library_covers_common_sprite_attributes() {
        let library = default_library();
        let provided: Vec<&str> = library.patches.iter().flat_map(|p| p.outputs.iter().map(|o| o.semantic.as_str())).collect();
        assert!(provided.contains(&"SV_Position"));
        assert!(provided.contains(&"COLOR"));
    }
}

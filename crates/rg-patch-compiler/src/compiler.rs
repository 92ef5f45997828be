//! Orchestrates shader-graph instantiation and descriptor-set linking
//! over a whole patch collection, producing the immutable
//! [`CompiledShaderPatchCollection`] the rest of the engine consumes.

use rg_shader_graph::{
    build_material_descriptor_set, instantiate_shader, link_to_fixed_layout, AllowSlotTypeModification, DescriptorSetLayout,
    GenerateFunctionOptions, GraphProvider, InstantiationRequest,
};

use crate::compiled::CompiledShaderPatchCollection;
use crate::error::PatchCompilerError;

/// Metadata carried alongside a patch collection's own patch list, all
/// optional (the preconfiguration name and per-stage override shaders
/// default to unset).
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub fixed_layout: Option<DescriptorSetLayout>,
    pub allow_slot_type_modification: AllowSlotTypeModification,
    pub generate_options: GenerateFunctionOptions,
    pub preconfiguration: Option<String>,
    pub override_shaders: [Option<String>; 3],
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            fixed_layout: None,
            allow_slot_type_modification: AllowSlotTypeModification::No,
            generate_options: GenerateFunctionOptions::default(),
            preconfiguration: None,
            override_shaders: [None, None, None],
        }
    }
}

/// Compiles `patches` against `provider`, producing the linked,
/// immutable collection. Every entry in `patches` is instantiated as its
/// own root, since every named patch in a collection needs its own
/// scaffold function and curried parameters exposed independently.
pub fn compile(
    patches: &[(String, InstantiationRequest)],
    provider: &dyn GraphProvider,
    options: &CompileOptions,
) -> Result<CompiledShaderPatchCollection, PatchCompilerError> {
    if patches.is_empty() {
        return Err(PatchCompilerError::EmptyCollection);
    }

    let requests: Vec<InstantiationRequest> = patches.iter().map(|(_, r)| r.clone()).collect();
    let instantiated = instantiate_shader(&requests, provider, &options.generate_options)?;

    let material_descriptor_set = match &options.fixed_layout {
        Some(fixed) => {
            let built = build_material_descriptor_set(&instantiated.captures);
            Some(link_to_fixed_layout(&built, fixed, options.allow_slot_type_modification)?)
        }
        None => None,
    };

    Ok(CompiledShaderPatchCollection {
        patches: patches.to_vec(),
        source_fragments: instantiated.source_fragments,
        entry_points: instantiated.entry_points,
        material_descriptor_set,
        filtering_rules: instantiated.selector_relevance,
        preconfiguration: options.preconfiguration.clone(),
        override_shaders: options.override_shaders.clone(),
        depval: instantiated.depval,
    })
}

#[cfg(test)]
mod tests {
    use rg_depval::DependencyValidation;
    use rg_shader_graph::{
        DepFileState, Dependency, GenerateFunctionResult, GraphEdge, NodeGraphSignature, Parameter, ParsedGraph, ProviderError,
        ShaderEntryPoint,
    };

    use super::*;

    struct StubProvider;

    impl GraphProvider for StubProvider {
        fn is_graph_syntax(&self, archive_name: &str) -> bool {
            archive_name.ends_with(".graph::Main")
        }

        fn find_graph(&self, archive_name: &str) -> Result<ParsedGraph, ProviderError> {
            Ok(ParsedGraph {
                name: "Main".to_string(),
                signature: NodeGraphSignature::default(),
                edges: vec![GraphEdge { condition: Some("defined(HAS_FOO)".to_string()) }],
                depval: DependencyValidation::empty(),
                file_state: DepFileState { path: archive_name.to_string() },
            })
        }

        fn find_signature(&self, _archive_name: &str) -> Result<NodeGraphSignature, ProviderError> {
            Ok(NodeGraphSignature::default())
        }

        fn raw_source_file(&self, archive_name: &str) -> Result<DepFileState, ProviderError> {
            Ok(DepFileState { path: archive_name.to_string() })
        }

        fn generate_function(
            &self,
            graph: &ParsedGraph,
            function_name: &str,
            _request: &InstantiationRequest,
            _options: &GenerateFunctionOptions,
        ) -> Result<GenerateFunctionResult, ProviderError> {
            Ok(GenerateFunctionResult {
                source_fragments: vec![format!("void {function_name}() {{}}")],
                entry_point: ShaderEntryPoint {
                    name: function_name.to_string(),
                    signature: graph.signature.clone(),
                    implements_name: String::new(),
                    implements_signature: NodeGraphSignature::default(),
                },
                dependencies: Vec::<Dependency>::new(),
                captures: vec![Parameter::input("MaterialDiffuse", "float3")],
                depval: DependencyValidation::empty(),
                dep_file_states: Vec::new(),
            })
        }
    }

    #[test]
    fn compiles_without_fixed_layout() {
        let patches = vec![("main".to_string(), InstantiationRequest::new("fx.graph::Main"))];
        let compiled = compile(&patches, &StubProvider, &CompileOptions::default()).unwrap();
        assert!(!compiled.source_fragments.is_empty());
        assert!(compiled.material_descriptor_set.is_none());
        assert_eq!(compiled.filtering_rules.get("HAS_FOO"), Some(&"defined(HAS_FOO)".to_string()));
    }

    #[test]
    fn empty_patch_list_is_rejected() {
        let err = compile(&[], &StubProvider, &CompileOptions::default()).unwrap_err();
        assert!(matches!(err, PatchCompilerError::EmptyCollection));
    }

    #[test]
    fn linking_with_a_fixed_layout_produces_a_descriptor_set() {
        use rg_shader_graph::{DescriptorSlot, SlotType};
        let fixed = DescriptorSetLayout {
            slots: vec![DescriptorSlot {
                name: "BasicMaterialConstants".to_string(),
                slot_idx: Some(0),
                slot_type: SlotType::ConstantBuffer,
                array_count: 1,
                cb_idx: None,
                fixed_sampler_idx: None,
            }],
            constant_buffers: Vec::new(),
            fixed_samplers: Vec::new(),
        };
        let patches = vec![("main".to_string(), InstantiationRequest::new("fx.graph::Main"))];
        let options = CompileOptions {
            fixed_layout: Some(fixed),
            ..CompileOptions::default()
        };
        let compiled = compile(&patches, &StubProvider, &options).unwrap();
        assert!(compiled.material_descriptor_set.is_some());
        assert!(compiled.material_descriptor_set.unwrap().find_by_name("BasicMaterialConstants").is_some());
    }
}

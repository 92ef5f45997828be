//! Expanding a request tree into concatenated HLSL source plus the
//! entry points, captures and dependency information that result.
//!
//! A work-stack traversal (LIFO, so dependencies discovered while
//! generating one function are visited before returning to the caller's
//! siblings), deduplicated by `(archive name, instance hash)`, with
//! captures merged across the whole tree and selector relevance scanned
//! out of each graph's parsed edges as it is visited.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use rg_depval::DependencyValidation;

use crate::error::ShaderGraphError;
use crate::fingerprint::InstantiationRequest;
use crate::provider::{DepFileState, GenerateFunctionOptions, GraphEdge, GraphProvider, NodeGraphSignature, Parameter, ShaderEntryPoint};

/// The fully-expanded result of instantiating one or more shader-graph
/// requests.
#[derive(Debug, Clone, Default)]
pub struct InstantiatedShader {
    /// Generated source, in dependency order (leaves first), with a
    /// composite `#include` fragment prepended.
    pub source_fragments: Vec<String>,
    /// One entry per root request (fixed shaders get one; a raw include
    /// used as a root contributes its own declared signature).
    pub entry_points: Vec<ShaderEntryPoint>,
    /// Every capture merged across the whole tree, ready for
    /// [`crate::descriptor_link::build_material_descriptor_set`].
    pub captures: Vec<Parameter>,
    /// Preprocessor selector name to one governing `defined(...)`
    /// condition text, scanned out of every visited graph's edges.
    pub selector_relevance: BTreeMap<String, String>,
    pub raw_shader_includes: BTreeSet<String>,
    pub depval: DependencyValidation,
    pub dep_file_states: BTreeSet<DepFileState>,
}

impl InstantiatedShader {
    #[must_use]
    pub fn source_text(&self) -> String {
        self.source_fragments.join("\n\n")
    }
}

struct PendingInstantiation {
    request: InstantiationRequest,
    is_root: bool,
    use_scaffold: bool,
}

/// Instantiates a single root graph, with explicit control over whether a
/// curried-parameter scaffold function is emitted.
pub fn instantiate_single(
    request: &InstantiationRequest,
    use_scaffold: bool,
    provider: &dyn GraphProvider,
    options: &GenerateFunctionOptions,
) -> Result<InstantiatedShader, ShaderGraphError> {
    instantiate_many(std::slice::from_ref(request), use_scaffold, provider, options)
}

/// Instantiates every request in `requests` as its own root, always
/// emitting a scaffold function. Used by the patch-collection compiler,
/// where every patch needs its curried parameters exposed to the caller.
pub fn instantiate_shader(
    requests: &[InstantiationRequest],
    provider: &dyn GraphProvider,
    options: &GenerateFunctionOptions,
) -> Result<InstantiatedShader, ShaderGraphError> {
    instantiate_many(requests, true, provider, options)
}

fn instantiate_many(
    requests: &[InstantiationRequest],
    root_use_scaffold: bool,
    provider: &dyn GraphProvider,
    options: &GenerateFunctionOptions,
) -> Result<InstantiatedShader, ShaderGraphError> {
    let mut stack: Vec<PendingInstantiation> = requests
        .iter()
        .map(|r| PendingInstantiation {
            request: r.clone(),
            is_root: true,
            use_scaffold: root_use_scaffold,
        })
        .collect();

    let mut seen: HashSet<(String, u64)> = HashSet::new();
    let mut generated_fragments: Vec<String> = Vec::new();
    let mut entry_points: Vec<ShaderEntryPoint> = Vec::new();
    let mut raw_includes: BTreeSet<String> = BTreeSet::new();
    let mut captures: Vec<Parameter> = Vec::new();
    let mut depval = DependencyValidation::empty();
    let mut dep_file_states: BTreeSet<DepFileState> = BTreeSet::new();
    let mut selector_relevance: BTreeMap<String, String> = BTreeMap::new();

    while let Some(item) = stack.pop() {
        if provider.is_graph_syntax(&item.request.archive_name) {
            let instance_hash = item.request.instance_hash();
            if !seen.insert((item.request.archive_name.clone(), instance_hash)) {
                continue;
            }

            let graph = provider.find_graph(&item.request.archive_name)?;
            depval = depval.union(&graph.depval);
            dep_file_states.insert(graph.file_state.clone());
            extract_selector_relevance(&mut selector_relevance, &graph.edges);

            let public_name = format!("{}_{:016x}", graph.name, instance_hash);
            let generated_name = if item.use_scaffold {
                format!("{public_name}_impl")
            } else {
                public_name.clone()
            };

            let generated = provider.generate_function(&graph, &generated_name, &item.request, options)?;

            depval = depval.union(&generated.depval);
            dep_file_states.extend(generated.dep_file_states.iter().cloned());
            merge_captures(&mut captures, &generated.captures)?;
            generated_fragments.extend(generated.source_fragments.iter().cloned());

            let mut entry = generated.entry_point.clone();
            if item.use_scaffold {
                let scaffold_signature = scaffold_signature_for(&entry.signature, &item.request);
                generated_fragments.push(render_scaffold_function(&public_name, &generated_name, &scaffold_signature));
                entry.signature = scaffold_signature;
            }
            entry.name = public_name;

            if item.is_root {
                entry_points.push(entry);
            }

            for dep in generated.dependencies {
                stack.push(PendingInstantiation {
                    request: dep.instantiation,
                    is_root: false,
                    use_scaffold: false,
                });
            }
        } else {
            let file_state = provider.raw_source_file(&item.request.archive_name)?;
            raw_includes.insert(file_state.path.clone());
            dep_file_states.insert(file_state);

            if item.is_root {
                entry_points.push(raw_entry_point(provider, &item.request)?);
            }
        }
    }

    generated_fragments.reverse();
    let mut source_fragments = Vec::with_capacity(generated_fragments.len() + 1);
    source_fragments.push(composite_include_fragment(&raw_includes));
    source_fragments.extend(generated_fragments);

    Ok(InstantiatedShader {
        source_fragments,
        entry_points,
        captures,
        selector_relevance,
        raw_shader_includes: raw_includes,
        depval,
        dep_file_states,
    })
}

fn raw_entry_point(provider: &dyn GraphProvider, request: &InstantiationRequest) -> Result<ShaderEntryPoint, ShaderGraphError> {
    let signature = provider.find_signature(&request.archive_name)?;
    let (implements_name, implements_signature) = if request.implements_archive_name.is_empty() {
        (String::new(), NodeGraphSignature::default())
    } else {
        let implements_signature = provider.find_signature(&request.implements_archive_name)?;
        (request.implements_archive_name.clone(), implements_signature)
    };
    Ok(ShaderEntryPoint {
        name: request.archive_name.clone(),
        signature,
        implements_name,
        implements_signature,
    })
}

/// Builds the scaffold function's exposed signature: the generated
/// function's own signature, plus one parameter per curried binding the
/// request asked for, named `curried_<binding>_<param>` and copied from
/// whatever the generated function actually declared under that name.
fn scaffold_signature_for(generated_signature: &NodeGraphSignature, request: &InstantiationRequest) -> NodeGraphSignature {
    let mut signature = generated_signature.clone();
    for (binding_name, child) in &request.parameter_bindings {
        for curried in &child.curried_params {
            let curried_name = format!("curried_{binding_name}_{curried}");
            if let Some(param) = generated_signature.find(&curried_name) {
                signature.parameters.push(param.clone());
            }
        }
    }
    signature
}

fn render_scaffold_function(public_name: &str, impl_name: &str, signature: &NodeGraphSignature) -> String {
    let params = signature
        .parameters
        .iter()
        .map(|p| format!("{} {}", p.type_name, p.name))
        .collect::<Vec<_>>()
        .join(", ");
    let args = signature.parameters.iter().map(|p| p.name.clone()).collect::<Vec<_>>().join(", ");
    format!("void {public_name}({params})\n{{\n    {impl_name}({args});\n}}")
}

fn merge_captures(into: &mut Vec<Parameter>, additions: &[Parameter]) -> Result<(), ShaderGraphError> {
    for addition in additions {
        if let Some(existing) = into.iter().find(|e| e.name == addition.name) {
            if existing.type_name != addition.type_name || existing.direction != addition.direction {
                return Err(ShaderGraphError::CaptureConflict {
                    name: addition.name.clone(),
                    existing_type: existing.type_name.clone(),
                    new_type: addition.type_name.clone(),
                });
            }
        } else {
            into.push(addition.clone());
        }
    }
    Ok(())
}

fn extract_selector_relevance(map: &mut BTreeMap<String, String>, edges: &[GraphEdge]) {
    for edge in edges {
        if let Some(condition) = &edge.condition {
            for ident in find_defined_idents(condition) {
                map.entry(ident).or_insert_with(|| condition.clone());
            }
        }
    }
}

/// Scans `expr` for `defined(X)` preprocessor tokens and returns the `X`
/// identifiers found, in order. This is token scanning, not expression
/// evaluation: the crate does not attempt to re-derive the preprocessor
/// language, only to collect which selectors a graph's edges are
/// conditioned on.
fn find_defined_idents(expr: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = expr;
    while let Some(pos) = rest.find("defined(") {
        let after = &rest[pos + "defined(".len()..];
        match after.find(')') {
            Some(end) => {
                out.push(after[..end].trim().to_string());
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    out
}

/// Produces the canonical, sorted, semicolon-joined defines table used to
/// key a shader variation cache: only selectors that both appear in
/// `relevance` (i.e. some graph edge actually conditions on them) and are
/// currently set in `selectors` survive.
#[must_use]
pub fn filtered_defines_table(relevance: &BTreeMap<String, String>, selectors: &BTreeMap<String, String>) -> String {
    let mut names: Vec<&str> = relevance.keys().filter(|name| selectors.contains_key(name.as_str())).map(String::as_str).collect();
    names.sort_unstable();
    names.join(";")
}

fn composite_include_fragment(raw_includes: &BTreeSet<String>) -> String {
    let mut text = String::from("// auto-generated include aggregation\n");
    for path in raw_includes {
        text.push_str(&format!("#include \"{path}\"\n"));
    }
    text
}

//! Forward HLSL emission from an arranged execution order.
//!
//! `FragmentWriter` tracks which attributes are currently available as
//! local variables ("working attributes"), emits one call per node with
//! per-parameter casts or defaults for whatever doesn't line up exactly,
//! and assigns final outputs at the end.

use std::collections::BTreeMap;

use crate::types::{Attribute, PipelineNode};

struct WorkingAttribute {
    var_name: String,
    type_name: String,
}

/// Emits the HLSL body of one arranged stage fragment.
pub struct FragmentWriter {
    working: BTreeMap<String, WorkingAttribute>,
    lines: Vec<String>,
    next_id: u32,
}

impl FragmentWriter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            working: BTreeMap::new(),
            lines: Vec::new(),
            next_id: 0,
        }
    }

    fn fresh_name(&mut self, semantic: &str) -> String {
        self.next_id += 1;
        format!("{}_{}", semantic.to_lowercase(), self.next_id)
    }

    /// Registers `attr` as already available under a freshly-named
    /// local, as happens for a vertex stage's IA inputs or a later
    /// stage's inherited previous-stage outputs. Returns the local's
    /// name so the caller can emit the parameter/struct-field
    /// declaration that feeds it.
    pub fn seed_input(&mut self, attr: &Attribute) -> String {
        let var_name = self.fresh_name(&attr.semantic);
        self.working.insert(
            attr.semantic.clone(),
            WorkingAttribute {
                var_name: var_name.clone(),
                type_name: attr.type_name.clone(),
            },
        );
        var_name
    }

    fn resolve_argument(&self, wanted: &Attribute) -> String {
        match self.working.get(&wanted.semantic) {
            Some(w) if w.type_name == wanted.type_name => w.var_name.clone(),
            Some(w) => format!("Cast_{}_to_{}({})", w.type_name, wanted.type_name, w.var_name),
            None => format!("DefaultValue_{}()", wanted.type_name),
        }
    }

    /// Emits one call for `node`, resolving each of its declared inputs
    /// against the current working set (casting or defaulting as
    /// needed) and registering its outputs as new working locals.
    pub fn emit_node(&mut self, node: &PipelineNode) {
        let args: Vec<String> = node.inputs().iter().map(|i| self.resolve_argument(i)).collect();

        let mut out_decls = Vec::new();
        let mut out_names = Vec::new();
        for output in node.outputs() {
            let var_name = self.fresh_name(&output.semantic);
            out_decls.push(format!("{} {}", output.type_name, var_name));
            out_names.push(var_name.clone());
            self.working.insert(
                output.semantic.clone(),
                WorkingAttribute {
                    var_name,
                    type_name: output.type_name.clone(),
                },
            );
        }

        if !out_decls.is_empty() {
            self.lines.push(format!("{};", out_decls.join("; ")));
        }

        let all_args: Vec<String> = args.into_iter().chain(out_names).collect();
        self.lines.push(format!("{}({});", node.call_expr(), all_args.join(", ")));
    }

    /// Resolves each of `outputs` against the current working set,
    /// producing `(semantic, expression)` pairs ready to assign into a
    /// stage's output struct.
    pub fn resolve_outputs(&self, outputs: &[Attribute]) -> Vec<(String, String)> {
        outputs.iter().map(|o| (o.semantic.clone(), self.resolve_argument(o))).collect()
    }

    #[must_use]
    pub fn finish(self) -> Vec<String> {
        self.lines
    }
}

impl Default for FragmentWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders one VS or PS fragment: a function taking `inputs` and
/// producing `outputs`, running `order` (already topologically sorted)
/// in between.
#[must_use]
pub fn render_linear_fragment(function_name: &str, inputs: &[Attribute], outputs: &[Attribute], order: &[PipelineNode]) -> String {
    let mut writer = FragmentWriter::new();
    let mut params = Vec::new();
    for input in inputs {
        let var = writer.seed_input(input);
        params.push(format!("{} {}", input.type_name, var));
    }
    for node in order {
        writer.emit_node(node);
    }
    let assignments = writer.resolve_outputs(outputs);
    let mut body = writer.finish();
    let return_decls: Vec<String> = outputs.iter().map(|o| format!("{} {};", o.type_name, o.semantic)).collect();
    for (semantic, expr) in &assignments {
        body.push(format!("{semantic} = {expr};"));
    }
    let body_text = body.iter().map(|l| format!("    {l}")).collect::<Vec<_>>().join("\n");
    format!(
        "void {function_name}({params})\n{{\n{decls}\n{body}\n}}",
        params = params.join(", "),
        decls = return_decls.iter().map(|l| format!("    {l}")).collect::<Vec<_>>().join("\n"),
        body = body_text,
    )
}

/// Renders the geometry-shader fragment: explicit input/output struct
/// declarations plus a body running `order` per input vertex and
/// appending four output vertices.
#[must_use]
pub fn render_geometry_fragment(function_name: &str, inputs: &[Attribute], outputs: &[Attribute], order: &[PipelineNode]) -> String {
    let input_struct = format!(
        "struct {function_name}Input\n{{\n{}\n}};",
        inputs.iter().map(|a| format!("    {} {};", a.type_name, a.semantic)).collect::<Vec<_>>().join("\n")
    );
    let output_struct = format!(
        "struct {function_name}Output\n{{\n{}\n}};",
        outputs.iter().map(|a| format!("    {} {};", a.type_name, a.semantic)).collect::<Vec<_>>().join("\n")
    );

    let mut writer = FragmentWriter::new();
    for input in inputs {
        writer.seed_input(input);
    }
    for node in order {
        writer.emit_node(node);
    }
    let assignments = writer.resolve_outputs(outputs);
    let mut body = writer.finish();
    body.push(format!("{function_name}Output result;"));
    for (semantic, expr) in &assignments {
        body.push(format!("result.{semantic} = {expr};"));
    }
    body.push("TriangleStream_Append(result);".to_string());
    let body_text = body.iter().map(|l| format!("    {l}")).collect::<Vec<_>>().join("\n");

    format!(
        "{input_struct}\n\n{output_struct}\n\nvoid {function_name}(triangle {function_name}Input input[3])\n{{\n{b}\n{b}\n{b}\n{b}\n}}",
        b = body_text,
    )
}

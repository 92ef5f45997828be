//! Backwards attribute-liveness arrangement for one pipeline stage.
//!
//! A two-phase approach: first a backwards sweep over the stage's
//! declared patches decides which are actually needed (a patch is live
//! iff something downstream still wants one of its outputs), then a
//! bounded iterative pass pulls in [`SystemPatch`]es from the library to
//! cover whatever the user's own patches still leave unprovided.
//! Whatever neither the stage's own patches nor the library can provide
//! is reported back as [`ArrangedStage::required_inputs`] — not a
//! failure at this level, since it may yet be satisfiable by whichever
//! stage feeds this one (the top-level [`crate::arrange`] is what
//! finally checks the vertex stage's leftovers against the real IA
//! attribute set).

use std::collections::BTreeMap;

use crate::error::SpritePipelineError;
use crate::types::{Attribute, PipelineNode, StagePatch, SystemPatchLibrary};

/// The maximum number of system-patch insertion rounds before arrangement
/// is considered non-convergent.
const MAX_SYSTEM_PATCH_ITERATIONS: u32 = 32;

/// The result of arranging one stage: the nodes that must run (user
/// patches in their original relative order, system patches appended),
/// plus the attributes this stage still needs from whatever feeds it.
#[derive(Debug, Clone)]
pub struct ArrangedStage {
    pub nodes: Vec<PipelineNode>,
    pub required_inputs: Vec<Attribute>,
}

fn as_map(attrs: &[Attribute]) -> BTreeMap<String, Attribute> {
    attrs.iter().map(|a| (a.semantic.clone(), a.clone())).collect()
}

/// Arranges a single stage's patches.
pub fn arrange_stage(
    steps: &[StagePatch],
    required_outputs: &[Attribute],
    ia_attributes: &[Attribute],
    library: &SystemPatchLibrary,
) -> Result<ArrangedStage, SpritePipelineError> {
    let ia_map = as_map(ia_attributes);
    let mut active: BTreeMap<String, Attribute> = as_map(required_outputs);
    let mut enabled = vec![false; steps.len()];

    for i in (0..steps.len()).rev() {
        let step = &steps[i];
        let writes_active = step.outputs.iter().any(|o| active.contains_key(&o.semantic) || o.is_system_value());
        if writes_active {
            enabled[i] = true;
            // Drop outputs first, then add inputs: a step whose input
            // and output share a semantic (e.g. modifying `COLOR` in
            // place) must still leave that semantic active afterwards,
            // since something further back still has to supply it.
            for output in &step.outputs {
                active.remove(&output.semantic);
            }
            for input in &step.inputs {
                active.entry(input.semantic.clone()).or_insert_with(|| input.clone());
            }
        }
    }

    let mut produced: BTreeMap<String, Attribute> = BTreeMap::new();
    for (step, on) in steps.iter().zip(&enabled) {
        if *on {
            for output in &step.outputs {
                produced.insert(output.semantic.clone(), output.clone());
            }
        }
    }

    let mut inserted: Vec<crate::types::SystemPatch> = Vec::new();
    let mut iterations = 0;
    loop {
        let mut satisfied = ia_map.clone();
        satisfied.extend(produced.iter().map(|(k, v)| (k.clone(), v.clone())));
        for patch in &inserted {
            for output in &patch.outputs {
                satisfied.insert(output.semantic.clone(), output.clone());
            }
        }

        let unsatisfied: Vec<Attribute> = active.values().filter(|a| !satisfied.contains_key(&a.semantic)).cloned().collect();
        if unsatisfied.is_empty() {
            break;
        }

        let unsatisfied_names: Vec<&str> = unsatisfied.iter().map(|a| a.semantic.as_str()).collect();
        let mut candidates: Vec<(usize, i64, i64)> = Vec::new();
        for (idx, candidate) in library.patches.iter().enumerate() {
            if inserted.iter().any(|p| p.name == candidate.name) {
                continue;
            }
            if !candidate.outputs.iter().any(|o| unsatisfied_names.contains(&o.semantic.as_str())) {
                continue;
            }
            let matched = candidate.inputs.iter().filter(|i| satisfied.contains_key(&i.semantic)).count() as i64;
            let unmatched = candidate.inputs.len() as i64 - matched;
            candidates.push((idx, matched, unmatched));
        }

        if candidates.is_empty() {
            // Nothing in the library can help with what's left; stop
            // making progress here rather than spin. The leftover is
            // handed back as `required_inputs`.
            break;
        }

        if iterations >= MAX_SYSTEM_PATCH_ITERATIONS {
            return Err(SpritePipelineError::ConvergenceFailed {
                iterations,
                missing: unsatisfied.into_iter().map(|a| a.semantic).collect(),
            });
        }
        iterations += 1;

        candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)).then(a.0.cmp(&b.0)));
        let chosen = library.patches[candidates[0].0].clone();
        for input in &chosen.inputs {
            active.entry(input.semantic.clone()).or_insert_with(|| input.clone());
        }
        inserted.push(chosen);
    }

    let mut nodes: Vec<PipelineNode> = steps
        .iter()
        .zip(enabled)
        .filter(|(_, on)| *on)
        .map(|(s, _)| PipelineNode::Stage(s.clone()))
        .collect();
    nodes.extend(inserted.iter().cloned().map(PipelineNode::System));

    let required_inputs: Vec<Attribute> = active
        .into_values()
        .filter(|a| !produced.contains_key(&a.semantic) && !inserted.iter().any(|p| p.outputs.iter().any(|o| o.semantic == a.semantic)))
        .collect();
    Ok(ArrangedStage { nodes, required_inputs })
}

/// Orders `nodes` so that every node runs after everything it consumes
/// has been produced (by an earlier node, or by `ia_attributes`). Ties
/// are broken by position in `nodes` (the first still-runnable node
/// wins), which keeps user patches close to their declared order and
/// places inserted system patches just ahead of their first consumer —
/// the forward analogue of "insert at the latest legal position" from
/// arrangement.
#[must_use]
pub fn execution_order(nodes: Vec<PipelineNode>, ia_attributes: &[Attribute]) -> Vec<PipelineNode> {
    let mut remaining: Vec<PipelineNode> = nodes;
    let mut satisfied: BTreeMap<String, ()> = ia_attributes.iter().map(|a| (a.semantic.clone(), ())).collect();
    let mut ordered = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let pos = remaining
            .iter()
            .position(|n| n.inputs().iter().all(|i| satisfied.contains_key(&i.semantic)))
            .unwrap_or(0);
        let node = remaining.remove(pos);
        for output in node.outputs() {
            satisfied.insert(output.semantic.clone(), ());
        }
        ordered.push(node);
    }
    ordered
}

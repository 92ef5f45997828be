//! Patch and attribute types shared by the arranger and the writer.

/// One attribute flowing between pipeline stages, named by its HLSL
/// semantic (`POSITION`, `COLOR`, `SV_Position`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub semantic: String,
    pub type_name: String,
}

impl Attribute {
    #[must_use]
    pub fn new(semantic: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            semantic: semantic.into(),
            type_name: type_name.into(),
        }
    }

    #[must_use]
    pub fn is_system_value(&self) -> bool {
        self.semantic.starts_with("SV_")
    }
}

/// Which stage (and sub-role within that stage) a patch is tagged for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageTag {
    SpriteVs,
    SpriteGs,
    SpriteGsPredicate,
    SpritePs,
    AutoVs,
    AutoPs,
}

impl StageTag {
    #[must_use]
    pub fn stage(self) -> Stage {
        match self {
            StageTag::SpriteVs | StageTag::AutoVs => Stage::Vertex,
            StageTag::SpriteGs | StageTag::SpriteGsPredicate => Stage::Geometry,
            StageTag::SpritePs | StageTag::AutoPs => Stage::Pixel,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Vertex,
    Geometry,
    Pixel,
}

/// A single user-authored shader fragment tagged for a pipeline stage,
/// declaring what attributes it reads and writes.
#[derive(Debug, Clone)]
pub struct StagePatch {
    pub name: String,
    pub tag: StageTag,
    pub call_expr: String,
    pub inputs: Vec<Attribute>,
    pub outputs: Vec<Attribute>,
}

/// A built-in library entry capable of synthesizing one or more
/// attributes from others already available, used to fill gaps the
/// user's own patches leave unfilled (e.g. deriving a default color from
/// nothing, or a normal from a tangent frame).
#[derive(Debug, Clone)]
pub struct SystemPatch {
    pub name: String,
    pub call_expr: String,
    pub inputs: Vec<Attribute>,
    pub outputs: Vec<Attribute>,
}

/// The pool of [`SystemPatch`]es the arranger may draw on to fill
/// unprovided attributes. Factored as an explicit value, shared by every
/// call site, rather than duplicated per caller as a set of hard-coded
/// builder functions.
#[derive(Debug, Clone, Default)]
pub struct SystemPatchLibrary {
    pub patches: Vec<SystemPatch>,
}

impl SystemPatchLibrary {
    #[must_use]
    pub fn new(patches: Vec<SystemPatch>) -> Self {
        Self { patches }
    }
}

/// A step in an arranged stage's execution order: either a user stage
/// patch or a system patch inserted to satisfy a gap.
#[derive(Debug, Clone)]
pub enum PipelineNode {
    Stage(StagePatch),
    System(SystemPatch),
}

impl PipelineNode {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            PipelineNode::Stage(s) => &s.name,
            PipelineNode::System(s) => &s.name,
        }
    }

    #[must_use]
    pub fn call_expr(&self) -> &str {
        match self {
            PipelineNode::Stage(s) => &s.call_expr,
            PipelineNode::System(s) => &s.call_expr,
        }
    }

    #[must_use]
    pub fn inputs(&self) -> &[Attribute] {
        match self {
            PipelineNode::Stage(s) => &s.inputs,
            PipelineNode::System(s) => &s.inputs,
        }
    }

    #[must_use]
    pub fn outputs(&self) -> &[Attribute] {
        match self {
            PipelineNode::Stage(s) => &s.outputs,
            PipelineNode::System(s) => &s.outputs,
        }
    }
}

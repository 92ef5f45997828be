//! Error type for sprite-pipeline arrangement.

#[derive(Debug, thiserror::Error)]
pub enum SpritePipelineError {
    #[error("sprite pipeline arrangement did not converge after {iterations} iterations; still missing: {missing:?}")]
    ConvergenceFailed { iterations: u32, missing: Vec<String> },

    #[error("vertex stage requires attributes not present in the input assembler: {0:?}")]
    UnresolvedVertexInputs(Vec<String>),
}

//! Pipeline-level view over stage introspections.
//!
//! [`PipelineIntrospection`] merges the [`StageIntrospectionResult`]s of the
//! stages of one pipeline, checking that every `(set, binding)` is used
//! consistently, and derives descriptor-set and pipeline layout
//! descriptions from the merged state.
//!
//! [`StageIntrospectionResult`]: spvi_ir::StageIntrospectionResult

mod aggregate;
mod compute;
mod layout;

pub use aggregate::{MAX_PUSH_CONSTANTS_SIZE, PipelineIntrospection};
pub use compute::approximate_compute_pipeline;
pub use layout::{
    BindingShape, ComputePipelineDesc, DescriptorSetLayoutDesc, LayoutBinding,
    PipelineLayoutDesc, PushConstantRange,
};

use spvi_ir::{IrError, ShaderStage, SpecValue};

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum MergeError {
    #[error("set {set} binding {binding}: {stage} uses {incoming}, earlier stages use {existing}")]
    Conflict {
        set: u32,
        binding: u32,
        stage: ShaderStage,
        existing: BindingShape,
        incoming: BindingShape,
    },
    #[error("{what} depends on specialization constant {id}, which has no value")]
    UnresolvedSpecialization { id: u32, what: String },
    #[error("specialization constant {id} = {value} is not a valid count")]
    InvalidSpecialization { id: u32, value: SpecValue },
    #[error("push constants end at byte {end}, past the limit of {limit}")]
    PushConstantsOutOfRange { end: u32, limit: u32 },
    #[error(transparent)]
    Ir(#[from] IrError),
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum PipelineError {
    #[error("expected a compute stage, got {0}")]
    NotCompute(ShaderStage),
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error("pipeline layout does not match the shader: {0}")]
    LayoutMismatch(String),
}

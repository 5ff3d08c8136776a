//! Shader introspection data model.
//!
//! A stage introspection produces a [`StageIntrospectionResult`]: descriptor
//! bindings, push constants, interfaces and specialization constants, with
//! every type tree stored in a relocatable [`TypeArena`].

pub mod arena;
mod descriptor;
mod display;
mod error;
mod interface;
mod result;
mod shader;
mod spec;
mod stage;
mod types;

pub use arena::{ArenaId, Span, TypeArena};
pub use descriptor::{
    DescriptorBinding, DescriptorKind, DescriptorPayload, ImageInfo, ImageViewType,
    StorageBufferBlock, StorageFormat,
};
pub use display::dump_stage;
pub use error::IrError;
pub use interface::{FragmentOutput, InputInterface, OutputInterface, Outputs};
pub use result::{MAX_DESCRIPTOR_SETS, PushConstantBlock, StageIntrospectionResult, StageParts};
pub use shader::{ContentType, IntrospectionParams, ShaderModule};
pub use spec::{SpecConstant, SpecValue, SpecializationMap, WorkgroupSize};
pub use stage::{ShaderStage, ShaderStages};
pub use types::{ArrayInfo, Member, MemoryBlock, MemoryLayout, Qualifiers, TypeInfo, VarType};

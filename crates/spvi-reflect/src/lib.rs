//! SPIR-V stage introspection.
//!
//! Decodes a SPIR-V binary with [rspirv](https://crates.io/crates/rspirv)
//! and extracts everything a pipeline layout needs from one entry point:
//! descriptor bindings, the push-constant block, stage interfaces,
//! specialization constants and the workgroup size. The result is a
//! self-contained [`StageIntrospectionResult`] backed by its own
//! [`spvi_ir::TypeArena`].

pub mod decode;
mod interface;
mod layout;
mod resources;
mod spec;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
mod typegraph;
mod usage;

use spvi_ir::{
    ContentType, IntrospectionParams, MemoryLayout, ShaderStage, StageIntrospectionResult,
    StageParts,
};

use crate::decode::SpirvModule;

/// Layout conventions and limits used when building type trees.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct IntrospectionOptions {
    /// Convention for uniform-buffer members without `Offset` decorations.
    pub uniform_layout: MemoryLayout,
    /// Convention for storage-buffer members without `Offset` decorations.
    pub storage_layout: MemoryLayout,
    /// Convention for push-constant members without `Offset` decorations.
    pub push_constant_layout: MemoryLayout,
    /// Deepest struct nesting accepted before the input is rejected.
    pub max_type_depth: usize,
}

impl Default for IntrospectionOptions {
    fn default() -> Self {
        Self {
            uniform_layout: MemoryLayout::Std140,
            storage_layout: MemoryLayout::Std430,
            push_constant_layout: MemoryLayout::Std430,
            max_type_depth: 64,
        }
    }
}

/// Errors produced while introspecting a shader stage.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum IntrospectionError {
    /// The shader is not a SPIR-V binary.
    #[error("cannot introspect {0} shaders; compile to SPIR-V first")]
    ContentType(ContentType),
    /// The bytes are not a well-formed SPIR-V module.
    #[error("SPIR-V decode failed: {0}")]
    Decode(String),
    /// No entry point has the requested name and execution model.
    #[error("no {stage} entry point named '{name}'")]
    EntryPointNotFound { name: String, stage: ShaderStage },
    /// The module decodes but breaks a structural rule.
    #[error("malformed input: {0}")]
    MalformedInput(String),
    /// Two resources of one entry point share a descriptor slot.
    #[error("set {set} binding {binding} is used by both '{first}' and '{second}'")]
    AmbiguousBinding {
        set: u32,
        binding: u32,
        first: String,
        second: String,
    },
    /// A resource type with no descriptor mapping, such as an acceleration structure.
    #[error("'{name}' is a {kind}, which has no descriptor mapping")]
    UnsupportedResourceKind { name: String, kind: String },
    /// A resource lives in a set at or beyond [`spvi_ir::MAX_DESCRIPTOR_SETS`].
    #[error("'{name}' uses descriptor set {set}; at most {max} sets are supported", max = spvi_ir::MAX_DESCRIPTOR_SETS)]
    SetOutOfRange { name: String, set: u32 },
}

/// Extracts a [`StageIntrospectionResult`] from one entry point of a shader.
#[derive(Clone, Debug, Default)]
pub struct Introspector {
    options: IntrospectionOptions,
}

impl Introspector {
    pub fn new(options: IntrospectionOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &IntrospectionOptions {
        &self.options
    }

    /// Decodes `params.shader` and introspects `params.entry_point`.
    pub fn introspect(
        &self,
        params: &IntrospectionParams,
    ) -> Result<StageIntrospectionResult, IntrospectionError> {
        let content_type = params.shader.content_type();
        if content_type != ContentType::Spirv {
            return Err(IntrospectionError::ContentType(content_type));
        }
        let module = SpirvModule::parse(params.shader.code())?;
        self.introspect_module(&module, params)
    }

    /// Introspects an already decoded module. `params` names the entry point
    /// and becomes the result's key; its code is not decoded again.
    pub fn introspect_module(
        &self,
        module: &SpirvModule,
        params: &IntrospectionParams,
    ) -> Result<StageIntrospectionResult, IntrospectionError> {
        let stage = params.stage;
        let entry = module
            .find_entry_point(&params.entry_point, stage)
            .ok_or_else(|| IntrospectionError::EntryPointNotFound {
                name: params.entry_point.clone(),
                stage,
            })?;
        log::debug!("introspecting {params}");

        let used = usage::statically_used(module, entry);
        let mut parts = StageParts::default();
        spec::collect(module, &mut parts)?;
        interface::collect(module, entry, &used, stage, &mut parts)?;
        resources::collect(module, &used, &self.options, &mut parts)?;
        if stage.has_workgroups() {
            parts.workgroup_size = spec::workgroup_size(module, entry)?;
        }

        let result = StageIntrospectionResult::from_parts(params.clone(), parts);
        log::debug!(
            "{params}: {} bindings, push constants: {}",
            result.bindings().count(),
            result.push_constants().present
        );
        Ok(result)
    }
}

/// Introspects with default options.
pub fn introspect(
    params: &IntrospectionParams,
) -> Result<StageIntrospectionResult, IntrospectionError> {
    Introspector::default().introspect(params)
}

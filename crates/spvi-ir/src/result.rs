//! The immutable, self-contained description of one introspected stage.

use crate::arena::{Span, TypeArena};
use crate::descriptor::DescriptorBinding;
use crate::interface::{InputInterface, Outputs};
use crate::shader::IntrospectionParams;
use crate::spec::{SpecConstant, WorkgroupSize};
use crate::types::{ArrayInfo, MemoryBlock};

/// Number of descriptor sets a stage may use.
pub const MAX_DESCRIPTOR_SETS: usize = 4;

/// A stage's push-constant block.
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq)]
pub struct PushConstantBlock {
    /// `false` if the stage declares no push constants.
    pub present: bool,
    pub name: Span<str>,
    /// Lowest member offset.
    pub offset: u32,
    pub block: MemoryBlock,
}

/// Everything a stage introspection produces, before ordering is enforced.
#[derive(Clone, Debug, Default)]
pub struct StageParts {
    pub arena: TypeArena,
    pub spec_constants: Vec<SpecConstant>,
    pub inputs: Vec<InputInterface>,
    pub outputs: Outputs,
    pub descriptor_sets: [Vec<DescriptorBinding>; MAX_DESCRIPTOR_SETS],
    pub push_constants: PushConstantBlock,
    pub workgroup_size: Option<WorkgroupSize>,
}

/// Introspection result for one `(shader, entry point, stage)`.
///
/// Spec constants are sorted by id, interfaces by location and each
/// descriptor set by binding index. All spans resolve against
/// [`arena`](Self::arena).
#[derive(Clone, Debug, PartialEq)]
pub struct StageIntrospectionResult {
    params: IntrospectionParams,
    arena: TypeArena,
    spec_constants: Vec<SpecConstant>,
    inputs: Vec<InputInterface>,
    outputs: Outputs,
    descriptor_sets: [Vec<DescriptorBinding>; MAX_DESCRIPTOR_SETS],
    push_constants: PushConstantBlock,
    workgroup_size: Option<WorkgroupSize>,
}

impl StageIntrospectionResult {
    /// Assembles a result, putting every list into its canonical order.
    pub fn from_parts(params: IntrospectionParams, parts: StageParts) -> Self {
        let StageParts {
            arena,
            mut spec_constants,
            mut inputs,
            mut outputs,
            mut descriptor_sets,
            push_constants,
            workgroup_size,
        } = parts;

        spec_constants.sort_by_key(|c| c.id);
        inputs.sort_by_key(|i| (i.location, i.component));
        match &mut outputs {
            Outputs::Fragment(list) => list.sort_by_key(|o| {
                (o.interface.location, o.color_index, o.interface.component)
            }),
            Outputs::Other(list) => list.sort_by_key(|o| (o.location, o.component)),
        }
        for set in &mut descriptor_sets {
            set.sort_by_key(|b| b.binding);
        }

        Self {
            params,
            arena,
            spec_constants,
            inputs,
            outputs,
            descriptor_sets,
            push_constants,
            workgroup_size,
        }
    }

    pub fn params(&self) -> &IntrospectionParams {
        &self.params
    }

    pub fn arena(&self) -> &TypeArena {
        &self.arena
    }

    /// Resolves a name issued by this result.
    pub fn name(&self, span: Span<str>) -> &str {
        self.arena.resolve_str(span)
    }

    pub fn spec_constants(&self) -> &[SpecConstant] {
        &self.spec_constants
    }

    pub fn spec_constant(&self, id: u32) -> Option<&SpecConstant> {
        self.spec_constants
            .binary_search_by_key(&id, |c| c.id)
            .ok()
            .map(|i| &self.spec_constants[i])
    }

    pub fn inputs(&self) -> &[InputInterface] {
        &self.inputs
    }

    pub fn outputs(&self) -> &Outputs {
        &self.outputs
    }

    /// Bindings of one set; empty for unused or out-of-range sets.
    pub fn descriptor_set(&self, set: u32) -> &[DescriptorBinding] {
        self.descriptor_sets
            .get(set as usize)
            .map_or(&[][..], Vec::as_slice)
    }

    pub fn descriptor_sets(&self) -> &[Vec<DescriptorBinding>; MAX_DESCRIPTOR_SETS] {
        &self.descriptor_sets
    }

    /// All bindings, ordered by `(set, binding)`.
    pub fn bindings(&self) -> impl Iterator<Item = &DescriptorBinding> + '_ {
        self.descriptor_sets.iter().flatten()
    }

    pub fn binding(&self, set: u32, binding: u32) -> Option<&DescriptorBinding> {
        let list = self.descriptor_set(set);
        list.binary_search_by_key(&binding, |b| b.binding)
            .ok()
            .map(|i| &list[i])
    }

    pub fn push_constants(&self) -> &PushConstantBlock {
        &self.push_constants
    }

    /// `None` for stages without workgroups.
    pub fn workgroup_size(&self) -> Option<&WorkgroupSize> {
        self.workgroup_size.as_ref()
    }

    /// Returns `true` if no descriptor count depends on a specialization
    /// constant, so set layouts can be created from this stage alone.
    pub fn can_create_layout_without_specialization(&self) -> bool {
        !self
            .bindings()
            .any(|b| matches!(b.count, Some(ArrayInfo::SpecConstant { .. })))
    }
}

//! Pipeline-wide merge of stage introspections.

use std::collections::BTreeMap;

use spvi_ir::{
    ArrayInfo, DescriptorBinding, IrError, MAX_DESCRIPTOR_SETS, ShaderStages, SpecializationMap,
    StageIntrospectionResult,
};

use crate::MergeError;
use crate::layout::{
    BindingShape, DescriptorSetLayoutDesc, LayoutBinding, PipelineLayoutDesc, PushConstantRange,
};

/// Default size of the per-byte push-constant map; the minimum every Vulkan
/// implementation supports is 128, common desktop limits are 256.
pub const MAX_PUSH_CONSTANTS_SIZE: u32 = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct MergedBinding {
    shape: BindingShape,
    stages: ShaderStages,
}

/// Accumulates the descriptor and push-constant usage of the stages of one
/// pipeline.
///
/// Not synchronized: merges into one aggregate must be serialized by its owner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineIntrospection {
    bindings: BTreeMap<(u32, u32), MergedBinding>,
    /// Stages reading each push-constant byte.
    push_constant_bytes: Vec<ShaderStages>,
    stages: ShaderStages,
}

impl Default for PipelineIntrospection {
    fn default() -> Self {
        Self::new()
    }
}

/// Changes a merge would make, computed before anything is committed.
struct Staged {
    bindings: Vec<((u32, u32), BindingShape)>,
    push_constants: Option<(u32, u32)>,
}

impl PipelineIntrospection {
    pub fn new() -> Self {
        Self::with_push_constant_limit(MAX_PUSH_CONSTANTS_SIZE)
    }

    /// An empty aggregate tracking `limit` bytes of push constants.
    pub fn with_push_constant_limit(limit: u32) -> Self {
        Self {
            bindings: BTreeMap::new(),
            push_constant_bytes: vec![ShaderStages::empty(); limit as usize],
            stages: ShaderStages::empty(),
        }
    }

    pub fn push_constant_limit(&self) -> u32 {
        self.push_constant_bytes.len() as u32
    }

    /// Stages merged so far.
    pub fn stages(&self) -> ShaderStages {
        self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Merges one stage.
    ///
    /// Spec-constant sized descriptor arrays and push-constant blocks are
    /// resolved with `specialization`. On error nothing is merged.
    pub fn merge(
        &mut self,
        stage: &StageIntrospectionResult,
        specialization: Option<&SpecializationMap>,
    ) -> Result<(), MergeError> {
        let staged = self.stage(stage, specialization)?;
        let mask = stage.params().stage.mask();

        for (key, shape) in staged.bindings {
            self.bindings
                .entry(key)
                .or_insert(MergedBinding {
                    shape,
                    stages: ShaderStages::empty(),
                })
                .stages |= mask;
        }
        if let Some((start, end)) = staged.push_constants {
            for byte in &mut self.push_constant_bytes[start as usize..end as usize] {
                *byte |= mask;
            }
        }
        self.stages |= mask;
        log::debug!("merged {}; pipeline stages now {}", stage.params(), self.stages);
        Ok(())
    }

    fn stage(
        &self,
        stage: &StageIntrospectionResult,
        specialization: Option<&SpecializationMap>,
    ) -> Result<Staged, MergeError> {
        let stage_name = stage.params().stage;
        let mut bindings = Vec::new();
        for binding in stage.bindings() {
            let shape = resolve_shape(binding, specialization)?;
            let key = (binding.set, binding.binding);
            match self.bindings.get(&key) {
                Some(existing) if existing.shape != shape => {
                    return Err(MergeError::Conflict {
                        set: binding.set,
                        binding: binding.binding,
                        stage: stage_name,
                        existing: existing.shape,
                        incoming: shape,
                    });
                }
                _ => {}
            }
            bindings.push((key, shape));
        }

        let pc = stage.push_constants();
        let push_constants = if pc.present {
            let lookup = lookup(specialization);
            let extent = pc
                .block
                .extent(stage.arena(), &|id| lookup(id).ok().flatten())
                .map_err(|err| match err {
                    IrError::UnresolvedSpecConstant(id) => match lookup(id) {
                        Err(err) => err,
                        Ok(_) => MergeError::UnresolvedSpecialization {
                            id,
                            what: "push constants".into(),
                        },
                    },
                    other => MergeError::Ir(other),
                })?;
            let start = pc.offset & !3;
            let end = extent.div_ceil(4).saturating_mul(4);
            if end > self.push_constant_limit() {
                return Err(MergeError::PushConstantsOutOfRange {
                    end,
                    limit: self.push_constant_limit(),
                });
            }
            (start < end).then_some((start, end))
        } else {
            None
        };

        Ok(Staged {
            bindings,
            push_constants,
        })
    }

    /// Maximal runs of bytes read by the same set of stages.
    pub fn push_constant_ranges(&self) -> Vec<PushConstantRange> {
        let mut ranges: Vec<PushConstantRange> = Vec::new();
        for (offset, &stages) in (0u32..).zip(&self.push_constant_bytes) {
            if stages.is_empty() {
                continue;
            }
            match ranges.last_mut() {
                Some(last) if last.stages == stages && last.end() == offset => last.size += 1,
                _ => ranges.push(PushConstantRange {
                    offset,
                    size: 1,
                    stages,
                }),
            }
        }
        ranges
    }

    /// Merged bindings of `set`, sorted by binding.
    pub fn descriptor_set_layout(&self, set: u32) -> DescriptorSetLayoutDesc {
        let bindings = self
            .bindings
            .range((set, 0)..=(set, u32::MAX))
            .map(|(&(_, binding), merged)| LayoutBinding {
                binding,
                kind: merged.shape.kind,
                count: merged.shape.count,
                variable_count: merged.shape.variable_count,
                stages: merged.stages,
            })
            .collect();
        DescriptorSetLayoutDesc { set, bindings }
    }

    pub fn pipeline_layout(&self) -> PipelineLayoutDesc {
        PipelineLayoutDesc {
            push_constant_ranges: self.push_constant_ranges(),
            set_layouts: (0..MAX_DESCRIPTOR_SETS as u32)
                .map(|set| self.descriptor_set_layout(set))
                .filter(|layout| !layout.bindings.is_empty())
                .collect(),
        }
    }
}

/// Looks an override up as a count: `Ok(None)` if absent, an error if present
/// but not a positive integer.
fn lookup(
    specialization: Option<&SpecializationMap>,
) -> impl Fn(u32) -> Result<Option<u32>, MergeError> + '_ {
    move |id| match specialization.and_then(|map| map.get(id)) {
        None => Ok(None),
        Some(value) => value
            .as_count()
            .map(Some)
            .ok_or(MergeError::InvalidSpecialization { id, value }),
    }
}

fn resolve_shape(
    binding: &DescriptorBinding,
    specialization: Option<&SpecializationMap>,
) -> Result<BindingShape, MergeError> {
    let (count, variable_count) = match binding.descriptor_count() {
        ArrayInfo::Fixed(n) => (n, false),
        ArrayInfo::RuntimeSized => (0, true),
        ArrayInfo::SpecConstant { id } => match lookup(specialization)(id)? {
            Some(n) => (n, false),
            None => {
                return Err(MergeError::UnresolvedSpecialization {
                    id,
                    what: format!("set {} binding {}", binding.set, binding.binding),
                });
            }
        },
    };
    Ok(BindingShape {
        kind: binding.kind(),
        count,
        variable_count,
    })
}

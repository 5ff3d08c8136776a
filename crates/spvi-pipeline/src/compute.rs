//! Compute pipeline description from a single stage.

use spvi_ir::{ShaderStage, ShaderStages, SpecializationMap, StageIntrospectionResult};

use crate::PipelineError;
use crate::aggregate::PipelineIntrospection;
use crate::layout::{ComputePipelineDesc, PipelineLayoutDesc};

/// Describes a compute pipeline for `stage`.
///
/// Without a `layout`, the layout is derived from the shader alone. A
/// supplied layout is kept as is, but must provide every binding the shader
/// uses with the same kind and count, visible to the compute stage, and
/// cover every push-constant byte it reads.
pub fn approximate_compute_pipeline(
    stage: &StageIntrospectionResult,
    specialization: Option<&SpecializationMap>,
    layout: Option<PipelineLayoutDesc>,
) -> Result<ComputePipelineDesc, PipelineError> {
    let params = stage.params();
    if params.stage != ShaderStage::Compute {
        return Err(PipelineError::NotCompute(params.stage));
    }
    let mut merged = PipelineIntrospection::new();
    merged.merge(stage, specialization)?;
    let derived = merged.pipeline_layout();

    let layout = match layout {
        Some(layout) => {
            check_covers(&layout, &derived)?;
            layout
        }
        None => derived,
    };
    let empty = SpecializationMap::new();
    let workgroup_size = stage
        .workgroup_size()
        .map(|size| size.specialized(specialization.unwrap_or(&empty)));
    Ok(ComputePipelineDesc {
        entry_point: params.entry_point.clone(),
        layout,
        workgroup_size,
    })
}

fn check_covers(layout: &PipelineLayoutDesc, needed: &PipelineLayoutDesc) -> Result<(), PipelineError> {
    for set in &needed.set_layouts {
        for need in &set.bindings {
            let Some(have) = layout.set_layout(set.set).and_then(|l| l.binding(need.binding)) else {
                return Err(PipelineError::LayoutMismatch(format!(
                    "set {} binding {} ({}) is missing",
                    set.set,
                    need.binding,
                    need.shape()
                )));
            };
            if have.shape() != need.shape() {
                return Err(PipelineError::LayoutMismatch(format!(
                    "set {} binding {} is {} in the layout but {} in the shader",
                    set.set,
                    need.binding,
                    have.shape(),
                    need.shape()
                )));
            }
            if !have.stages.contains(ShaderStages::COMPUTE) {
                return Err(PipelineError::LayoutMismatch(format!(
                    "set {} binding {} is not visible to the compute stage",
                    set.set, need.binding
                )));
            }
        }
    }
    for range in &needed.push_constant_ranges {
        let uncovered = (range.offset..range.end()).find(|&byte| {
            !layout.push_constant_ranges.iter().any(|have| {
                have.stages.contains(ShaderStages::COMPUTE) && (have.offset..have.end()).contains(&byte)
            })
        });
        if let Some(byte) = uncovered {
            return Err(PipelineError::LayoutMismatch(format!(
                "push constant byte {byte} is not in a compute range"
            )));
        }
    }
    Ok(())
}

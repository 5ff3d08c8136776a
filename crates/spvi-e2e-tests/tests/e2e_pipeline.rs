mod common;

use spvi_ir::{DescriptorKind, ShaderStage, ShaderStages};
use spvi_pipeline::{
    MergeError, PipelineError, PipelineIntrospection, PushConstantRange,
    approximate_compute_pipeline,
};

use common::*;

#[test]
fn scene_pipeline_layout() {
    let vertex = introspect_wgsl(SCENE_VERTEX, "vs_main", ShaderStage::Vertex);
    let fragment = introspect_wgsl(SCENE_FRAGMENT, "fs_main", ShaderStage::Fragment);

    let mut pipeline = PipelineIntrospection::new();
    pipeline.merge(&vertex, None).unwrap();
    pipeline.merge(&fragment, None).unwrap();

    let layout = pipeline.pipeline_layout();
    assert_eq!(
        layout.push_constant_ranges,
        [PushConstantRange {
            offset: 0,
            size: 80,
            stages: ShaderStages::VERTEX | ShaderStages::FRAGMENT,
        }]
    );
    assert_eq!(layout.set_layouts.len(), 2);

    let camera = layout.set_layout(0).and_then(|s| s.binding(0)).unwrap();
    assert_eq!(camera.kind, DescriptorKind::UniformBuffer);
    assert_eq!(camera.stages, ShaderStages::VERTEX | ShaderStages::FRAGMENT);

    let set1 = layout.set_layout(1).unwrap();
    let kinds: Vec<_> = set1.bindings.iter().map(|b| (b.binding, b.kind, b.stages)).collect();
    assert_eq!(
        kinds,
        [
            (0, DescriptorKind::SampledImage, ShaderStages::FRAGMENT),
            (1, DescriptorKind::Sampler, ShaderStages::FRAGMENT),
        ]
    );

    let text = layout.to_string();
    assert!(text.contains("[0, 80) vertex|fragment"));
    assert!(text.contains("binding 1: sampler (fragment)"));
}

#[test]
fn merge_order_is_irrelevant() {
    let vertex = introspect_wgsl(SCENE_VERTEX, "vs_main", ShaderStage::Vertex);
    let fragment = introspect_wgsl(SCENE_FRAGMENT, "fs_main", ShaderStage::Fragment);

    let mut forward = PipelineIntrospection::new();
    forward.merge(&vertex, None).unwrap();
    forward.merge(&fragment, None).unwrap();
    let mut backward = PipelineIntrospection::new();
    backward.merge(&fragment, None).unwrap();
    backward.merge(&vertex, None).unwrap();
    assert_eq!(forward, backward);
}

#[test]
fn conflicting_stages() {
    const OTHER_FRAGMENT: &str = r#"
        @group(0) @binding(0) var tex: texture_2d<f32>;

        @fragment
        fn fs_main() -> @location(0) vec4<f32> {
            return textureLoad(tex, vec2<i32>(0, 0), 0);
        }
    "#;
    let vertex = introspect_wgsl(SCENE_VERTEX, "vs_main", ShaderStage::Vertex);
    let fragment = introspect_wgsl(OTHER_FRAGMENT, "fs_main", ShaderStage::Fragment);

    let mut pipeline = PipelineIntrospection::new();
    pipeline.merge(&vertex, None).unwrap();
    let before = pipeline.clone();
    let err = pipeline.merge(&fragment, None).unwrap_err();
    assert!(matches!(
        err,
        MergeError::Conflict {
            set: 0,
            binding: 0,
            stage: ShaderStage::Fragment,
            ..
        }
    ));
    assert!(err.to_string().contains("sampled-image"));
    assert_eq!(pipeline, before);
}

#[test]
fn particles_compute_pipeline() {
    let stage = introspect_wgsl(PARTICLES_COMPUTE, "step", ShaderStage::Compute);
    let desc = approximate_compute_pipeline(&stage, None, None).unwrap();
    assert_eq!(desc.entry_point, "step");
    assert_eq!(desc.workgroup_size, Some([64, 2, 1]));
    assert!(desc.layout.push_constant_ranges.is_empty());

    let set0 = desc.layout.set_layout(0).unwrap();
    let kinds: Vec<_> = set0.bindings.iter().map(|b| b.kind).collect();
    assert_eq!(
        kinds,
        [
            DescriptorKind::UniformBuffer,
            DescriptorKind::StorageBuffer,
            DescriptorKind::StorageBuffer,
        ]
    );
    assert!(set0.bindings.iter().all(|b| b.stages == ShaderStages::COMPUTE));

    let mut smaller = desc.layout.clone();
    smaller.set_layouts.pop();
    assert!(matches!(
        approximate_compute_pipeline(&stage, None, Some(smaller)),
        Err(PipelineError::LayoutMismatch(_))
    ));
}

#[test]
fn graphics_stage_is_not_a_compute_pipeline() {
    let vertex = introspect_wgsl(SCENE_VERTEX, "vs_main", ShaderStage::Vertex);
    assert_eq!(
        approximate_compute_pipeline(&vertex, None, None),
        Err(PipelineError::NotCompute(ShaderStage::Vertex))
    );
}

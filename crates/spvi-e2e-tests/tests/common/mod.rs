use spvi_ir::{IntrospectionParams, ShaderModule, ShaderStage, StageIntrospectionResult};

/// Compile WGSL to SPIR-V words with naga, keeping debug names.
#[allow(dead_code)]
pub fn compile_wgsl(source: &str) -> Vec<u32> {
    let module = naga::front::wgsl::parse_str(source).expect("WGSL parse failed");
    let info = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .expect("WGSL validation failed");
    let mut options = naga::back::spv::Options::default();
    options.flags |= naga::back::spv::WriterFlags::DEBUG;
    naga::back::spv::write_vec(&module, &info, &options, None).expect("SPIR-V emission failed")
}

/// Cache key for one entry point of a WGSL shader.
#[allow(dead_code)]
pub fn wgsl_params(source: &str, entry: &str, stage: ShaderStage) -> IntrospectionParams {
    let words = compile_wgsl(source);
    IntrospectionParams::new(ShaderModule::from_words(&words), entry, stage)
}

/// Introspect one entry point of a WGSL shader with default options.
#[allow(dead_code)]
pub fn introspect_wgsl(source: &str, entry: &str, stage: ShaderStage) -> StageIntrospectionResult {
    spvi_reflect::introspect(&wgsl_params(source, entry, stage)).expect("introspection failed")
}

/// Member names and offsets of the block bound at `(set, binding)`.
#[allow(dead_code)]
pub fn block_offsets(result: &StageIntrospectionResult, set: u32, binding: u32) -> Vec<(String, u32)> {
    let binding = result
        .binding(set, binding)
        .unwrap_or_else(|| panic!("no binding at ({set}, {binding})"));
    let block = binding.payload.block().expect("binding is not a buffer");
    result
        .arena()
        .resolve(block.members)
        .iter()
        .map(|m| (result.name(m.name).to_string(), m.offset))
        .collect()
}

pub const SCENE_VERTEX: &str = r#"
struct Camera {
    view_proj: mat4x4<f32>,
    eye: vec3<f32>,
    exposure: f32,
}

struct Push {
    model: mat4x4<f32>,
    tint: vec4<f32>,
}

@group(0) @binding(0) var<uniform> camera: Camera;
var<push_constant> pc: Push;

struct VertexOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) normal: vec3<f32>,
}

@vertex
fn vs_main(
    @location(0) position: vec3<f32>,
    @location(1) uv: vec2<f32>,
    @location(2) normal: vec3<f32>,
) -> VertexOut {
    var out: VertexOut;
    out.clip = camera.view_proj * pc.model * vec4<f32>(position, 1.0);
    out.uv = uv;
    out.normal = normal * camera.exposure;
    return out;
}
"#;

pub const SCENE_FRAGMENT: &str = r#"
struct Camera {
    view_proj: mat4x4<f32>,
    eye: vec3<f32>,
    exposure: f32,
}

struct Push {
    model: mat4x4<f32>,
    tint: vec4<f32>,
}

@group(0) @binding(0) var<uniform> camera: Camera;
@group(1) @binding(0) var albedo: texture_2d<f32>;
@group(1) @binding(1) var albedo_sampler: sampler;
var<push_constant> pc: Push;

@fragment
fn fs_main(@location(0) uv: vec2<f32>, @location(1) normal: vec3<f32>) -> @location(0) vec4<f32> {
    let base = textureSample(albedo, albedo_sampler, uv);
    let light = max(dot(normalize(normal), normalize(camera.eye)), 0.0);
    return base * light * pc.tint;
}
"#;

pub const PARTICLES_COMPUTE: &str = r#"
struct Particle {
    position: vec3<f32>,
    mass: f32,
    velocity: vec3<f32>,
}

struct SimParams {
    dt: f32,
    count: u32,
}

@group(0) @binding(0) var<uniform> params: SimParams;
@group(0) @binding(1) var<storage, read_write> particles: array<Particle>;
@group(0) @binding(2) var<storage, read> forces: array<vec4<f32>>;
@group(1) @binding(0) var density: texture_storage_2d<rgba8unorm, write>;

@compute @workgroup_size(64, 2, 1)
fn step(@builtin(global_invocation_id) id: vec3<u32>) {
    if id.x >= params.count {
        return;
    }
    var p = particles[id.x];
    p.velocity += forces[id.x].xyz * (params.dt / p.mass);
    p.position += p.velocity * params.dt;
    particles[id.x] = p;
    textureStore(density, vec2<i32>(p.position.xy), vec4<f32>(1.0));
}
"#;

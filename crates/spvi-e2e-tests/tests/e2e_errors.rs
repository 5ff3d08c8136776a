use rspirv::spirv::{Decoration, ExecutionModel, StorageClass};
use spvi_ir::ShaderStage;
use spvi_reflect::IntrospectionError;
use spvi_reflect::testing::{ShaderBuilder, params};

fn introspect(sb: ShaderBuilder, model: ExecutionModel, stage: ShaderStage) -> Result<(), IntrospectionError> {
    let code = sb.finish(model, "main").unwrap();
    spvi_reflect::introspect(&params(code, "main", stage)).map(|_| ())
}

#[test]
fn runtime_array_in_uniform_buffer() {
    let mut sb = ShaderBuilder::new();
    let f32_ty = sb.f32_type();
    let rt = sb.runtime_array_type(f32_ty);
    sb.array_stride(rt, 16);
    let ubo = sb.block("U", &[("values", rt, Some(0))]);
    sb.resource("u", ubo, StorageClass::Uniform, 0, 0);
    let err = introspect(sb, ExecutionModel::GLCompute, ShaderStage::Compute).unwrap_err();
    assert!(matches!(err, IntrospectionError::MalformedInput(_)), "{err}");
}

#[test]
fn runtime_array_not_last() {
    let mut sb = ShaderBuilder::new();
    let f32_ty = sb.f32_type();
    let rt = sb.runtime_array_type(f32_ty);
    sb.array_stride(rt, 4);
    let ssbo = sb.block("S", &[("values", rt, Some(0)), ("tail", f32_ty, Some(0))]);
    sb.resource("s", ssbo, StorageClass::StorageBuffer, 0, 0);
    assert!(matches!(
        introspect(sb, ExecutionModel::GLCompute, ShaderStage::Compute),
        Err(IntrospectionError::MalformedInput(_))
    ));
}

#[test]
fn runtime_array_in_nested_struct() {
    let mut sb = ShaderBuilder::new();
    let f32_ty = sb.f32_type();
    let rt = sb.runtime_array_type(f32_ty);
    sb.array_stride(rt, 4);
    let inner = sb.struct_type("Inner", &[("values", rt, Some(0))]);
    let ssbo = sb.block("S", &[("inner", inner, Some(0))]);
    sb.resource("s", ssbo, StorageClass::StorageBuffer, 0, 0);
    assert!(matches!(
        introspect(sb, ExecutionModel::GLCompute, ShaderStage::Compute),
        Err(IntrospectionError::MalformedInput(_))
    ));
}

#[test]
fn two_resources_one_binding() {
    let mut sb = ShaderBuilder::new();
    let sampler = sb.builder().type_sampler();
    sb.resource("first", sampler, StorageClass::UniformConstant, 2, 5);
    sb.resource("second", sampler, StorageClass::UniformConstant, 2, 5);
    let err = introspect(sb, ExecutionModel::Fragment, ShaderStage::Fragment).unwrap_err();
    assert_eq!(
        err,
        IntrospectionError::AmbiguousBinding {
            set: 2,
            binding: 5,
            first: "first".into(),
            second: "second".into(),
        }
    );
}

#[test]
fn second_push_constant_block() {
    let mut sb = ShaderBuilder::new();
    let f32_ty = sb.f32_type();
    let a = sb.block("A", &[("x", f32_ty, Some(0))]);
    let b = sb.block("B", &[("y", f32_ty, Some(0))]);
    sb.push_constant("a", a);
    sb.push_constant("b", b);
    assert!(matches!(
        introspect(sb, ExecutionModel::Vertex, ShaderStage::Vertex),
        Err(IntrospectionError::MalformedInput(_))
    ));
}

#[test]
fn bool_member_in_block() {
    let mut sb = ShaderBuilder::new();
    let bool_ty = sb.builder().type_bool();
    let ubo = sb.block("U", &[("flag", bool_ty, Some(0))]);
    sb.resource("u", ubo, StorageClass::Uniform, 0, 0);
    assert!(matches!(
        introspect(sb, ExecutionModel::GLCompute, ShaderStage::Compute),
        Err(IntrospectionError::MalformedInput(_))
    ));
}

fn subpass_input(index: Option<u32>) -> ShaderBuilder {
    let mut sb = ShaderBuilder::new();
    let f32_ty = sb.f32_type();
    let subpass = sb.builder().type_image(
        f32_ty,
        rspirv::spirv::Dim::DimSubpassData,
        0,
        0,
        0,
        2,
        rspirv::spirv::ImageFormat::Unknown,
        None,
    );
    let var = sb.resource("gbuffer", subpass, StorageClass::UniformConstant, 0, 0);
    if let Some(index) = index {
        sb.decorate(var, Decoration::InputAttachmentIndex, &[index]);
    }
    sb
}

#[test]
fn input_attachment_needs_an_index() {
    assert!(matches!(
        introspect(subpass_input(None), ExecutionModel::Fragment, ShaderStage::Fragment),
        Err(IntrospectionError::MalformedInput(_))
    ));
    assert!(introspect(subpass_input(Some(3)), ExecutionModel::Fragment, ShaderStage::Fragment).is_ok());
}

#[test]
fn errors_render_readably() {
    let err = IntrospectionError::SetOutOfRange {
        name: "extra".into(),
        set: 7,
    };
    assert_eq!(
        err.to_string(),
        "'extra' uses descriptor set 7; at most 4 sets are supported"
    );
    assert_eq!(
        IntrospectionError::MalformedInput("x".into()).to_string(),
        "malformed input: x"
    );
}

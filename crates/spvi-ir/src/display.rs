//! Display implementations and text dump for debugging.

use std::fmt::{self, Write as _};

use crate::arena::{Span, TypeArena};
use crate::descriptor::{DescriptorBinding, DescriptorKind, DescriptorPayload, ImageViewType, StorageFormat};
use crate::interface::{InputInterface, Outputs};
use crate::result::StageIntrospectionResult;
use crate::types::{ArrayInfo, Member, MemoryBlock, MemoryLayout, Qualifiers, TypeInfo, VarType};

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UnknownOrStruct => "struct",
            Self::U64 => "u64",
            Self::I64 => "i64",
            Self::U32 => "u32",
            Self::I32 => "i32",
            Self::U16 => "u16",
            Self::I16 => "i16",
            Self::U8 => "u8",
            Self::I8 => "i8",
            Self::F64 => "f64",
            Self::F32 => "f32",
            Self::F16 => "f16",
            Self::Bool => "bool",
        })
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_matrix() {
            write!(f, "mat{}x{}<{}>", self.columns, self.rows, self.ty)?;
            if self.row_major {
                f.write_str(" row_major")?;
            }
            write!(f, " stride({})", self.matrix_stride)
        } else if self.is_vector() {
            write!(f, "vec{}<{}>", self.rows, self.ty)
        } else {
            write!(f, "{}", self.ty)
        }
    }
}

impl fmt::Display for ArrayInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(n) => write!(f, "[{n}]"),
            Self::SpecConstant { id } => write!(f, "[spec({id})]"),
            Self::RuntimeSized => write!(f, "[]"),
        }
    }
}

impl fmt::Display for MemoryLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Std140 => "std140",
            Self::Std430 => "std430",
            Self::Scalar => "scalar",
        })
    }
}

impl fmt::Display for Qualifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::RESTRICT, "restrict"),
            (Self::VOLATILE, "volatile"),
            (Self::COHERENT, "coherent"),
            (Self::READONLY, "readonly"),
            (Self::WRITEONLY, "writeonly"),
            (Self::ALIASED, "aliased"),
        ];
        let mut sep = "";
        for (flag, name) in names {
            if self.contains(flag) {
                write!(f, "{sep}{name}")?;
                sep = " ";
            }
        }
        Ok(())
    }
}

impl fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sampler => "sampler",
            Self::CombinedImageSampler => "combined-image-sampler",
            Self::SampledImage => "sampled-image",
            Self::StorageImage => "storage-image",
            Self::UniformTexelBuffer => "uniform-texel-buffer",
            Self::StorageTexelBuffer => "storage-texel-buffer",
            Self::UniformBuffer => "uniform-buffer",
            Self::StorageBuffer => "storage-buffer",
            Self::InputAttachment => "input-attachment",
        })
    }
}

impl fmt::Display for ImageViewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::D1 => "1d",
            Self::D1Array => "1d-array",
            Self::D2 => "2d",
            Self::D2Array => "2d-array",
            Self::D3 => "3d",
            Self::Cube => "cube",
            Self::CubeArray => "cube-array",
        })
    }
}

impl fmt::Display for StorageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = format!("{self:?}");
        f.write_str(&name.to_ascii_lowercase())
    }
}

fn format_interface(iface: &InputInterface) -> String {
    let ty = TypeInfo::vector(iface.base_type, u8::try_from(iface.components).unwrap_or(u8::MAX));
    let mut out = format!("location {}.{}: {ty}", iface.location, iface.component);
    if iface.elements > 1 {
        let _ = write!(out, "[{}]", iface.elements);
    }
    out
}

fn format_payload(payload: &DescriptorPayload) -> String {
    match payload {
        DescriptorPayload::CombinedImageSampler(image) | DescriptorPayload::SampledImage(image) => {
            let mut out = image.view_type.to_string();
            if image.multisample {
                out.push_str(" ms");
            }
            if image.shadow {
                out.push_str(" shadow");
            }
            out
        }
        DescriptorPayload::StorageImage { format, image } => {
            format!("{} {format}", image.view_type)
        }
        DescriptorPayload::StorageTexelBuffer { format } => format.to_string(),
        DescriptorPayload::UniformBuffer(block) => format!("{}, {} bytes", block.layout, block.size),
        DescriptorPayload::StorageBuffer(storage) => format!(
            "{}, {} bytes",
            storage.block.layout, storage.size_without_last_member
        ),
        DescriptorPayload::InputAttachment { index, multisample } => {
            format!("index {index}{}", if *multisample { " ms" } else { "" })
        }
        DescriptorPayload::Sampler | DescriptorPayload::UniformTexelBuffer => String::new(),
    }
}

fn name_or_anon(arena: &TypeArena, span: Span<str>) -> &str {
    match arena.try_resolve_str(span) {
        Ok("") | Err(_) => "_",
        Ok(name) => name,
    }
}

fn dump_members(out: &mut String, arena: &TypeArena, members: Span<Member>, depth: usize) {
    let Ok(members) = arena.try_resolve(members) else {
        return;
    };
    for member in members {
        let indent = "  ".repeat(depth);
        let name = name_or_anon(arena, member.name);
        let _ = write!(out, "{indent}+{} {name}: ", member.offset);
        if member.is_struct() {
            out.push_str("struct");
        } else {
            let _ = write!(out, "{}", member.type_info);
        }
        for dim in arena.try_resolve(member.dims).unwrap_or_default() {
            let _ = write!(out, "{dim}");
        }
        if member.is_array() {
            let _ = write!(out, " stride({})", member.stride);
        }
        let _ = write!(out, " size({})", member.size);
        if !member.qualifiers.is_empty() {
            let _ = write!(out, " {}", member.qualifiers);
        }
        out.push('\n');
        dump_members(out, arena, member.members, depth + 1);
    }
}

fn dump_block(out: &mut String, arena: &TypeArena, block: &MemoryBlock, depth: usize) {
    dump_members(out, arena, block.members, depth);
}

fn dump_binding(out: &mut String, arena: &TypeArena, binding: &DescriptorBinding) {
    let name = name_or_anon(arena, binding.name);
    let _ = write!(out, "  binding {} {} {name}", binding.binding, binding.kind());
    if let Some(count) = binding.count {
        let _ = write!(out, "{count}");
    }
    let payload = format_payload(&binding.payload);
    if !payload.is_empty() {
        let _ = write!(out, " ({payload})");
    }
    if !binding.qualifiers.is_empty() {
        let _ = write!(out, " {}", binding.qualifiers);
    }
    out.push('\n');
    if let Some(block) = binding.payload.block() {
        dump_block(out, arena, block, 2);
    }
}

/// Produce a human-readable text dump of a stage introspection result.
pub fn dump_stage(result: &StageIntrospectionResult) -> String {
    let mut out = String::new();
    let arena = result.arena();

    let _ = writeln!(out, "Stage: {}", result.params());

    if let Some(size) = result.workgroup_size() {
        let [x, y, z] = size.sizes;
        let _ = write!(out, "Workgroup size: {x}x{y}x{z}");
        for (axis, id) in ["x", "y", "z"].into_iter().zip(size.spec_ids) {
            if let Some(id) = id {
                let _ = write!(out, " {axis}=spec({id})");
            }
        }
        out.push('\n');
    }

    if !result.spec_constants().is_empty() {
        out.push_str("\nSpecialization constants:\n");
        for constant in result.spec_constants() {
            let _ = writeln!(
                out,
                "  [{}] {}: {} = {} ({} bytes)",
                constant.id,
                name_or_anon(arena, constant.name),
                constant.ty,
                constant.default,
                constant.byte_size
            );
        }
    }

    if !result.inputs().is_empty() {
        out.push_str("\nInputs:\n");
        for input in result.inputs() {
            let _ = writeln!(out, "  {}", format_interface(input));
        }
    }

    if !result.outputs().is_empty() {
        out.push_str("\nOutputs:\n");
        match result.outputs() {
            Outputs::Fragment(outputs) => {
                for output in outputs {
                    let _ = writeln!(
                        out,
                        "  {} index {}",
                        format_interface(&output.interface),
                        output.color_index
                    );
                }
            }
            Outputs::Other(outputs) => {
                for output in outputs {
                    let _ = writeln!(out, "  {}", format_interface(output));
                }
            }
        }
    }

    for (set, bindings) in result.descriptor_sets().iter().enumerate() {
        if bindings.is_empty() {
            continue;
        }
        let _ = writeln!(out, "\nSet {set}:");
        for binding in bindings {
            dump_binding(&mut out, arena, binding);
        }
    }

    let push = result.push_constants();
    if push.present {
        let _ = writeln!(
            out,
            "\nPush constants {} ({}, offset {}, {} bytes):",
            name_or_anon(arena, push.name),
            push.block.layout,
            push.offset,
            push.block.size
        );
        dump_block(&mut out, arena, &push.block, 1);
    }

    out
}

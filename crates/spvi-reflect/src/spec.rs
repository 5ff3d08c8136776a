//! Specialization constants and workgroup size.

use std::collections::HashMap;

use rspirv::spirv::{BuiltIn, ExecutionMode, Word};
use spvi_ir::{SpecConstant, SpecValue, StageParts, VarType, WorkgroupSize};

use crate::IntrospectionError;
use crate::decode::{ConstantValue, EntryPoint, SpirvModule, SpirvType};

/// Lists every `SpecId`-decorated scalar constant in the module.
pub(crate) fn collect(module: &SpirvModule, parts: &mut StageParts) -> Result<(), IntrospectionError> {
    let mut seen: HashMap<u32, Word> = HashMap::new();
    for (id, constant) in module.constants() {
        if !constant.specializable {
            continue;
        }
        let Some(spec_id) = module.decorations(id).spec_id else {
            continue;
        };
        let (ty, default) = match (module.ty(constant.ty)?, &constant.value) {
            (SpirvType::Bool, ConstantValue::Bool(value)) => (VarType::Bool, SpecValue::Bool(*value)),
            (&SpirvType::Int { width, signed }, &ConstantValue::Bits(bits)) => {
                let ty = VarType::int(width, signed).ok_or_else(|| {
                    IntrospectionError::MalformedInput(format!(
                        "spec constant {spec_id} has unsupported width {width}"
                    ))
                })?;
                let value = if signed {
                    SpecValue::Int(sign_extend(bits, width))
                } else {
                    SpecValue::UInt(truncate(bits, width))
                };
                (ty, value)
            }
            (&SpirvType::Float { width }, &ConstantValue::Bits(bits)) => {
                let (ty, value) = match width {
                    16 => (VarType::F16, half::f16::from_bits(truncate(bits, 16) as u16).to_f64()),
                    32 => (VarType::F32, f64::from(f32::from_bits(truncate(bits, 32) as u32))),
                    64 => (VarType::F64, f64::from_bits(bits)),
                    _ => {
                        return Err(IntrospectionError::MalformedInput(format!(
                            "spec constant {spec_id} has unsupported width {width}"
                        )));
                    }
                };
                (ty, SpecValue::Float(value))
            }
            (_, ConstantValue::Composite(_) | ConstantValue::Expression) => {
                log::debug!("spec constant {spec_id} (%{id}) is not a scalar; skipping");
                continue;
            }
            (other, _) => {
                return Err(IntrospectionError::MalformedInput(format!(
                    "spec constant {spec_id} has type {other:?}"
                )));
            }
        };
        if let Some(first) = seen.insert(spec_id, id) {
            return Err(IntrospectionError::MalformedInput(format!(
                "SpecId {spec_id} is used by both %{first} and %{id}"
            )));
        }
        let name = parts.arena.write_string(module.name(id));
        parts.spec_constants.push(SpecConstant {
            id: spec_id,
            name,
            default,
            byte_size: ty.byte_size(),
            ty,
        });
    }
    Ok(())
}

fn truncate(bits: u64, width: u32) -> u64 {
    if width >= 64 {
        bits
    } else {
        bits & ((1u64 << width) - 1)
    }
}

fn sign_extend(bits: u64, width: u32) -> i64 {
    let shift = 64 - width.clamp(1, 64);
    ((bits << shift) as i64) >> shift
}

/// Workgroup size of a compute, task or mesh entry point.
///
/// A `WorkgroupSize` built-in constant overrides the execution modes.
pub(crate) fn workgroup_size(
    module: &SpirvModule,
    entry: &EntryPoint,
) -> Result<Option<WorkgroupSize>, IntrospectionError> {
    let builtin = module
        .constants()
        .find(|&(id, _)| module.decorations(id).builtin == Some(BuiltIn::WorkgroupSize));
    if let Some((id, constant)) = builtin {
        let ConstantValue::Composite(components) = &constant.value else {
            return Err(IntrospectionError::MalformedInput(format!(
                "WorkgroupSize built-in %{id} is not a composite"
            )));
        };
        return dimensions(module, components).map(Some);
    }

    for mode in module.execution_modes(entry.function) {
        match mode.mode {
            ExecutionMode::LocalSize => {
                let [x, y, z] = literal_triple(&mode.operands)?;
                return Ok(Some(WorkgroupSize {
                    sizes: [x, y, z],
                    spec_ids: [None; 3],
                }));
            }
            ExecutionMode::LocalSizeId => {
                return dimensions(module, &literal_triple(&mode.operands)?).map(Some);
            }
            _ => {}
        }
    }
    log::warn!("entry point '{}' declares no workgroup size", entry.name);
    Ok(None)
}

fn literal_triple(operands: &[u32]) -> Result<[u32; 3], IntrospectionError> {
    match *operands {
        [x, y, z, ..] => Ok([x, y, z]),
        _ => Err(IntrospectionError::MalformedInput(
            "workgroup size needs three operands".into(),
        )),
    }
}

/// Reads three constant ids as workgroup dimensions.
fn dimensions(module: &SpirvModule, ids: &[Word]) -> Result<WorkgroupSize, IntrospectionError> {
    let mut size = WorkgroupSize::default();
    if ids.len() != 3 {
        return Err(IntrospectionError::MalformedInput(format!(
            "workgroup size has {} components",
            ids.len()
        )));
    }
    for (axis, &id) in ids.iter().enumerate() {
        let constant = module.constant(id).ok_or_else(|| {
            IntrospectionError::MalformedInput(format!("workgroup dimension %{id} is not a constant"))
        })?;
        let ConstantValue::Bits(bits) = constant.value else {
            return Err(IntrospectionError::MalformedInput(format!(
                "workgroup dimension %{id} is not an integer"
            )));
        };
        size.sizes[axis] = u32::try_from(bits).map_err(|_| {
            IntrospectionError::MalformedInput(format!("workgroup dimension %{id} out of range"))
        })?;
        if constant.specializable {
            size.spec_ids[axis] = module.decorations(id).spec_id;
        }
    }
    Ok(size)
}

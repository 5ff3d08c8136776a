//! Stage input and output interfaces.

use std::collections::HashSet;

use rspirv::spirv::{StorageClass, Word};
use spvi_ir::{FragmentOutput, InputInterface, Outputs, ShaderStage, StageParts};

use crate::IntrospectionError;
use crate::decode::{EntryPoint, SpirvModule, SpirvType};
use crate::typegraph::scalar_type;

/// More locations than any implementation exposes for one stage.
const MAX_LOCATIONS: u32 = 1024;
const MAX_DEPTH: usize = 64;

/// Collects the user-defined inputs and outputs of `entry`.
pub(crate) fn collect(
    module: &SpirvModule,
    entry: &EntryPoint,
    used: &HashSet<Word>,
    stage: ShaderStage,
    parts: &mut StageParts,
) -> Result<(), IntrospectionError> {
    let mut outputs = Vec::new();
    let mut fragment_outputs = Vec::new();
    for var in module.variables() {
        let input = match var.storage_class {
            StorageClass::Input => true,
            StorageClass::Output => false,
            _ => continue,
        };
        if !used.contains(&var.id) && !entry.interface.contains(&var.id) {
            continue;
        }
        if is_builtin(module, var.id, var.pointee)? {
            continue;
        }
        let decorations = module.decorations(var.id);
        let mut flat = Vec::new();
        let mut walk = Flatten {
            module,
            name: module.name(var.id),
            out: &mut flat,
            depth: 0,
        };
        walk.visit(
            var.pointee,
            decorations.location,
            decorations.component.unwrap_or(0),
            1,
        )?;

        if input {
            parts.inputs.extend(flat);
        } else if stage == ShaderStage::Fragment {
            let color_index = decorations.index.unwrap_or(0);
            fragment_outputs.extend(flat.into_iter().map(|interface| FragmentOutput {
                interface,
                color_index,
            }));
        } else {
            outputs.extend(flat);
        }
    }
    parts.outputs = if stage == ShaderStage::Fragment {
        Outputs::Fragment(fragment_outputs)
    } else {
        Outputs::Other(outputs)
    };
    log::debug!(
        "entry point '{}': {} inputs, {} outputs",
        entry.name,
        parts.inputs.len(),
        parts.outputs.len()
    );
    Ok(())
}

/// A variable is built-in if it is decorated `BuiltIn` itself or is a block
/// whose members are.
fn is_builtin(module: &SpirvModule, var: Word, pointee: Word) -> Result<bool, IntrospectionError> {
    if module.decorations(var).builtin.is_some() {
        return Ok(true);
    }
    let mut ty = pointee;
    loop {
        match module.ty(ty)? {
            SpirvType::Array { element, .. } | SpirvType::RuntimeArray { element } => ty = *element,
            SpirvType::Struct { members } => {
                return Ok((0u32..)
                    .take(members.len())
                    .any(|i| module.member_decorations(ty, i).builtin.is_some()));
            }
            _ => return Ok(false),
        }
    }
}

struct Flatten<'a> {
    module: &'a SpirvModule,
    name: &'a str,
    out: &'a mut Vec<InputInterface>,
    depth: usize,
}

impl Flatten<'_> {
    /// Emits the interface entries of `ty` starting at `location` and returns
    /// the number of locations consumed.
    fn visit(
        &mut self,
        ty: Word,
        location: Option<u32>,
        component: u32,
        elements: u32,
    ) -> Result<u32, IntrospectionError> {
        if self.depth >= MAX_DEPTH {
            return Err(IntrospectionError::MalformedInput(format!(
                "interface variable '{}' nests deeper than {MAX_DEPTH} levels",
                self.name
            )));
        }
        self.depth += 1;
        let consumed = self.visit_type(ty, location, component, elements);
        self.depth -= 1;
        consumed
    }

    fn visit_type(
        &mut self,
        ty: Word,
        location: Option<u32>,
        component: u32,
        elements: u32,
    ) -> Result<u32, IntrospectionError> {
        let module = self.module;
        match module.ty(ty)? {
            SpirvType::Array { element, length } => {
                let (_, count) = module.array_length(*length)?;
                if matches!(module.ty(*element)?, SpirvType::Struct { .. }) {
                    if count > MAX_LOCATIONS {
                        return Err(IntrospectionError::MalformedInput(format!(
                            "interface variable '{}' has {count} struct elements",
                            self.name
                        )));
                    }
                    // Each struct element takes its own run of locations.
                    let mut next = location;
                    let mut consumed = 0u32;
                    for _ in 0..count {
                        let slots = self.visit(*element, next, component, elements)?;
                        consumed = consumed.saturating_add(slots);
                        next = next.map(|l| l.saturating_add(slots));
                    }
                    Ok(consumed)
                } else {
                    self.visit(*element, location, component, elements.saturating_mul(count))
                }
            }
            SpirvType::RuntimeArray { .. } => Err(IntrospectionError::MalformedInput(format!(
                "interface variable '{}' is runtime-sized",
                self.name
            ))),
            SpirvType::Struct { members } => {
                let mut next = location;
                let mut consumed = 0u32;
                for (index, &member) in (0u32..).zip(members) {
                    let decorations = module.member_decorations(ty, index);
                    let member_location = decorations.location.or(next);
                    let slots = self.visit(
                        member,
                        member_location,
                        decorations.component.unwrap_or(0),
                        elements,
                    )?;
                    consumed = consumed.saturating_add(slots);
                    next = member_location.map(|l| l.saturating_add(slots));
                }
                Ok(consumed)
            }
            _ => self.leaf(ty, location, component, elements),
        }
    }

    fn leaf(
        &mut self,
        ty: Word,
        location: Option<u32>,
        component: u32,
        elements: u32,
    ) -> Result<u32, IntrospectionError> {
        let module = self.module;
        let (scalar, components, columns) = match *module.ty(ty)? {
            SpirvType::Vector { component, count } => (component, count, 1),
            SpirvType::Matrix { column, count } => match *module.ty(column)? {
                SpirvType::Vector { component, count: rows } => (component, rows, count),
                ref other => {
                    return Err(IntrospectionError::MalformedInput(format!(
                        "matrix column %{column} is {other:?}"
                    )));
                }
            },
            _ => (ty, 1, 1),
        };
        let base_type = scalar_type(module, scalar)?;
        let Some(location) = location else {
            return Err(IntrospectionError::MalformedInput(format!(
                "interface variable '{}' has no Location",
                self.name
            )));
        };
        // dvec3 and dvec4 take two locations each.
        let per_element = if base_type.byte_size() == 8 && components > 2 {
            2
        } else {
            1
        };
        let elements = elements.saturating_mul(columns);
        self.out.push(InputInterface {
            location,
            component,
            elements,
            base_type,
            components,
        });
        Ok(elements.saturating_mul(per_element))
    }
}

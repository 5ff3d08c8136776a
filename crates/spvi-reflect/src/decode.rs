//! Adapter over `rspirv`'s data representation.
//!
//! Flattens a [`dr::Module`] into lookup tables keyed by result id: types,
//! constants, names, decorations, global variables, entry points and the
//! per-function id references needed for static-use analysis. Nothing here
//! borrows from the decoded module, so it can be dropped right after.

use std::collections::HashMap;

use rspirv::dr::{self, Operand};
use rspirv::spirv::{self, Decoration, Op, StorageClass, Word};
use spvi_ir::{ArrayInfo, Qualifiers, ShaderStage};

use crate::IntrospectionError;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// An entry of the module's type table.
#[derive(Clone, Debug, PartialEq)]
pub enum SpirvType {
    Void,
    Bool,
    Int { width: u32, signed: bool },
    Float { width: u32 },
    Vector { component: Word, count: u32 },
    Matrix { column: Word, count: u32 },
    Image(ImageType),
    Sampler,
    SampledImage { image: Word },
    Array { element: Word, length: Word },
    RuntimeArray { element: Word },
    Struct { members: Vec<Word> },
    Pointer { storage_class: StorageClass, pointee: Word },
    AccelerationStructure,
    /// A type with no bearing on resource layout (functions, events, ...).
    Opaque(Op),
}

/// Operands of `OpTypeImage`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImageType {
    pub sampled_type: Word,
    pub dim: spirv::Dim,
    /// 0 = not depth, 1 = depth, 2 = unknown.
    pub depth: u32,
    pub arrayed: bool,
    pub multisampled: bool,
    /// 1 = sampled, 2 = storage, 0 = known only at run time.
    pub sampled: u32,
    pub format: spirv::ImageFormat,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ConstantValue {
    /// Scalar literal bits, zero-extended.
    Bits(u64),
    Bool(bool),
    Composite(Vec<Word>),
    /// `OpSpecConstantOp`: no value without evaluating the expression.
    Expression,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Constant {
    pub ty: Word,
    pub value: ConstantValue,
    /// Declared with one of the `OpSpecConstant*` instructions.
    pub specializable: bool,
}

/// Decorations applied to one id or one struct member.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Decorations {
    pub descriptor_set: Option<u32>,
    pub binding: Option<u32>,
    pub location: Option<u32>,
    pub component: Option<u32>,
    pub index: Option<u32>,
    pub input_attachment_index: Option<u32>,
    pub offset: Option<u32>,
    pub array_stride: Option<u32>,
    pub matrix_stride: Option<u32>,
    pub spec_id: Option<u32>,
    pub builtin: Option<spirv::BuiltIn>,
    pub block: bool,
    pub buffer_block: bool,
    pub row_major: bool,
    pub qualifiers: Qualifiers,
}

static NO_DECORATIONS: Decorations = Decorations {
    descriptor_set: None,
    binding: None,
    location: None,
    component: None,
    index: None,
    input_attachment_index: None,
    offset: None,
    array_stride: None,
    matrix_stride: None,
    spec_id: None,
    builtin: None,
    block: false,
    buffer_block: false,
    row_major: false,
    qualifiers: Qualifiers::empty(),
};

impl Decorations {
    fn apply(&mut self, decoration: Decoration, args: &[Operand]) {
        let literal = args.first().and_then(literal_u32);
        match decoration {
            Decoration::DescriptorSet => self.descriptor_set = literal,
            Decoration::Binding => self.binding = literal,
            Decoration::Location => self.location = literal,
            Decoration::Component => self.component = literal,
            Decoration::Index => self.index = literal,
            Decoration::InputAttachmentIndex => self.input_attachment_index = literal,
            Decoration::Offset => self.offset = literal,
            Decoration::ArrayStride => self.array_stride = literal,
            Decoration::MatrixStride => self.matrix_stride = literal,
            Decoration::SpecId => self.spec_id = literal,
            Decoration::BuiltIn => {
                self.builtin = match args.first() {
                    Some(Operand::BuiltIn(builtin)) => Some(*builtin),
                    _ => None,
                }
            }
            Decoration::Block => self.block = true,
            Decoration::BufferBlock => self.buffer_block = true,
            Decoration::RowMajor => self.row_major = true,
            Decoration::ColMajor => self.row_major = false,
            Decoration::Restrict => self.qualifiers |= Qualifiers::RESTRICT,
            Decoration::Volatile => self.qualifiers |= Qualifiers::VOLATILE,
            Decoration::Coherent => self.qualifiers |= Qualifiers::COHERENT,
            Decoration::NonWritable => self.qualifiers |= Qualifiers::READONLY,
            Decoration::NonReadable => self.qualifiers |= Qualifiers::WRITEONLY,
            Decoration::Aliased => self.qualifiers |= Qualifiers::ALIASED,
            _ => {}
        }
    }
}

/// A module-scope `OpVariable`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GlobalVariable {
    pub id: Word,
    pub storage_class: StorageClass,
    /// The type the variable's pointer points to.
    pub pointee: Word,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EntryPoint {
    pub model: spirv::ExecutionModel,
    pub function: Word,
    pub name: String,
    pub interface: Vec<Word>,
}

/// An `OpExecutionMode` or `OpExecutionModeId`. Id operands are kept as words.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionModeDecl {
    pub function: Word,
    pub mode: spirv::ExecutionMode,
    pub operands: Vec<u32>,
}

/// Ids a function body refers to, and the functions it calls.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FunctionBody {
    pub references: Vec<Word>,
    pub callees: Vec<Word>,
}

// ---------------------------------------------------------------------------
// Module
// ---------------------------------------------------------------------------

/// The query surface over one decoded SPIR-V module.
#[derive(Clone, Debug, Default)]
pub struct SpirvModule {
    types: HashMap<Word, SpirvType>,
    constants: HashMap<Word, Constant>,
    names: HashMap<Word, String>,
    member_names: HashMap<(Word, u32), String>,
    decorations: HashMap<Word, Decorations>,
    member_decorations: HashMap<(Word, u32), Decorations>,
    variables: Vec<GlobalVariable>,
    entry_points: Vec<EntryPoint>,
    execution_modes: Vec<ExecutionModeDecl>,
    functions: HashMap<Word, FunctionBody>,
}

impl SpirvModule {
    /// Decodes a SPIR-V binary.
    pub fn parse(bytes: &[u8]) -> Result<Self, IntrospectionError> {
        let module =
            dr::load_bytes(bytes).map_err(|e| IntrospectionError::Decode(format!("{e:?}")))?;
        Self::from_dr(&module)
    }

    /// Builds the lookup tables from an already decoded module.
    pub fn from_dr(module: &dr::Module) -> Result<Self, IntrospectionError> {
        let mut out = Self::default();
        let mut pointer_vars = Vec::new();

        for inst in &module.debug_names {
            match inst.class.opcode {
                Op::Name => {
                    let target = id_at(inst, 0)?;
                    out.names.insert(target, string_at(inst, 1)?);
                }
                Op::MemberName => {
                    let target = id_at(inst, 0)?;
                    let member = literal_at(inst, 1)?;
                    out.member_names.insert((target, member), string_at(inst, 2)?);
                }
                _ => {}
            }
        }

        for inst in &module.annotations {
            match inst.class.opcode {
                Op::Decorate | Op::DecorateId | Op::DecorateString => {
                    let target = id_at(inst, 0)?;
                    let decoration = decoration_at(inst, 1)?;
                    out.decorations
                        .entry(target)
                        .or_default()
                        .apply(decoration, &inst.operands[2..]);
                }
                Op::MemberDecorate | Op::MemberDecorateString => {
                    let target = id_at(inst, 0)?;
                    let member = literal_at(inst, 1)?;
                    let decoration = decoration_at(inst, 2)?;
                    out.member_decorations
                        .entry((target, member))
                        .or_default()
                        .apply(decoration, &inst.operands[3..]);
                }
                Op::GroupDecorate | Op::GroupMemberDecorate => {
                    log::warn!("decoration groups are not supported; ignoring {:?}", inst.class.opcode);
                }
                _ => {}
            }
        }

        for inst in &module.types_global_values {
            let opcode = inst.class.opcode;
            if opcode == Op::Variable {
                let id = result_id(inst)?;
                let pointer = inst.result_type.ok_or_else(|| malformed_inst(inst, "no result type"))?;
                let storage_class = match inst.operands.first() {
                    Some(Operand::StorageClass(class)) => *class,
                    _ => return Err(malformed_inst(inst, "missing storage class")),
                };
                pointer_vars.push((id, pointer, storage_class));
            } else if let Some(constant) = parse_constant(inst)? {
                out.constants.insert(result_id(inst)?, constant);
            } else if let Some(ty) = parse_type(inst)? {
                out.types.insert(result_id(inst)?, ty);
            }
        }

        for (id, pointer, storage_class) in pointer_vars {
            let pointee = match out.types.get(&pointer) {
                Some(SpirvType::Pointer { pointee, .. }) => *pointee,
                _ => {
                    return Err(IntrospectionError::MalformedInput(format!(
                        "variable %{id} has non-pointer type %{pointer}"
                    )));
                }
            };
            out.variables.push(GlobalVariable {
                id,
                storage_class,
                pointee,
            });
        }

        for inst in &module.entry_points {
            let model = match inst.operands.first() {
                Some(Operand::ExecutionModel(model)) => *model,
                _ => return Err(malformed_inst(inst, "missing execution model")),
            };
            let interface = inst
                .operands
                .iter()
                .skip(3)
                .filter_map(|op| match op {
                    Operand::IdRef(id) => Some(*id),
                    _ => None,
                })
                .collect();
            out.entry_points.push(EntryPoint {
                model,
                function: id_at(inst, 1)?,
                name: string_at(inst, 2)?,
                interface,
            });
        }

        for inst in &module.execution_modes {
            let mode = match inst.operands.get(1) {
                Some(Operand::ExecutionMode(mode)) => *mode,
                _ => return Err(malformed_inst(inst, "missing execution mode")),
            };
            let operands = inst.operands[2..]
                .iter()
                .filter_map(|op| match op {
                    Operand::IdRef(id) => Some(*id),
                    other => literal_u32(other),
                })
                .collect();
            out.execution_modes.push(ExecutionModeDecl {
                function: id_at(inst, 0)?,
                mode,
                operands,
            });
        }

        for function in &module.functions {
            let Some(id) = function.def.as_ref().and_then(|def| def.result_id) else {
                return Err(IntrospectionError::MalformedInput(
                    "function without a result id".into(),
                ));
            };
            let mut body = FunctionBody::default();
            for inst in function.blocks.iter().flat_map(|b| &b.instructions) {
                if inst.class.opcode == Op::FunctionCall {
                    body.callees.push(id_at(inst, 0)?);
                }
                body.references.extend(inst.operands.iter().filter_map(|op| match op {
                    Operand::IdRef(id) => Some(*id),
                    _ => None,
                }));
            }
            body.references.sort_unstable();
            body.references.dedup();
            out.functions.insert(id, body);
        }

        Ok(out)
    }

    // -- Queries -----------------------------------------------------------

    pub fn ty(&self, id: Word) -> Result<&SpirvType, IntrospectionError> {
        self.types
            .get(&id)
            .ok_or_else(|| IntrospectionError::MalformedInput(format!("unknown type %{id}")))
    }

    pub fn constant(&self, id: Word) -> Option<&Constant> {
        self.constants.get(&id)
    }

    pub fn constants(&self) -> impl Iterator<Item = (Word, &Constant)> + '_ {
        self.constants.iter().map(|(&id, c)| (id, c))
    }

    /// Debug name of `id`; empty if the module does not name it.
    pub fn name(&self, id: Word) -> &str {
        self.names.get(&id).map_or("", String::as_str)
    }

    pub fn member_name(&self, id: Word, member: u32) -> &str {
        self.member_names
            .get(&(id, member))
            .map_or("", String::as_str)
    }

    pub fn decorations(&self, id: Word) -> &Decorations {
        self.decorations.get(&id).unwrap_or(&NO_DECORATIONS)
    }

    pub fn member_decorations(&self, id: Word, member: u32) -> &Decorations {
        self.member_decorations
            .get(&(id, member))
            .unwrap_or(&NO_DECORATIONS)
    }

    /// Module-scope variables, in declaration order.
    pub fn variables(&self) -> &[GlobalVariable] {
        &self.variables
    }

    pub fn entry_points(&self) -> &[EntryPoint] {
        &self.entry_points
    }

    /// The entry point called `name` whose execution model maps to `stage`.
    pub fn find_entry_point(&self, name: &str, stage: ShaderStage) -> Option<&EntryPoint> {
        self.entry_points
            .iter()
            .find(|ep| ep.name == name && stage_of(ep.model) == Some(stage))
    }

    pub fn execution_modes(&self, function: Word) -> impl Iterator<Item = &ExecutionModeDecl> + '_ {
        self.execution_modes
            .iter()
            .filter(move |m| m.function == function)
    }

    pub fn function(&self, id: Word) -> Option<&FunctionBody> {
        self.functions.get(&id)
    }

    /// Resolves an `OpTypeArray` length operand.
    ///
    /// Returns the dimension and its element count at the default
    /// specialization.
    pub fn array_length(&self, length: Word) -> Result<(ArrayInfo, u32), IntrospectionError> {
        let Some(constant) = self.constant(length) else {
            return Err(IntrospectionError::MalformedInput(format!(
                "array length %{length} is not a constant"
            )));
        };
        let ConstantValue::Bits(bits) = constant.value else {
            return Err(IntrospectionError::MalformedInput(format!(
                "array length %{length} is not an integer literal"
            )));
        };
        let count = u32::try_from(bits).map_err(|_| {
            IntrospectionError::MalformedInput(format!("array length %{length} out of range"))
        })?;
        match self.decorations(length).spec_id {
            Some(id) if constant.specializable => Ok((ArrayInfo::SpecConstant { id }, count)),
            _ => Ok((ArrayInfo::Fixed(count), count)),
        }
    }
}

/// Maps an execution model to the pipeline stage it runs in.
pub fn stage_of(model: spirv::ExecutionModel) -> Option<ShaderStage> {
    use spirv::ExecutionModel as M;
    Some(match model {
        M::Vertex => ShaderStage::Vertex,
        M::TessellationControl => ShaderStage::TessellationControl,
        M::TessellationEvaluation => ShaderStage::TessellationEvaluation,
        M::Geometry => ShaderStage::Geometry,
        M::Fragment => ShaderStage::Fragment,
        M::GLCompute => ShaderStage::Compute,
        M::TaskNV | M::TaskEXT => ShaderStage::Task,
        M::MeshNV | M::MeshEXT => ShaderStage::Mesh,
        M::RayGenerationKHR => ShaderStage::RayGeneration,
        M::AnyHitKHR => ShaderStage::AnyHit,
        M::ClosestHitKHR => ShaderStage::ClosestHit,
        M::MissKHR => ShaderStage::Miss,
        M::IntersectionKHR => ShaderStage::Intersection,
        M::CallableKHR => ShaderStage::Callable,
        _ => return None,
    })
}

// ---------------------------------------------------------------------------
// Instruction decoding
// ---------------------------------------------------------------------------

fn parse_type(inst: &dr::Instruction) -> Result<Option<SpirvType>, IntrospectionError> {
    let ty = match inst.class.opcode {
        Op::TypeVoid => SpirvType::Void,
        Op::TypeBool => SpirvType::Bool,
        Op::TypeInt => SpirvType::Int {
            width: literal_at(inst, 0)?,
            signed: literal_at(inst, 1)? != 0,
        },
        Op::TypeFloat => SpirvType::Float {
            width: literal_at(inst, 0)?,
        },
        Op::TypeVector => SpirvType::Vector {
            component: id_at(inst, 0)?,
            count: literal_at(inst, 1)?,
        },
        Op::TypeMatrix => SpirvType::Matrix {
            column: id_at(inst, 0)?,
            count: literal_at(inst, 1)?,
        },
        Op::TypeImage => {
            let dim = match inst.operands.get(1) {
                Some(Operand::Dim(dim)) => *dim,
                _ => return Err(malformed_inst(inst, "missing dimensionality")),
            };
            let format = match inst.operands.get(6) {
                Some(Operand::ImageFormat(format)) => *format,
                _ => return Err(malformed_inst(inst, "missing image format")),
            };
            SpirvType::Image(ImageType {
                sampled_type: id_at(inst, 0)?,
                dim,
                depth: literal_at(inst, 2)?,
                arrayed: literal_at(inst, 3)? != 0,
                multisampled: literal_at(inst, 4)? != 0,
                sampled: literal_at(inst, 5)?,
                format,
            })
        }
        Op::TypeSampler => SpirvType::Sampler,
        Op::TypeSampledImage => SpirvType::SampledImage {
            image: id_at(inst, 0)?,
        },
        Op::TypeArray => SpirvType::Array {
            element: id_at(inst, 0)?,
            length: id_at(inst, 1)?,
        },
        Op::TypeRuntimeArray => SpirvType::RuntimeArray {
            element: id_at(inst, 0)?,
        },
        Op::TypeStruct => SpirvType::Struct {
            members: (0..inst.operands.len())
                .map(|i| id_at(inst, i))
                .collect::<Result<_, _>>()?,
        },
        Op::TypePointer => {
            let storage_class = match inst.operands.first() {
                Some(Operand::StorageClass(class)) => *class,
                _ => return Err(malformed_inst(inst, "missing storage class")),
            };
            SpirvType::Pointer {
                storage_class,
                pointee: id_at(inst, 1)?,
            }
        }
        Op::TypeAccelerationStructureKHR => SpirvType::AccelerationStructure,
        op if inst.result_type.is_none() && inst.result_id.is_some() => SpirvType::Opaque(op),
        _ => return Ok(None),
    };
    Ok(Some(ty))
}

fn parse_constant(inst: &dr::Instruction) -> Result<Option<Constant>, IntrospectionError> {
    let opcode = inst.class.opcode;
    let specializable = matches!(
        opcode,
        Op::SpecConstant
            | Op::SpecConstantTrue
            | Op::SpecConstantFalse
            | Op::SpecConstantComposite
            | Op::SpecConstantOp
    );
    let value = match opcode {
        Op::Constant | Op::SpecConstant => match inst.operands.first() {
            Some(Operand::LiteralBit32(v)) => ConstantValue::Bits(u64::from(*v)),
            Some(Operand::LiteralBit64(v)) => ConstantValue::Bits(*v),
            _ => return Err(malformed_inst(inst, "missing literal value")),
        },
        Op::ConstantTrue | Op::SpecConstantTrue => ConstantValue::Bool(true),
        Op::ConstantFalse | Op::SpecConstantFalse => ConstantValue::Bool(false),
        Op::ConstantNull => ConstantValue::Bits(0),
        Op::ConstantComposite | Op::SpecConstantComposite => ConstantValue::Composite(
            (0..inst.operands.len())
                .map(|i| id_at(inst, i))
                .collect::<Result<_, _>>()?,
        ),
        Op::SpecConstantOp => ConstantValue::Expression,
        _ => return Ok(None),
    };
    let ty = inst
        .result_type
        .ok_or_else(|| malformed_inst(inst, "constant without a type"))?;
    Ok(Some(Constant {
        ty,
        value,
        specializable,
    }))
}

fn literal_u32(operand: &Operand) -> Option<u32> {
    match operand {
        Operand::LiteralBit32(v) => Some(*v),
        _ => None,
    }
}

fn malformed_inst(inst: &dr::Instruction, what: &str) -> IntrospectionError {
    IntrospectionError::MalformedInput(format!("{:?}: {what}", inst.class.opcode))
}

fn result_id(inst: &dr::Instruction) -> Result<Word, IntrospectionError> {
    inst.result_id
        .ok_or_else(|| malformed_inst(inst, "no result id"))
}

fn id_at(inst: &dr::Instruction, index: usize) -> Result<Word, IntrospectionError> {
    match inst.operands.get(index) {
        Some(Operand::IdRef(id)) => Ok(*id),
        _ => Err(malformed_inst(inst, &format!("operand {index} is not an id"))),
    }
}

fn literal_at(inst: &dr::Instruction, index: usize) -> Result<u32, IntrospectionError> {
    inst.operands
        .get(index)
        .and_then(literal_u32)
        .ok_or_else(|| malformed_inst(inst, &format!("operand {index} is not a literal")))
}

fn string_at(inst: &dr::Instruction, index: usize) -> Result<String, IntrospectionError> {
    match inst.operands.get(index) {
        Some(Operand::LiteralString(s)) => Ok(s.clone()),
        _ => Err(malformed_inst(inst, &format!("operand {index} is not a string"))),
    }
}

fn decoration_at(inst: &dr::Instruction, index: usize) -> Result<Decoration, IntrospectionError> {
    match inst.operands.get(index) {
        Some(Operand::Decoration(d)) => Ok(*d),
        _ => Err(malformed_inst(inst, &format!("operand {index} is not a decoration"))),
    }
}

//! Helpers for assembling small SPIR-V modules in tests.

use rspirv::binary::Assemble;
use rspirv::dr::{self, Builder, Operand};
use rspirv::spirv::{
    AddressingModel, Capability, Decoration, ExecutionMode, ExecutionModel, FunctionControl,
    MemoryModel, Op, StorageClass, Word,
};
use spvi_ir::{IntrospectionParams, ShaderModule, ShaderStage};

/// Thin layer over [`Builder`] that tracks which globals the entry point
/// uses and emits the entry point function on [`finish`](Self::finish).
///
/// Struct types and specialization constants are emitted outside the
/// builder so that identical declarations stay distinct ids.
pub struct ShaderBuilder {
    builder: Builder,
    extra: Vec<dr::Instruction>,
    used: Vec<(Word, Word)>,
    interface: Vec<Word>,
    modes: Vec<(ExecutionMode, Vec<u32>)>,
}

impl Default for ShaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderBuilder {
    pub fn new() -> Self {
        let mut builder = Builder::new();
        builder.set_version(1, 3);
        builder.capability(Capability::Shader);
        builder.memory_model(AddressingModel::Logical, MemoryModel::GLSL450);
        Self {
            builder,
            extra: Vec::new(),
            used: Vec::new(),
            interface: Vec::new(),
            modes: Vec::new(),
        }
    }

    /// Direct access for anything the helpers do not cover.
    pub fn builder(&mut self) -> &mut Builder {
        &mut self.builder
    }

    pub fn id(&mut self) -> Word {
        self.builder.id()
    }

    /// Appends a raw global instruction.
    pub fn push_global(&mut self, inst: dr::Instruction) {
        self.extra.push(inst);
    }

    pub fn u32_type(&mut self) -> Word {
        self.builder.type_int(32, 0)
    }

    pub fn i32_type(&mut self) -> Word {
        self.builder.type_int(32, 1)
    }

    pub fn f32_type(&mut self) -> Word {
        self.builder.type_float(32)
    }

    pub fn vector_type(&mut self, component: Word, count: u32) -> Word {
        self.builder.type_vector(component, count)
    }

    /// A column-major `columns`-column matrix of f32 vectors with `rows` components.
    pub fn matrix_type(&mut self, rows: u32, columns: u32) -> Word {
        let f32_ty = self.f32_type();
        let column = self.vector_type(f32_ty, rows);
        self.builder.type_matrix(column, columns)
    }

    pub fn constant_u32(&mut self, value: u32) -> Word {
        let ty = self.u32_type();
        self.builder.constant_bit32(ty, value)
    }

    /// `OpSpecConstant` of type u32 decorated with `SpecId`.
    pub fn spec_constant_u32(&mut self, spec_id: u32, default: u32) -> Word {
        let ty = self.u32_type();
        self.spec_constant(ty, spec_id, Operand::LiteralBit32(default))
    }

    pub fn spec_constant(&mut self, ty: Word, spec_id: u32, default: Operand) -> Word {
        let id = self.builder.id();
        self.extra.push(dr::Instruction::new(
            Op::SpecConstant,
            Some(ty),
            Some(id),
            vec![default],
        ));
        self.builder
            .decorate(id, Decoration::SpecId, [Operand::LiteralBit32(spec_id)]);
        id
    }

    pub fn spec_constant_bool(&mut self, spec_id: u32, default: bool) -> Word {
        let ty = self.builder.type_bool();
        let id = self.builder.id();
        let op = if default {
            Op::SpecConstantTrue
        } else {
            Op::SpecConstantFalse
        };
        self.extra
            .push(dr::Instruction::new(op, Some(ty), Some(id), vec![]));
        self.builder
            .decorate(id, Decoration::SpecId, [Operand::LiteralBit32(spec_id)]);
        id
    }

    pub fn array_type(&mut self, element: Word, length: u32) -> Word {
        let length = self.constant_u32(length);
        self.builder.type_array(element, length)
    }

    /// Array sized by the constant `length` (which may be a spec constant).
    pub fn array_type_sized_by(&mut self, element: Word, length: Word) -> Word {
        self.builder.type_array(element, length)
    }

    pub fn runtime_array_type(&mut self, element: Word) -> Word {
        self.builder.type_runtime_array(element)
    }

    pub fn array_stride(&mut self, array: Word, stride: u32) {
        self.builder
            .decorate(array, Decoration::ArrayStride, [Operand::LiteralBit32(stride)]);
    }

    /// A named struct with named members, each with an optional `Offset`.
    pub fn struct_type(&mut self, name: &str, members: &[(&str, Word, Option<u32>)]) -> Word {
        let id = self.builder.id();
        self.extra.push(dr::Instruction::new(
            Op::TypeStruct,
            None,
            Some(id),
            members.iter().map(|&(_, ty, _)| Operand::IdRef(ty)).collect(),
        ));
        if !name.is_empty() {
            self.builder.name(id, name);
        }
        for (index, &(member_name, _, offset)) in (0u32..).zip(members) {
            self.builder.member_name(id, index, member_name);
            if let Some(offset) = offset {
                self.builder.member_decorate(
                    id,
                    index,
                    Decoration::Offset,
                    [Operand::LiteralBit32(offset)],
                );
            }
        }
        id
    }

    /// A struct decorated `Block`.
    pub fn block(&mut self, name: &str, members: &[(&str, Word, Option<u32>)]) -> Word {
        let id = self.struct_type(name, members);
        self.builder.decorate(id, Decoration::Block, []);
        id
    }

    pub fn member_decorate(&mut self, ty: Word, member: u32, decoration: Decoration, args: &[u32]) {
        self.builder.member_decorate(
            ty,
            member,
            decoration,
            args.iter().map(|&a| Operand::LiteralBit32(a)),
        );
    }

    pub fn decorate(&mut self, target: Word, decoration: Decoration, args: &[u32]) {
        self.builder.decorate(
            target,
            decoration,
            args.iter().map(|&a| Operand::LiteralBit32(a)),
        );
    }

    /// A named module-scope variable. Not used by the entry point.
    pub fn global(&mut self, name: &str, pointee: Word, class: StorageClass) -> Word {
        let pointer = self.builder.type_pointer(None, class, pointee);
        let var = self.builder.variable(pointer, None, class, None);
        if !name.is_empty() {
            self.builder.name(var, name);
        }
        var
    }

    /// A descriptor at `(set, binding)` that the entry point loads from.
    pub fn resource(
        &mut self,
        name: &str,
        pointee: Word,
        class: StorageClass,
        set: u32,
        binding: u32,
    ) -> Word {
        let var = self.global(name, pointee, class);
        self.decorate(var, Decoration::DescriptorSet, &[set]);
        self.decorate(var, Decoration::Binding, &[binding]);
        self.use_var(var, pointee);
        var
    }

    /// A push-constant block the entry point loads from.
    pub fn push_constant(&mut self, name: &str, block: Word) -> Word {
        let var = self.global(name, block, StorageClass::PushConstant);
        self.use_var(var, block);
        var
    }

    /// A stage input or output at `location`, listed in the entry point interface.
    pub fn interface(&mut self, name: &str, ty: Word, class: StorageClass, location: Option<u32>) -> Word {
        let var = self.global(name, ty, class);
        if let Some(location) = location {
            self.decorate(var, Decoration::Location, &[location]);
        }
        self.interface.push(var);
        var
    }

    /// Makes the entry point function load from `var`.
    pub fn use_var(&mut self, var: Word, pointee: Word) {
        self.used.push((var, pointee));
    }

    pub fn execution_mode(&mut self, mode: ExecutionMode, args: &[u32]) {
        self.modes.push((mode, args.to_vec()));
    }

    /// Emits the entry point and assembles the module into little-endian bytes.
    pub fn finish(mut self, model: ExecutionModel, entry: &str) -> Result<Vec<u8>, dr::Error> {
        let void = self.builder.type_void();
        let fn_ty = self.builder.type_function(void, vec![]);
        let function = self
            .builder
            .begin_function(void, None, FunctionControl::NONE, fn_ty)?;
        self.builder.begin_block(None)?;
        for (var, pointee) in std::mem::take(&mut self.used) {
            self.builder.load(pointee, None, var, None, [])?;
        }
        self.builder.ret()?;
        self.builder.end_function()?;

        let interface = std::mem::take(&mut self.interface);
        self.builder.entry_point(model, function, entry, interface);
        if model == ExecutionModel::GLCompute && self.modes.is_empty() {
            self.modes.push((ExecutionMode::LocalSize, vec![1, 1, 1]));
        }
        for (mode, args) in std::mem::take(&mut self.modes) {
            self.builder.execution_mode(function, mode, args);
        }

        let mut module = self.builder.module();
        module.types_global_values.extend(self.extra);
        Ok(module
            .assemble()
            .into_iter()
            .flat_map(u32::to_le_bytes)
            .collect())
    }
}

/// Cache key for a test module.
pub fn params(code: Vec<u8>, entry: &str, stage: ShaderStage) -> IntrospectionParams {
    IntrospectionParams::new(ShaderModule::spirv(code), entry, stage)
}

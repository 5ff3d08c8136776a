//! Type tree construction for buffer and push-constant blocks.
//!
//! Walks the module's type table from a block's struct type and writes one
//! [`Member`] record per struct member into the stage's [`TypeArena`].
//! Children are sized before their parents, so nested struct sizes and
//! array strides are known when the parent's offsets are laid out.

use rspirv::spirv::{StorageClass, Word};
use spvi_ir::{ArrayInfo, Member, MemoryBlock, MemoryLayout, Span, TypeArena, TypeInfo, VarType};

use crate::IntrospectionError;
use crate::decode::{Decorations, SpirvModule, SpirvType};
use crate::layout::{Extent, Rules, round_up};

/// What a top-level block is bound as; decides where runtime-sized arrays
/// are legal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BlockRole {
    Uniform,
    Storage,
    PushConstant,
}

#[derive(Debug)]
pub(crate) struct BuiltBlock {
    pub block: MemoryBlock,
    /// Offset of a runtime-sized trailing member, else the block size.
    pub size_without_last_member: u32,
}

/// A sized member type, arrays included.
struct Node {
    dims: Vec<ArrayInfo>,
    stride: u32,
    extent: Extent,
    type_info: TypeInfo,
    members: Span<Member>,
}

/// The innermost element of a member type.
struct Leaf {
    extent: Extent,
    type_info: TypeInfo,
    members: Span<Member>,
}

pub(crate) struct TypeGraph<'a> {
    module: &'a SpirvModule,
    arena: &'a mut TypeArena,
    max_depth: usize,
    /// Struct ids currently being expanded, innermost last.
    visiting: Vec<Word>,
}

fn malformed(msg: impl Into<String>) -> IntrospectionError {
    IntrospectionError::MalformedInput(msg.into())
}

impl<'a> TypeGraph<'a> {
    pub fn new(module: &'a SpirvModule, arena: &'a mut TypeArena, max_depth: usize) -> Self {
        Self {
            module,
            arena,
            max_depth,
            visiting: Vec::new(),
        }
    }

    /// Builds the type tree rooted at the struct `block_ty`.
    pub fn build_block(
        &mut self,
        block_ty: Word,
        role: BlockRole,
        layout: MemoryLayout,
    ) -> Result<BuiltBlock, IntrospectionError> {
        log::debug!("laying out block %{block_ty} as {role:?} with {layout:?} rules");
        let rules = Rules::new(layout);
        let (members, extent) = self.struct_members(block_ty, &rules, Some(role), 0)?;
        let last_runtime_offset = self
            .arena
            .resolve(members)
            .last()
            .filter(|m| {
                self.arena
                    .resolve(m.dims)
                    .first()
                    .is_some_and(ArrayInfo::is_runtime_sized)
            })
            .map(|m| m.offset);
        Ok(BuiltBlock {
            block: MemoryBlock {
                members,
                size: extent.size,
                layout,
            },
            size_without_last_member: last_runtime_offset.unwrap_or(extent.size),
        })
    }

    fn struct_members(
        &mut self,
        struct_ty: Word,
        rules: &Rules,
        top_level: Option<BlockRole>,
        depth: usize,
    ) -> Result<(Span<Member>, Extent), IntrospectionError> {
        if depth > self.max_depth {
            return Err(malformed(format!(
                "type nesting deeper than {} at %{struct_ty}",
                self.max_depth
            )));
        }
        if self.visiting.contains(&struct_ty) {
            return Err(malformed(format!("struct %{struct_ty} contains itself")));
        }
        let module = self.module;
        let SpirvType::Struct { members } = module.ty(struct_ty)? else {
            return Err(malformed(format!("%{struct_ty} is not a struct")));
        };

        self.visiting.push(struct_ty);
        let result = self.lay_out_members(struct_ty, members, rules, top_level, depth);
        self.visiting.pop();
        result
    }

    fn lay_out_members(
        &mut self,
        struct_ty: Word,
        member_types: &[Word],
        rules: &Rules,
        top_level: Option<BlockRole>,
        depth: usize,
    ) -> Result<(Span<Member>, Extent), IntrospectionError> {
        let module = self.module;
        let mut members = Vec::with_capacity(member_types.len());
        let mut cursor = 0u32;
        let mut end = 0u32;
        let mut max_align = 1u32;
        let mut decorated = false;

        for (index, &member_ty) in (0u32..).zip(member_types) {
            let decorations = module.member_decorations(struct_ty, index);
            let node = self.node(member_ty, rules, decorations, depth + 1)?;

            if let Some(pos) = node.dims.iter().position(ArrayInfo::is_runtime_sized) {
                let is_last = index as usize + 1 == member_types.len();
                if pos != 0 || !is_last || top_level != Some(BlockRole::Storage) {
                    return Err(malformed(format!(
                        "runtime-sized array in member {index} of %{struct_ty} is only allowed \
                         as the last member of a storage block"
                    )));
                }
            }

            let offset = match decorations.offset {
                Some(offset) => {
                    decorated = true;
                    offset
                }
                None => round_up(cursor, node.extent.align),
            };
            cursor = offset.saturating_add(node.extent.size);
            end = end.max(cursor);
            max_align = max_align.max(node.extent.align);

            let name = self.arena.write_string(module.member_name(struct_ty, index));
            let dims = self.arena.push_dims(&node.dims);
            members.push(Member {
                name,
                offset,
                dims,
                stride: node.stride,
                size: node.extent.size,
                type_info: node.type_info,
                qualifiers: decorations.qualifiers,
                members: node.members,
            });
        }

        let align = rules.struct_align(max_align);
        // Decorated offsets and push-constant blocks keep the bytes they touch.
        let size = if decorated || top_level == Some(BlockRole::PushConstant) {
            end
        } else {
            round_up(end, align)
        };
        Ok((self.arena.push_members(members), Extent { size, align }))
    }

    fn node(
        &mut self,
        ty: Word,
        rules: &Rules,
        decorations: &Decorations,
        depth: usize,
    ) -> Result<Node, IntrospectionError> {
        let module = self.module;

        // Peel array dimensions, outermost first.
        let mut dims = Vec::new();
        let mut levels = Vec::new();
        let mut current = ty;
        loop {
            let (dim, count, element) = match module.ty(current)? {
                SpirvType::Array { element, length } => {
                    let (dim, count) = module.array_length(*length)?;
                    (dim, count, *element)
                }
                SpirvType::RuntimeArray { element } => (ArrayInfo::RuntimeSized, 0, *element),
                _ => break,
            };
            if dims.len() >= self.max_depth {
                return Err(malformed(format!("too many array dimensions in %{ty}")));
            }
            dims.push(dim);
            levels.push((current, count));
            current = element;
        }

        let leaf = self.leaf(current, rules, decorations, depth)?;

        // Size arrays from the innermost dimension outwards.
        let mut extent = leaf.extent;
        let mut stride = 0;
        for &(array_ty, count) in levels.iter().rev() {
            stride = match module.decorations(array_ty).array_stride {
                Some(stride) => stride,
                None => rules.array_stride(extent),
            };
            extent = Extent {
                size: stride.saturating_mul(count),
                align: rules.array_align(extent.align),
            };
        }

        Ok(Node {
            dims,
            stride,
            extent,
            type_info: leaf.type_info,
            members: leaf.members,
        })
    }

    fn leaf(
        &mut self,
        ty: Word,
        rules: &Rules,
        decorations: &Decorations,
        depth: usize,
    ) -> Result<Leaf, IntrospectionError> {
        let module = self.module;
        let leaf = match module.ty(ty)? {
            SpirvType::Int { .. } | SpirvType::Float { .. } => {
                let scalar = self.scalar_type(ty)?;
                Leaf {
                    extent: rules.scalar(scalar.byte_size()),
                    type_info: TypeInfo::scalar(scalar),
                    members: Span::empty(),
                }
            }
            SpirvType::Vector { component, count } => {
                let scalar = self.scalar_type(*component)?;
                let count = vector_len(*count, ty)?;
                Leaf {
                    extent: rules.vector(scalar.byte_size(), u32::from(count)),
                    type_info: TypeInfo::vector(scalar, count),
                    members: Span::empty(),
                }
            }
            SpirvType::Matrix { column, count } => {
                let SpirvType::Vector {
                    component,
                    count: rows,
                } = module.ty(*column)?
                else {
                    return Err(malformed(format!("matrix %{ty} has non-vector columns")));
                };
                let scalar = self.scalar_type(*component)?;
                if !scalar.is_float() {
                    return Err(malformed(format!("matrix %{ty} of {scalar:?}")));
                }
                let rows = vector_len(*rows, ty)?;
                let columns = vector_len(*count, ty)?;
                let row_major = decorations.row_major;
                let (vector_len, vectors) = if row_major {
                    (columns, rows)
                } else {
                    (rows, columns)
                };
                let component = scalar.byte_size();
                let stride = decorations
                    .matrix_stride
                    .unwrap_or_else(|| rules.matrix_stride(component, u32::from(vector_len)));
                Leaf {
                    extent: rules.matrix(
                        component,
                        u32::from(vector_len),
                        u32::from(vectors),
                        stride,
                    ),
                    type_info: TypeInfo::matrix(scalar, rows, columns, row_major, stride),
                    members: Span::empty(),
                }
            }
            SpirvType::Struct { .. } => {
                let (members, extent) = self.struct_members(ty, rules, None, depth)?;
                Leaf {
                    extent,
                    type_info: TypeInfo::structure(),
                    members,
                }
            }
            SpirvType::Pointer {
                storage_class: StorageClass::PhysicalStorageBuffer,
                ..
            } => Leaf {
                extent: Extent { size: 8, align: 8 },
                type_info: TypeInfo::scalar(VarType::U64),
                members: Span::empty(),
            },
            SpirvType::Bool => {
                return Err(malformed(format!("boolean %{ty} inside a block")));
            }
            other => {
                return Err(malformed(format!(
                    "type %{ty} ({other:?}) cannot appear inside a block"
                )));
            }
        };
        Ok(leaf)
    }

    fn scalar_type(&self, ty: Word) -> Result<VarType, IntrospectionError> {
        scalar_type(self.module, ty)
    }
}

/// Base type of an integer or float type id.
pub(crate) fn scalar_type(module: &SpirvModule, ty: Word) -> Result<VarType, IntrospectionError> {
    match *module.ty(ty)? {
        SpirvType::Int { width, signed } => VarType::int(width, signed)
            .ok_or_else(|| malformed(format!("unsupported integer width {width}"))),
        SpirvType::Float { width } => {
            VarType::float(width).ok_or_else(|| malformed(format!("unsupported float width {width}")))
        }
        ref other => Err(malformed(format!("%{ty} ({other:?}) is not a numeric scalar"))),
    }
}

fn vector_len(count: u32, ty: Word) -> Result<u8, IntrospectionError> {
    match count {
        2..=4 => Ok(count as u8),
        _ => Err(malformed(format!("unsupported vector length {count} in %{ty}"))),
    }
}

#[cfg(test)]
mod tests {
    use rspirv::spirv::{Decoration, ExecutionModel};

    use super::*;
    use crate::testing::ShaderBuilder;

    fn build(
        sb: ShaderBuilder,
        block: Word,
        role: BlockRole,
        layout: MemoryLayout,
    ) -> Result<(TypeArena, BuiltBlock), IntrospectionError> {
        let code = sb.finish(ExecutionModel::GLCompute, "main").unwrap();
        let module = SpirvModule::parse(&code).unwrap();
        let mut arena = TypeArena::new();
        let built = TypeGraph::new(&module, &mut arena, 64).build_block(block, role, layout)?;
        Ok((arena, built))
    }

    fn offsets(arena: &TypeArena, members: Span<Member>) -> Vec<u32> {
        arena.resolve(members).iter().map(|m| m.offset).collect()
    }

    #[test]
    fn decorated_offsets_win() {
        let mut sb = ShaderBuilder::new();
        let f32_ty = sb.f32_type();
        let block = sb.block("B", &[("a", f32_ty, Some(0)), ("b", f32_ty, Some(32))]);
        let (arena, built) = build(sb, block, BlockRole::Uniform, MemoryLayout::Std140).unwrap();
        assert_eq!(offsets(&arena, built.block.members), [0, 32]);
        assert_eq!(built.block.size, 36);
    }

    #[test]
    fn std140_and_std430_undecorated() {
        let make = || {
            let mut sb = ShaderBuilder::new();
            let f32_ty = sb.f32_type();
            let vec3 = sb.vector_type(f32_ty, 3);
            let floats = sb.array_type(f32_ty, 3);
            let inner = sb.struct_type("Inner", &[("x", f32_ty, None)]);
            let block = sb.block(
                "B",
                &[
                    ("v", vec3, None),
                    ("s", f32_ty, None),
                    ("arr", floats, None),
                    ("inner", inner, None),
                    ("tail", f32_ty, None),
                ],
            );
            (sb, block)
        };

        let (sb, block) = make();
        let (arena, built) = build(sb, block, BlockRole::Uniform, MemoryLayout::Std140).unwrap();
        let members = arena.resolve(built.block.members);
        assert_eq!(offsets(&arena, built.block.members), [0, 12, 16, 64, 80]);
        assert_eq!(members[2].stride, 16);
        assert_eq!(members[2].size, 48);
        assert_eq!(members[3].size, 16);
        assert_eq!(built.block.size, 96);

        let (sb, block) = make();
        let (arena, built) = build(sb, block, BlockRole::Storage, MemoryLayout::Std430).unwrap();
        let members = arena.resolve(built.block.members);
        assert_eq!(offsets(&arena, built.block.members), [0, 12, 16, 28, 32]);
        assert_eq!(members[2].stride, 4);
        assert_eq!(members[3].size, 4);
        // vec3 raises the block alignment to 16.
        assert_eq!(built.block.size, 48);
    }

    #[test]
    fn push_constant_block_keeps_touched_size() {
        let mut sb = ShaderBuilder::new();
        let f32_ty = sb.f32_type();
        let vec4 = sb.vector_type(f32_ty, 4);
        let block = sb.block("P", &[("color", vec4, None), ("scale", f32_ty, None)]);
        let (_, built) = build(sb, block, BlockRole::PushConstant, MemoryLayout::Std430).unwrap();
        assert_eq!(built.block.size, 20);
    }

    #[test]
    fn matrices_follow_majorness() {
        let mut sb = ShaderBuilder::new();
        let mat3 = sb.matrix_type(3, 3);
        let mat2x4 = sb.matrix_type(4, 2);
        let block = sb.block("M", &[("a", mat3, None), ("b", mat2x4, None)]);
        sb.member_decorate(block, 1, Decoration::RowMajor, &[]);
        let (arena, built) = build(sb, block, BlockRole::Storage, MemoryLayout::Std430).unwrap();
        let members = arena.resolve(built.block.members);
        assert_eq!(members[0].type_info.matrix_stride, 16);
        assert_eq!(members[0].size, 48);
        // Row-major: four rows of two-component vectors.
        assert!(members[1].type_info.row_major);
        assert_eq!(members[1].type_info.matrix_stride, 8);
        assert_eq!(members[1].offset, 48);
        assert_eq!(members[1].size, 32);
    }

    #[test]
    fn spec_sized_array_uses_default_count() {
        let mut sb = ShaderBuilder::new();
        let f32_ty = sb.f32_type();
        let len = sb.spec_constant_u32(5, 2);
        let arr = sb.array_type_sized_by(f32_ty, len);
        sb.array_stride(arr, 4);
        let block = sb.block("P", &[("weights", arr, Some(0))]);
        let (arena, built) =
            build(sb, block, BlockRole::PushConstant, MemoryLayout::Std430).unwrap();
        let member = &arena.resolve(built.block.members)[0];
        assert_eq!(arena.resolve(member.dims), &[ArrayInfo::SpecConstant { id: 5 }]);
        assert_eq!(member.size, 8);
        assert!(built.block.has_spec_sized_arrays(&arena));
    }

    #[test]
    fn runtime_array_only_last_in_storage() {
        let make = |last: bool| {
            let mut sb = ShaderBuilder::new();
            let u32_ty = sb.u32_type();
            let rt = sb.runtime_array_type(u32_ty);
            sb.array_stride(rt, 4);
            let members: Vec<(&str, Word, Option<u32>)> = if last {
                vec![("count", u32_ty, Some(0)), ("data", rt, Some(4))]
            } else {
                vec![("data", rt, Some(0)), ("count", u32_ty, Some(4))]
            };
            let block = sb.block("S", &members);
            (sb, block)
        };

        let (sb, block) = make(true);
        let (arena, built) = build(sb, block, BlockRole::Storage, MemoryLayout::Std430).unwrap();
        assert_eq!(built.size_without_last_member, 4);
        assert_eq!(built.block.size, 4);
        assert!(arena.resolve(arena.resolve(built.block.members)[1].dims)[0].is_runtime_sized());

        let (sb, block) = make(false);
        assert!(matches!(
            build(sb, block, BlockRole::Storage, MemoryLayout::Std430),
            Err(IntrospectionError::MalformedInput(_))
        ));

        let (sb, block) = make(true);
        assert!(matches!(
            build(sb, block, BlockRole::Uniform, MemoryLayout::Std140),
            Err(IntrospectionError::MalformedInput(_))
        ));
    }

    #[test]
    fn recursive_struct_is_rejected() {
        let mut sb = ShaderBuilder::new();
        let f32_ty = sb.f32_type();
        // Forward-declare the block id so a member can refer to it.
        let block = sb.id();
        let arr = sb.array_type(block, 2);
        sb.push_global(rspirv::dr::Instruction::new(
            rspirv::spirv::Op::TypeStruct,
            None,
            Some(block),
            vec![
                rspirv::dr::Operand::IdRef(f32_ty),
                rspirv::dr::Operand::IdRef(arr),
            ],
        ));
        sb.decorate(block, Decoration::Block, &[]);
        let err = build(sb, block, BlockRole::Storage, MemoryLayout::Std430).unwrap_err();
        assert!(err.to_string().contains("contains itself"));
    }

    #[test]
    fn depth_cap() {
        let mut sb = ShaderBuilder::new();
        let mut ty = sb.f32_type();
        for i in 0..70 {
            ty = sb.struct_type(&format!("S{i}"), &[("x", ty, None)]);
        }
        let (sb, block) = {
            let block = sb.block("Deep", &[("s", ty, None)]);
            (sb, block)
        };
        let err = build(sb, block, BlockRole::Storage, MemoryLayout::Std430).unwrap_err();
        assert!(err.to_string().contains("nesting"));
    }

    #[test]
    fn bool_member_is_rejected() {
        let mut sb = ShaderBuilder::new();
        let bool_ty = sb.builder().type_bool();
        let block = sb.block("B", &[("flag", bool_ty, None)]);
        assert!(build(sb, block, BlockRole::Uniform, MemoryLayout::Std140).is_err());
    }
}

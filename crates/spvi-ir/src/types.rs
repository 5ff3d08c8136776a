//! Introspected type tree: scalar/vector/matrix shapes, arrays and members.

use crate::arena::{Span, TypeArena};
use crate::error::IrError;

/// Base scalar type of a variable, member or constant.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum VarType {
    /// Aggregate (struct) or an opaque type with no scalar base.
    #[default]
    UnknownOrStruct,
    U64,
    I64,
    U32,
    I32,
    U16,
    I16,
    U8,
    I8,
    F64,
    F32,
    F16,
    /// Only produced for specialization constants; blocks and interfaces
    /// cannot contain booleans.
    Bool,
}

impl VarType {
    /// Integer type of the given bit width, if supported.
    pub fn int(width: u32, signed: bool) -> Option<Self> {
        Some(match (width, signed) {
            (8, false) => Self::U8,
            (8, true) => Self::I8,
            (16, false) => Self::U16,
            (16, true) => Self::I16,
            (32, false) => Self::U32,
            (32, true) => Self::I32,
            (64, false) => Self::U64,
            (64, true) => Self::I64,
            _ => return None,
        })
    }

    /// Floating point type of the given bit width, if supported.
    pub fn float(width: u32) -> Option<Self> {
        Some(match width {
            16 => Self::F16,
            32 => Self::F32,
            64 => Self::F64,
            _ => return None,
        })
    }

    /// Size in bytes; `0` for [`VarType::UnknownOrStruct`].
    pub fn byte_size(self) -> u32 {
        match self {
            Self::UnknownOrStruct => 0,
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 | Self::F16 => 2,
            Self::U32 | Self::I32 | Self::F32 | Self::Bool => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
        }
    }

    pub fn is_signed_int(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }

    pub fn is_unsigned_int(self) -> bool {
        matches!(self, Self::U8 | Self::U16 | Self::U32 | Self::U64)
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::F16 | Self::F32 | Self::F64)
    }
}

/// Shape of a leaf type.
///
/// `rows` is the vector length (1 for scalars), `columns` the number of
/// matrix columns (1 for scalars and vectors).
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct TypeInfo {
    pub rows: u8,
    pub columns: u8,
    /// Only meaningful for matrices; `false` means column-major.
    pub row_major: bool,
    /// Byte stride between matrix columns (rows if row-major); `0` if not a matrix.
    pub matrix_stride: u32,
    pub ty: VarType,
}

impl Default for TypeInfo {
    fn default() -> Self {
        Self::structure()
    }
}

impl TypeInfo {
    pub const fn scalar(ty: VarType) -> Self {
        Self {
            rows: 1,
            columns: 1,
            row_major: false,
            matrix_stride: 0,
            ty,
        }
    }

    pub const fn vector(ty: VarType, rows: u8) -> Self {
        Self {
            rows,
            ..Self::scalar(ty)
        }
    }

    pub const fn matrix(
        ty: VarType,
        rows: u8,
        columns: u8,
        row_major: bool,
        matrix_stride: u32,
    ) -> Self {
        Self {
            rows,
            columns,
            row_major,
            matrix_stride,
            ty,
        }
    }

    pub const fn structure() -> Self {
        Self::scalar(VarType::UnknownOrStruct)
    }

    pub fn is_struct(&self) -> bool {
        self.ty == VarType::UnknownOrStruct
    }

    pub fn is_scalar(&self) -> bool {
        !self.is_struct() && self.rows == 1 && self.columns == 1
    }

    pub fn is_vector(&self) -> bool {
        !self.is_struct() && self.rows > 1 && self.columns == 1
    }

    pub fn is_matrix(&self) -> bool {
        !self.is_struct() && self.columns > 1
    }
}

bitflags::bitflags! {
    /// Memory qualifiers carried by a member or resource.
    #[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq)]
    pub struct Qualifiers: u8 {
        const RESTRICT = 1 << 0;
        const VOLATILE = 1 << 1;
        const COHERENT = 1 << 2;
        const READONLY = 1 << 3;
        const WRITEONLY = 1 << 4;
        const ALIASED = 1 << 5;
    }
}

/// Element count of one array dimension.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum ArrayInfo {
    /// Literal element count.
    Fixed(u32),
    /// Sized by the specialization constant with this `SpecId`.
    SpecConstant { id: u32 },
    /// Unknown until a buffer is bound; only legal as the trailing member of a
    /// storage block, or as a descriptor array.
    RuntimeSized,
}

impl ArrayInfo {
    pub fn is_runtime_sized(&self) -> bool {
        matches!(self, Self::RuntimeSized)
    }

    pub fn is_spec_constant(&self) -> bool {
        matches!(self, Self::SpecConstant { .. })
    }

    /// The literal count, if fixed.
    pub fn fixed(&self) -> Option<u32> {
        match *self {
            Self::Fixed(n) => Some(n),
            _ => None,
        }
    }

    /// Resolves the count, looking spec-constant sizes up with `lookup`.
    ///
    /// Runtime-sized dimensions resolve to `0`.
    pub fn resolve(&self, lookup: &dyn Fn(u32) -> Option<u32>) -> Result<u32, IrError> {
        match *self {
            Self::Fixed(n) => Ok(n),
            Self::SpecConstant { id } => lookup(id).ok_or(IrError::UnresolvedSpecConstant(id)),
            Self::RuntimeSized => Ok(0),
        }
    }
}

/// Memory layout convention of a block.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq)]
pub enum MemoryLayout {
    /// Uniform-buffer rules: aggregates and array elements padded to 16 bytes.
    #[default]
    Std140,
    /// Storage-buffer rules: natural alignment, vec3 aligned as vec4.
    Std430,
    /// Scalar block layout: everything aligned to its component size.
    Scalar,
}

/// One member of a block or struct.
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq)]
pub struct Member {
    pub name: Span<str>,
    /// Byte offset from the start of the enclosing struct.
    pub offset: u32,
    /// Array dimensions, outermost first; empty if not an array.
    pub dims: Span<ArrayInfo>,
    /// Byte stride of the outermost dimension; `0` if not an array.
    pub stride: u32,
    /// Size of the whole member, every array element included.
    ///
    /// Spec-constant dimensions are counted at their default value and
    /// runtime-sized ones as zero elements.
    pub size: u32,
    /// Leaf shape of the (innermost) element type.
    pub type_info: TypeInfo,
    pub qualifiers: Qualifiers,
    /// Members of the element type, if it is a struct.
    pub members: Span<Member>,
}

impl Member {
    pub fn is_array(&self) -> bool {
        !self.dims.is_empty()
    }

    pub fn is_struct(&self) -> bool {
        !self.members.is_empty() || self.type_info.is_struct()
    }

    /// Bytes touched by this member once every spec-constant dimension inside
    /// it is resolved with `lookup`.
    pub fn extent(
        &self,
        arena: &TypeArena,
        lookup: &dyn Fn(u32) -> Option<u32>,
    ) -> Result<u32, IrError> {
        let dims = arena.try_resolve(self.dims)?;
        let mut outer = None;
        for dim in dims {
            let count = dim.resolve(lookup)?;
            outer.get_or_insert(count);
        }
        match outer {
            Some(count) => Ok(count.saturating_mul(self.stride)),
            None if !self.members.is_empty() => {
                let nested = struct_extent(arena, self.members, lookup)?;
                // Trailing padding of the struct, measured at declared sizes.
                let padding = self.size.saturating_sub(declared_extent(arena, self.members)?);
                Ok(nested.saturating_add(padding))
            }
            None => Ok(self.size),
        }
    }
}

/// Root of a buffer or push-constant type tree.
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq)]
pub struct MemoryBlock {
    pub members: Span<Member>,
    /// Declared size; see [`Member::size`] for how arrays are counted.
    pub size: u32,
    pub layout: MemoryLayout,
}

impl MemoryBlock {
    /// Bytes touched by the block under the specialization `lookup`.
    pub fn extent(
        &self,
        arena: &TypeArena,
        lookup: &dyn Fn(u32) -> Option<u32>,
    ) -> Result<u32, IrError> {
        struct_extent(arena, self.members, lookup)
    }

    /// Lowest member offset, or `0` for an empty block.
    pub fn first_offset(&self, arena: &TypeArena) -> u32 {
        arena
            .resolve(self.members)
            .iter()
            .map(|m| m.offset)
            .min()
            .unwrap_or(0)
    }

    /// Returns `true` if any array dimension in the tree is spec-constant sized.
    pub fn has_spec_sized_arrays(&self, arena: &TypeArena) -> bool {
        fn walk(arena: &TypeArena, members: Span<Member>) -> bool {
            arena.resolve(members).iter().any(|m| {
                arena.resolve(m.dims).iter().any(ArrayInfo::is_spec_constant)
                    || walk(arena, m.members)
            })
        }
        walk(arena, self.members)
    }
}

fn struct_extent(
    arena: &TypeArena,
    members: Span<Member>,
    lookup: &dyn Fn(u32) -> Option<u32>,
) -> Result<u32, IrError> {
    let mut end = 0u32;
    for member in arena.try_resolve(members)? {
        let extent = member.extent(arena, lookup)?;
        end = end.max(member.offset.saturating_add(extent));
    }
    Ok(end)
}

fn declared_extent(arena: &TypeArena, members: Span<Member>) -> Result<u32, IrError> {
    Ok(arena
        .try_resolve(members)?
        .iter()
        .map(|m| m.offset.saturating_add(m.size))
        .max()
        .unwrap_or(0))
}

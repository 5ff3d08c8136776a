//! Alignment, stride and size rules for block members without explicit
//! layout decorations.

use spvi_ir::MemoryLayout;

pub(crate) fn round_up(value: u32, align: u32) -> u32 {
    if align <= 1 {
        value
    } else {
        value.div_ceil(align).saturating_mul(align)
    }
}

/// Size and base alignment of a type under some convention.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Extent {
    pub size: u32,
    pub align: u32,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Rules {
    layout: MemoryLayout,
}

impl Rules {
    pub fn new(layout: MemoryLayout) -> Self {
        Self { layout }
    }

    pub fn scalar(&self, bytes: u32) -> Extent {
        Extent {
            size: bytes,
            align: bytes,
        }
    }

    /// `count`-component vector of `component`-byte scalars.
    pub fn vector(&self, component: u32, count: u32) -> Extent {
        let align = match (self.layout, count) {
            (MemoryLayout::Scalar, _) => component,
            (_, 2) => 2 * component,
            _ => 4 * component,
        };
        Extent {
            size: component * count,
            align,
        }
    }

    /// Stride between the vectors of a matrix; `vector_len` is the column
    /// length for column-major matrices and the row length for row-major ones.
    pub fn matrix_stride(&self, component: u32, vector_len: u32) -> u32 {
        let vector = self.vector(component, vector_len);
        match self.layout {
            MemoryLayout::Std140 => round_up(vector.align, 16),
            MemoryLayout::Std430 => vector.align,
            MemoryLayout::Scalar => vector.size,
        }
    }

    pub fn matrix(&self, component: u32, vector_len: u32, vectors: u32, stride: u32) -> Extent {
        let vector_align = self.vector(component, vector_len).align;
        let align = match self.layout {
            MemoryLayout::Std140 => round_up(vector_align, 16),
            _ => vector_align,
        };
        Extent {
            size: stride.saturating_mul(vectors),
            align,
        }
    }

    pub fn array_align(&self, element_align: u32) -> u32 {
        match self.layout {
            MemoryLayout::Std140 => round_up(element_align.max(1), 16),
            _ => element_align,
        }
    }

    pub fn array_stride(&self, element: Extent) -> u32 {
        round_up(element.size, self.array_align(element.align))
    }

    pub fn struct_align(&self, max_member_align: u32) -> u32 {
        match self.layout {
            MemoryLayout::Std140 => round_up(max_member_align.max(1), 16),
            _ => max_member_align.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STD140: Rules = Rules {
        layout: MemoryLayout::Std140,
    };
    const STD430: Rules = Rules {
        layout: MemoryLayout::Std430,
    };
    const SCALAR: Rules = Rules {
        layout: MemoryLayout::Scalar,
    };

    #[test]
    fn rounding() {
        assert_eq!(round_up(0, 16), 0);
        assert_eq!(round_up(1, 16), 16);
        assert_eq!(round_up(16, 16), 16);
        assert_eq!(round_up(13, 1), 13);
        assert_eq!(round_up(13, 0), 13);
    }

    #[test]
    fn vec3_alignment() {
        assert_eq!(STD140.vector(4, 3), Extent { size: 12, align: 16 });
        assert_eq!(STD430.vector(4, 3), Extent { size: 12, align: 16 });
        assert_eq!(SCALAR.vector(4, 3), Extent { size: 12, align: 4 });
        assert_eq!(STD430.vector(4, 2).align, 8);
        assert_eq!(STD430.vector(8, 2).align, 16);
    }

    #[test]
    fn float_array_strides() {
        let f = STD140.scalar(4);
        assert_eq!(STD140.array_stride(f), 16);
        assert_eq!(STD430.array_stride(f), 4);
        assert_eq!(SCALAR.array_stride(f), 4);

        let v3 = STD430.vector(4, 3);
        assert_eq!(STD430.array_stride(v3), 16);
        assert_eq!(SCALAR.array_stride(SCALAR.vector(4, 3)), 12);
    }

    #[test]
    fn matrix_strides() {
        assert_eq!(STD140.matrix_stride(4, 2), 16);
        assert_eq!(STD430.matrix_stride(4, 2), 8);
        assert_eq!(STD430.matrix_stride(4, 3), 16);
        assert_eq!(SCALAR.matrix_stride(4, 3), 12);

        let mat4 = STD140.matrix(4, 4, 4, 16);
        assert_eq!(mat4, Extent { size: 64, align: 16 });
        let mat2 = STD430.matrix(4, 2, 2, 8);
        assert_eq!(mat2, Extent { size: 16, align: 8 });
    }

    #[test]
    fn struct_alignment() {
        assert_eq!(STD140.struct_align(4), 16);
        assert_eq!(STD430.struct_align(4), 4);
        assert_eq!(SCALAR.struct_align(0), 1);
    }
}

//! Descriptor bindings and their kind-specific payloads.

use crate::arena::{Span, TypeArena};
use crate::types::{ArrayInfo, MemoryBlock, Qualifiers};

/// Descriptor type of a binding, as a graphics API sees it.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum DescriptorKind {
    Sampler,
    CombinedImageSampler,
    SampledImage,
    StorageImage,
    UniformTexelBuffer,
    StorageTexelBuffer,
    UniformBuffer,
    StorageBuffer,
    InputAttachment,
}

/// Dimensionality of the image view a shader expects.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum ImageViewType {
    D1,
    D1Array,
    D2,
    D2Array,
    D3,
    Cube,
    CubeArray,
}

/// Texel format declared on a storage image or storage texel buffer.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq)]
pub enum StorageFormat {
    /// The shader accesses the image without a declared format.
    #[default]
    Unknown,
    Rgba32f,
    Rgba16f,
    R32f,
    Rgba8,
    Rgba8Snorm,
    Rg32f,
    Rg16f,
    R11fG11fB10f,
    R16f,
    Rgba16,
    Rgb10A2,
    Rg16,
    Rg8,
    R16,
    R8,
    Rgba16Snorm,
    Rg16Snorm,
    Rg8Snorm,
    R16Snorm,
    R8Snorm,
    Rgba32i,
    Rgba16i,
    Rgba8i,
    R32i,
    Rg32i,
    Rg16i,
    Rg8i,
    R16i,
    R8i,
    Rgba32ui,
    Rgba16ui,
    Rgba8ui,
    R32ui,
    Rgb10a2ui,
    Rg32ui,
    Rg16ui,
    Rg8ui,
    R16ui,
    R8ui,
    R64ui,
    R64i,
}

/// Properties shared by every image-like descriptor.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct ImageInfo {
    pub view_type: ImageViewType,
    pub multisample: bool,
    /// Depth-comparison image.
    pub shadow: bool,
}

/// A storage buffer's block type.
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq)]
pub struct StorageBufferBlock {
    pub block: MemoryBlock,
    /// Size of the block excluding a runtime-sized trailing member.
    pub size_without_last_member: u32,
}

impl StorageBufferBlock {
    /// Returns `true` if the last member is a runtime-sized array.
    pub fn is_last_member_runtime_sized(&self, arena: &TypeArena) -> bool {
        arena
            .resolve(self.block.members)
            .last()
            .and_then(|m| arena.resolve(m.dims).first())
            .is_some_and(ArrayInfo::is_runtime_sized)
    }

    /// Size of the buffer when the runtime-sized tail holds `elements` elements.
    pub fn runtime_size(&self, arena: &TypeArena, elements: u64) -> u64 {
        if !self.is_last_member_runtime_sized(arena) {
            return u64::from(self.size_without_last_member);
        }
        let stride = arena
            .resolve(self.block.members)
            .last()
            .map_or(0, |m| u64::from(m.stride));
        u64::from(self.size_without_last_member).saturating_add(elements.saturating_mul(stride))
    }
}

/// Kind-specific data of a descriptor binding.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum DescriptorPayload {
    Sampler,
    CombinedImageSampler(ImageInfo),
    SampledImage(ImageInfo),
    StorageImage {
        format: StorageFormat,
        image: ImageInfo,
    },
    UniformTexelBuffer,
    StorageTexelBuffer {
        format: StorageFormat,
    },
    UniformBuffer(MemoryBlock),
    StorageBuffer(StorageBufferBlock),
    InputAttachment {
        index: u32,
        multisample: bool,
    },
}

impl DescriptorPayload {
    pub fn kind(&self) -> DescriptorKind {
        match self {
            Self::Sampler => DescriptorKind::Sampler,
            Self::CombinedImageSampler(_) => DescriptorKind::CombinedImageSampler,
            Self::SampledImage(_) => DescriptorKind::SampledImage,
            Self::StorageImage { .. } => DescriptorKind::StorageImage,
            Self::UniformTexelBuffer => DescriptorKind::UniformTexelBuffer,
            Self::StorageTexelBuffer { .. } => DescriptorKind::StorageTexelBuffer,
            Self::UniformBuffer(_) => DescriptorKind::UniformBuffer,
            Self::StorageBuffer(_) => DescriptorKind::StorageBuffer,
            Self::InputAttachment { .. } => DescriptorKind::InputAttachment,
        }
    }

    /// The block type of a buffer descriptor.
    pub fn block(&self) -> Option<&MemoryBlock> {
        match self {
            Self::UniformBuffer(block) => Some(block),
            Self::StorageBuffer(storage) => Some(&storage.block),
            _ => None,
        }
    }
}

/// A resource slot at a `(set, binding)` coordinate.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct DescriptorBinding {
    pub set: u32,
    pub binding: u32,
    /// Variable name, or the block name for buffers.
    pub name: Span<str>,
    /// `None` if the binding is not an array.
    pub count: Option<ArrayInfo>,
    pub qualifiers: Qualifiers,
    pub payload: DescriptorPayload,
}

impl DescriptorBinding {
    pub fn kind(&self) -> DescriptorKind {
        self.payload.kind()
    }

    /// Number of descriptors; a non-array binding counts as one.
    pub fn descriptor_count(&self) -> ArrayInfo {
        self.count.unwrap_or(ArrayInfo::Fixed(1))
    }
}

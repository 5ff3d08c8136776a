//! Descriptor and push-constant classification.

use std::collections::{HashMap, HashSet};

use rspirv::spirv::{self, StorageClass, Word};
use spvi_ir::{
    ArrayInfo, DescriptorBinding, DescriptorPayload, ImageInfo, ImageViewType, MAX_DESCRIPTOR_SETS,
    PushConstantBlock, Qualifiers, StageParts, StorageBufferBlock, StorageFormat,
};

use crate::decode::{GlobalVariable, ImageType, SpirvModule, SpirvType};
use crate::typegraph::{BlockRole, TypeGraph};
use crate::{IntrospectionError, IntrospectionOptions};

/// Collects every statically used descriptor and the push-constant block
/// into `parts`.
pub(crate) fn collect(
    module: &SpirvModule,
    used: &HashSet<Word>,
    options: &IntrospectionOptions,
    parts: &mut StageParts,
) -> Result<(), IntrospectionError> {
    let mut ctx = ResourceCtx {
        module,
        options,
        parts,
        claimed: HashMap::new(),
    };
    for var in module.variables().iter().filter(|v| used.contains(&v.id)) {
        match var.storage_class {
            StorageClass::Uniform | StorageClass::StorageBuffer => ctx.buffer(var)?,
            StorageClass::UniformConstant => ctx.opaque(var)?,
            StorageClass::PushConstant => ctx.push_constant(var)?,
            _ => {}
        }
    }
    Ok(())
}

struct ResourceCtx<'a> {
    module: &'a SpirvModule,
    options: &'a IntrospectionOptions,
    parts: &'a mut StageParts,
    /// `(set, binding)` -> name of the resource that claimed it.
    claimed: HashMap<(u32, u32), String>,
}

impl ResourceCtx<'_> {
    fn buffer(&mut self, var: &GlobalVariable) -> Result<(), IntrospectionError> {
        let module = self.module;
        let (count, block_ty) = descriptor_array(module, var.pointee)?;
        if !matches!(module.ty(block_ty)?, SpirvType::Struct { .. }) {
            return Err(IntrospectionError::MalformedInput(format!(
                "buffer %{} does not point to a struct",
                var.id
            )));
        }
        let storage =
            var.storage_class == StorageClass::StorageBuffer || module.decorations(block_ty).buffer_block;
        let (role, layout) = if storage {
            (BlockRole::Storage, self.options.storage_layout)
        } else {
            (BlockRole::Uniform, self.options.uniform_layout)
        };
        let built = TypeGraph::new(module, &mut self.parts.arena, self.options.max_type_depth)
            .build_block(block_ty, role, layout)?;

        let mut qualifiers = module.decorations(var.id).qualifiers;
        if storage {
            qualifiers |= common_member_qualifiers(module, block_ty)?;
        }
        let payload = if storage {
            DescriptorPayload::StorageBuffer(StorageBufferBlock {
                block: built.block,
                size_without_last_member: built.size_without_last_member,
            })
        } else {
            DescriptorPayload::UniformBuffer(built.block)
        };
        let name = match module.name(block_ty) {
            "" => module.name(var.id),
            block_name => block_name,
        };
        self.insert(var, name, count, qualifiers, payload)
    }

    fn opaque(&mut self, var: &GlobalVariable) -> Result<(), IntrospectionError> {
        let module = self.module;
        let (count, ty) = descriptor_array(module, var.pointee)?;
        let name = module.name(var.id);
        let payload = match module.ty(ty)? {
            SpirvType::Sampler => DescriptorPayload::Sampler,
            SpirvType::SampledImage { image } => {
                let SpirvType::Image(image) = module.ty(*image)? else {
                    return Err(IntrospectionError::MalformedInput(format!(
                        "sampled image %{ty} does not wrap an image"
                    )));
                };
                if image.dim == spirv::Dim::DimBuffer {
                    DescriptorPayload::UniformTexelBuffer
                } else {
                    DescriptorPayload::CombinedImageSampler(image_info(image, ty)?)
                }
            }
            SpirvType::Image(image) => match (image.dim, image.sampled) {
                (spirv::Dim::DimSubpassData, _) => {
                    let index = module
                        .decorations(var.id)
                        .input_attachment_index
                        .ok_or_else(|| {
                            IntrospectionError::MalformedInput(format!(
                                "input attachment '{name}' has no InputAttachmentIndex"
                            ))
                        })?;
                    DescriptorPayload::InputAttachment {
                        index,
                        multisample: image.multisampled,
                    }
                }
                (spirv::Dim::DimBuffer, 2) => DescriptorPayload::StorageTexelBuffer {
                    format: storage_format(image.format),
                },
                (spirv::Dim::DimBuffer, _) => DescriptorPayload::UniformTexelBuffer,
                (_, 2) => DescriptorPayload::StorageImage {
                    format: storage_format(image.format),
                    image: image_info(image, ty)?,
                },
                _ => DescriptorPayload::SampledImage(image_info(image, ty)?),
            },
            SpirvType::AccelerationStructure => {
                return Err(IntrospectionError::UnsupportedResourceKind {
                    name: name.to_string(),
                    kind: "acceleration structure".into(),
                });
            }
            other => {
                return Err(IntrospectionError::UnsupportedResourceKind {
                    name: name.to_string(),
                    kind: format!("{other:?}"),
                });
            }
        };
        let qualifiers = module.decorations(var.id).qualifiers;
        self.insert(var, name, count, qualifiers, payload)
    }

    fn push_constant(&mut self, var: &GlobalVariable) -> Result<(), IntrospectionError> {
        let module = self.module;
        if self.parts.push_constants.present {
            return Err(IntrospectionError::MalformedInput(
                "entry point uses more than one push constant block".into(),
            ));
        }
        if !matches!(module.ty(var.pointee)?, SpirvType::Struct { .. }) {
            return Err(IntrospectionError::MalformedInput(format!(
                "push constant %{} is not a struct",
                var.id
            )));
        }
        let built = TypeGraph::new(module, &mut self.parts.arena, self.options.max_type_depth)
            .build_block(
                var.pointee,
                BlockRole::PushConstant,
                self.options.push_constant_layout,
            )?;
        let name = match module.name(var.pointee) {
            "" => module.name(var.id),
            block_name => block_name,
        };
        let offset = built.block.first_offset(&self.parts.arena);
        self.parts.push_constants = PushConstantBlock {
            present: true,
            name: self.parts.arena.write_string(name),
            offset,
            block: built.block,
        };
        Ok(())
    }

    fn insert(
        &mut self,
        var: &GlobalVariable,
        name: &str,
        count: Option<ArrayInfo>,
        qualifiers: Qualifiers,
        payload: DescriptorPayload,
    ) -> Result<(), IntrospectionError> {
        let decorations = self.module.decorations(var.id);
        if name.is_empty() {
            log::warn!("descriptor %{} has no name", var.id);
        }
        let set = decorations.descriptor_set.unwrap_or_else(|| {
            log::warn!("descriptor '{name}' has no DescriptorSet; assuming 0");
            0
        });
        let binding = decorations.binding.unwrap_or_else(|| {
            log::warn!("descriptor '{name}' has no Binding; assuming 0");
            0
        });
        if set as usize >= MAX_DESCRIPTOR_SETS {
            return Err(IntrospectionError::SetOutOfRange {
                name: name.to_string(),
                set,
            });
        }
        if let Some(first) = self.claimed.get(&(set, binding)) {
            return Err(IntrospectionError::AmbiguousBinding {
                set,
                binding,
                first: first.clone(),
                second: name.to_string(),
            });
        }
        self.claimed.insert((set, binding), name.to_string());

        log::debug!("descriptor '{name}' at ({set}, {binding}): {:?}", payload.kind());
        let name = self.parts.arena.write_string(name);
        self.parts.descriptor_sets[set as usize].push(DescriptorBinding {
            set,
            binding,
            name,
            count,
            qualifiers,
            payload,
        });
        Ok(())
    }
}

/// Peels descriptor array dimensions off `ty`.
///
/// Multi-dimensional descriptor arrays flatten to the product of their
/// dimensions, which must then all be literal.
fn descriptor_array(
    module: &SpirvModule,
    ty: Word,
) -> Result<(Option<ArrayInfo>, Word), IntrospectionError> {
    let mut dims = Vec::new();
    let mut current = ty;
    loop {
        match module.ty(current)? {
            SpirvType::Array { element, length } => {
                dims.push(module.array_length(*length)?.0);
                current = *element;
            }
            SpirvType::RuntimeArray { element } => {
                dims.push(ArrayInfo::RuntimeSized);
                current = *element;
            }
            _ => break,
        }
    }
    let count = match dims.as_slice() {
        [] => None,
        [single] => Some(*single),
        many => {
            let mut product = 1u32;
            for dim in many {
                let Some(n) = dim.fixed() else {
                    return Err(IntrospectionError::MalformedInput(format!(
                        "multi-dimensional descriptor array %{ty} has a non-literal dimension"
                    )));
                };
                product = product.saturating_mul(n);
            }
            Some(ArrayInfo::Fixed(product))
        }
    };
    Ok((count, current))
}

/// Read/write qualifiers shared by every member of a storage block.
fn common_member_qualifiers(
    module: &SpirvModule,
    block_ty: Word,
) -> Result<Qualifiers, IntrospectionError> {
    let SpirvType::Struct { members } = module.ty(block_ty)? else {
        return Ok(Qualifiers::empty());
    };
    if members.is_empty() {
        return Ok(Qualifiers::empty());
    }
    let access = Qualifiers::READONLY | Qualifiers::WRITEONLY;
    Ok((0u32..)
        .take(members.len())
        .map(|i| module.member_decorations(block_ty, i).qualifiers & access)
        .fold(access, |acc, q| acc & q))
}

fn image_info(image: &ImageType, ty: Word) -> Result<ImageInfo, IntrospectionError> {
    use spirv::Dim;
    let view_type = match (image.dim, image.arrayed) {
        (Dim::Dim1D, false) => ImageViewType::D1,
        (Dim::Dim1D, true) => ImageViewType::D1Array,
        (Dim::Dim2D | Dim::DimRect, false) => ImageViewType::D2,
        (Dim::Dim2D | Dim::DimRect, true) => ImageViewType::D2Array,
        (Dim::Dim3D, false) => ImageViewType::D3,
        (Dim::DimCube, false) => ImageViewType::Cube,
        (Dim::DimCube, true) => ImageViewType::CubeArray,
        (dim, arrayed) => {
            return Err(IntrospectionError::MalformedInput(format!(
                "image %{ty} has unsupported dimensionality {dim:?} (arrayed: {arrayed})"
            )));
        }
    };
    Ok(ImageInfo {
        view_type,
        multisample: image.multisampled,
        shadow: image.depth == 1,
    })
}

fn storage_format(format: spirv::ImageFormat) -> StorageFormat {
    use spirv::ImageFormat as F;
    match format {
        F::Rgba32f => StorageFormat::Rgba32f,
        F::Rgba16f => StorageFormat::Rgba16f,
        F::R32f => StorageFormat::R32f,
        F::Rgba8 => StorageFormat::Rgba8,
        F::Rgba8Snorm => StorageFormat::Rgba8Snorm,
        F::Rg32f => StorageFormat::Rg32f,
        F::Rg16f => StorageFormat::Rg16f,
        F::R11fG11fB10f => StorageFormat::R11fG11fB10f,
        F::R16f => StorageFormat::R16f,
        F::Rgba16 => StorageFormat::Rgba16,
        F::Rgb10A2 => StorageFormat::Rgb10A2,
        F::Rg16 => StorageFormat::Rg16,
        F::Rg8 => StorageFormat::Rg8,
        F::R16 => StorageFormat::R16,
        F::R8 => StorageFormat::R8,
        F::Rgba16Snorm => StorageFormat::Rgba16Snorm,
        F::Rg16Snorm => StorageFormat::Rg16Snorm,
        F::Rg8Snorm => StorageFormat::Rg8Snorm,
        F::R16Snorm => StorageFormat::R16Snorm,
        F::R8Snorm => StorageFormat::R8Snorm,
        F::Rgba32i => StorageFormat::Rgba32i,
        F::Rgba16i => StorageFormat::Rgba16i,
        F::Rgba8i => StorageFormat::Rgba8i,
        F::R32i => StorageFormat::R32i,
        F::Rg32i => StorageFormat::Rg32i,
        F::Rg16i => StorageFormat::Rg16i,
        F::Rg8i => StorageFormat::Rg8i,
        F::R16i => StorageFormat::R16i,
        F::R8i => StorageFormat::R8i,
        F::Rgba32ui => StorageFormat::Rgba32ui,
        F::Rgba16ui => StorageFormat::Rgba16ui,
        F::Rgba8ui => StorageFormat::Rgba8ui,
        F::R32ui => StorageFormat::R32ui,
        F::Rgb10a2ui => StorageFormat::Rgb10a2ui,
        F::Rg32ui => StorageFormat::Rg32ui,
        F::Rg16ui => StorageFormat::Rg16ui,
        F::Rg8ui => StorageFormat::Rg8ui,
        F::R16ui => StorageFormat::R16ui,
        F::R8ui => StorageFormat::R8ui,
        F::R64ui => StorageFormat::R64ui,
        F::R64i => StorageFormat::R64i,
        _ => StorageFormat::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use rspirv::spirv::{Decoration, Dim, ExecutionModel, ImageFormat};

    use super::*;
    use crate::testing::ShaderBuilder;
    use crate::usage::statically_used;

    fn collect_parts(code: &[u8], model_stage: spvi_ir::ShaderStage) -> Result<StageParts, IntrospectionError> {
        let module = SpirvModule::parse(code).unwrap();
        let entry = module.find_entry_point("main", model_stage).unwrap();
        let used = statically_used(&module, entry);
        let mut parts = StageParts::default();
        collect(&module, &used, &IntrospectionOptions::default(), &mut parts)?;
        Ok(parts)
    }

    fn image(sb: &mut ShaderBuilder, dim: Dim, arrayed: u32, sampled: u32, format: ImageFormat) -> Word {
        let f32_ty = sb.f32_type();
        sb.builder()
            .type_image(f32_ty, dim, 0, arrayed, 0, sampled, format, None)
    }

    #[test]
    fn classifies_image_descriptors() {
        let mut sb = ShaderBuilder::new();
        let tex = image(&mut sb, Dim::Dim2D, 0, 1, ImageFormat::Unknown);
        let combined = sb.builder().type_sampled_image(tex);
        let storage = image(&mut sb, Dim::Dim2D, 1, 2, ImageFormat::Rgba8);
        let texel = image(&mut sb, Dim::DimBuffer, 0, 2, ImageFormat::R32f);
        let sampler = sb.builder().type_sampler();
        let textures = sb.array_type(tex, 8);

        sb.resource("combined", combined, StorageClass::UniformConstant, 0, 0);
        sb.resource("storage", storage, StorageClass::UniformConstant, 0, 1);
        sb.resource("texel", texel, StorageClass::UniformConstant, 0, 2);
        sb.resource("sampler", sampler, StorageClass::UniformConstant, 1, 0);
        sb.resource("textures", textures, StorageClass::UniformConstant, 1, 1);
        let code = sb.finish(ExecutionModel::Fragment, "main").unwrap();

        let parts = collect_parts(&code, spvi_ir::ShaderStage::Fragment).unwrap();
        let set0 = &parts.descriptor_sets[0];
        assert!(matches!(
            set0[0].payload,
            DescriptorPayload::CombinedImageSampler(ImageInfo {
                view_type: ImageViewType::D2,
                ..
            })
        ));
        assert_eq!(
            set0[1].payload,
            DescriptorPayload::StorageImage {
                format: StorageFormat::Rgba8,
                image: ImageInfo {
                    view_type: ImageViewType::D2Array,
                    multisample: false,
                    shadow: false,
                },
            }
        );
        assert_eq!(
            set0[2].payload,
            DescriptorPayload::StorageTexelBuffer {
                format: StorageFormat::R32f
            }
        );
        let set1 = &parts.descriptor_sets[1];
        assert_eq!(set1[0].payload, DescriptorPayload::Sampler);
        assert_eq!(set1[1].count, Some(ArrayInfo::Fixed(8)));
        assert_eq!(parts.arena.resolve_str(set1[1].name), "textures");
    }

    #[test]
    fn duplicate_binding_is_ambiguous() {
        let mut sb = ShaderBuilder::new();
        let f32_ty = sb.f32_type();
        let a = sb.block("A", &[("x", f32_ty, Some(0))]);
        let b = sb.block("B", &[("y", f32_ty, Some(0))]);
        sb.resource("a", a, StorageClass::Uniform, 0, 1);
        sb.resource("b", b, StorageClass::Uniform, 0, 1);
        let code = sb.finish(ExecutionModel::GLCompute, "main").unwrap();
        let err = collect_parts(&code, spvi_ir::ShaderStage::Compute).unwrap_err();
        assert!(matches!(
            err,
            IntrospectionError::AmbiguousBinding {
                set: 0,
                binding: 1,
                ..
            }
        ));
    }

    #[test]
    fn set_out_of_range() {
        let mut sb = ShaderBuilder::new();
        let sampler = sb.builder().type_sampler();
        sb.resource("s", sampler, StorageClass::UniformConstant, 4, 0);
        let code = sb.finish(ExecutionModel::Fragment, "main").unwrap();
        assert!(matches!(
            collect_parts(&code, spvi_ir::ShaderStage::Fragment),
            Err(IntrospectionError::SetOutOfRange { set: 4, .. })
        ));
    }

    #[test]
    fn readonly_storage_buffer_and_push_constants() {
        let mut sb = ShaderBuilder::new();
        let u32_ty = sb.u32_type();
        let f32_ty = sb.f32_type();
        let rt = sb.runtime_array_type(f32_ty);
        sb.array_stride(rt, 4);
        let data = sb.block("Data", &[("n", u32_ty, Some(0)), ("values", rt, Some(4))]);
        sb.member_decorate(data, 0, Decoration::NonWritable, &[]);
        sb.member_decorate(data, 1, Decoration::NonWritable, &[]);
        sb.resource("data", data, StorageClass::StorageBuffer, 0, 0);

        let push = sb.block("Push", &[("scale", f32_ty, Some(16)), ("bias", f32_ty, Some(20))]);
        sb.push_constant("pc", push);
        let code = sb.finish(ExecutionModel::GLCompute, "main").unwrap();

        let parts = collect_parts(&code, spvi_ir::ShaderStage::Compute).unwrap();
        let binding = &parts.descriptor_sets[0][0];
        assert!(binding.qualifiers.contains(Qualifiers::READONLY));
        assert_eq!(parts.arena.resolve_str(binding.name), "Data");
        let DescriptorPayload::StorageBuffer(storage) = &binding.payload else {
            panic!("expected a storage buffer, got {:?}", binding.payload);
        };
        assert!(storage.is_last_member_runtime_sized(&parts.arena));
        assert_eq!(storage.runtime_size(&parts.arena, 3), 16);

        let pc = &parts.push_constants;
        assert!(pc.present);
        assert_eq!(pc.offset, 16);
        assert_eq!(pc.block.size, 24);
        assert_eq!(parts.arena.resolve_str(pc.name), "Push");
    }

    #[test]
    fn acceleration_structure_is_unsupported() {
        let mut sb = ShaderBuilder::new();
        let accel = sb.id();
        sb.push_global(rspirv::dr::Instruction::new(
            rspirv::spirv::Op::TypeAccelerationStructureKHR,
            None,
            Some(accel),
            vec![],
        ));
        sb.resource("tlas", accel, StorageClass::UniformConstant, 0, 0);
        let code = sb.finish(ExecutionModel::GLCompute, "main").unwrap();
        assert!(matches!(
            collect_parts(&code, spvi_ir::ShaderStage::Compute),
            Err(IntrospectionError::UnsupportedResourceKind { .. })
        ));
    }

    #[test]
    fn multi_dimensional_descriptor_arrays_flatten() {
        let mut sb = ShaderBuilder::new();
        let sampler = sb.builder().type_sampler();
        let inner = sb.array_type(sampler, 3);
        let outer = sb.array_type(inner, 2);
        sb.resource("grid", outer, StorageClass::UniformConstant, 0, 0);
        let code = sb.finish(ExecutionModel::Fragment, "main").unwrap();
        let parts = collect_parts(&code, spvi_ir::ShaderStage::Fragment).unwrap();
        assert_eq!(parts.descriptor_sets[0][0].count, Some(ArrayInfo::Fixed(6)));
    }
}

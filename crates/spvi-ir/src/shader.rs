//! Shader blobs and the parameters identifying one introspection.

use std::fmt;
use std::sync::Arc;

use crate::stage::ShaderStage;

/// Encoding of a shader blob's content.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum ContentType {
    Spirv,
    Glsl,
    Hlsl,
    Wgsl,
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Spirv => "spirv",
            Self::Glsl => "glsl",
            Self::Hlsl => "hlsl",
            Self::Wgsl => "wgsl",
        })
    }
}

/// An immutable, cheaply clonable shader blob.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct ShaderModule {
    content_type: ContentType,
    code: Arc<[u8]>,
}

impl ShaderModule {
    pub fn new(content_type: ContentType, code: impl Into<Arc<[u8]>>) -> Self {
        Self {
            content_type,
            code: code.into(),
        }
    }

    /// A SPIR-V module given as bytes.
    pub fn spirv(code: impl Into<Arc<[u8]>>) -> Self {
        Self::new(ContentType::Spirv, code)
    }

    /// A SPIR-V module given as words, stored little-endian.
    pub fn from_words(words: &[u32]) -> Self {
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        Self::spirv(bytes)
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }
}

/// Identifies one stage introspection: shader content, entry point and stage.
///
/// `Hash` covers the full byte content and `Eq` compares it byte for byte,
/// so the type can key a content-addressed cache directly.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct IntrospectionParams {
    pub shader: ShaderModule,
    pub entry_point: String,
    pub stage: ShaderStage,
}

impl IntrospectionParams {
    pub fn new(shader: ShaderModule, entry_point: impl Into<String>, stage: ShaderStage) -> Self {
        Self {
            shader,
            entry_point: entry_point.into(),
            stage,
        }
    }
}

impl fmt::Display for IntrospectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} \"{}\" ({}, {} bytes)",
            self.stage,
            self.entry_point,
            self.shader.content_type(),
            self.shader.code().len()
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    use super::*;

    fn hash_of(params: &IntrospectionParams) -> u64 {
        let mut hasher = DefaultHasher::new();
        params.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn equal_content_equal_key() {
        let a = IntrospectionParams::new(
            ShaderModule::spirv(vec![1u8, 2, 3, 4]),
            "main",
            ShaderStage::Compute,
        );
        let b = IntrospectionParams::new(
            ShaderModule::spirv(vec![1u8, 2, 3, 4]),
            "main",
            ShaderStage::Compute,
        );
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn same_length_different_content_differs() {
        let a = IntrospectionParams::new(
            ShaderModule::spirv(vec![1u8, 2, 3, 4]),
            "main",
            ShaderStage::Compute,
        );
        let b = IntrospectionParams::new(
            ShaderModule::spirv(vec![1u8, 2, 3, 5]),
            "main",
            ShaderStage::Compute,
        );
        assert_ne!(a, b);
    }

    #[test]
    fn entry_point_and_stage_are_part_of_key() {
        let shader = ShaderModule::spirv(vec![0u8; 8]);
        let base = IntrospectionParams::new(shader.clone(), "main", ShaderStage::Vertex);
        let other_entry = IntrospectionParams::new(shader.clone(), "main2", ShaderStage::Vertex);
        let other_stage = IntrospectionParams::new(shader, "main", ShaderStage::Fragment);
        assert_ne!(base, other_entry);
        assert_ne!(base, other_stage);
    }

    #[test]
    fn words_are_little_endian() {
        let module = ShaderModule::from_words(&[0x0723_0203]);
        assert_eq!(module.code(), &[0x03, 0x02, 0x23, 0x07]);
        assert_eq!(module.content_type(), ContentType::Spirv);
    }
}

//! Shader stages and stage masks.

use std::fmt;
use std::str::FromStr;

use crate::error::IrError;

/// One programmable stage of a GPU pipeline.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum ShaderStage {
    Vertex,
    TessellationControl,
    TessellationEvaluation,
    Geometry,
    Fragment,
    Compute,
    Task,
    Mesh,
    RayGeneration,
    AnyHit,
    ClosestHit,
    Miss,
    Intersection,
    Callable,
}

bitflags::bitflags! {
    /// Set of shader stages, with the Vulkan `VkShaderStageFlagBits` values.
    #[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq)]
    pub struct ShaderStages: u32 {
        const VERTEX = 0x0001;
        const TESSELLATION_CONTROL = 0x0002;
        const TESSELLATION_EVALUATION = 0x0004;
        const GEOMETRY = 0x0008;
        const FRAGMENT = 0x0010;
        const COMPUTE = 0x0020;
        const TASK = 0x0040;
        const MESH = 0x0080;
        const RAYGEN = 0x0100;
        const ANY_HIT = 0x0200;
        const CLOSEST_HIT = 0x0400;
        const MISS = 0x0800;
        const INTERSECTION = 0x1000;
        const CALLABLE = 0x2000;
    }
}

impl ShaderStage {
    pub const ALL: [Self; 14] = [
        Self::Vertex,
        Self::TessellationControl,
        Self::TessellationEvaluation,
        Self::Geometry,
        Self::Fragment,
        Self::Compute,
        Self::Task,
        Self::Mesh,
        Self::RayGeneration,
        Self::AnyHit,
        Self::ClosestHit,
        Self::Miss,
        Self::Intersection,
        Self::Callable,
    ];

    /// The single-bit mask for this stage.
    pub fn mask(self) -> ShaderStages {
        match self {
            Self::Vertex => ShaderStages::VERTEX,
            Self::TessellationControl => ShaderStages::TESSELLATION_CONTROL,
            Self::TessellationEvaluation => ShaderStages::TESSELLATION_EVALUATION,
            Self::Geometry => ShaderStages::GEOMETRY,
            Self::Fragment => ShaderStages::FRAGMENT,
            Self::Compute => ShaderStages::COMPUTE,
            Self::Task => ShaderStages::TASK,
            Self::Mesh => ShaderStages::MESH,
            Self::RayGeneration => ShaderStages::RAYGEN,
            Self::AnyHit => ShaderStages::ANY_HIT,
            Self::ClosestHit => ShaderStages::CLOSEST_HIT,
            Self::Miss => ShaderStages::MISS,
            Self::Intersection => ShaderStages::INTERSECTION,
            Self::Callable => ShaderStages::CALLABLE,
        }
    }

    /// Short name used in dumps and on the command line.
    pub fn name(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::TessellationControl => "tess-control",
            Self::TessellationEvaluation => "tess-eval",
            Self::Geometry => "geometry",
            Self::Fragment => "fragment",
            Self::Compute => "compute",
            Self::Task => "task",
            Self::Mesh => "mesh",
            Self::RayGeneration => "raygen",
            Self::AnyHit => "any-hit",
            Self::ClosestHit => "closest-hit",
            Self::Miss => "miss",
            Self::Intersection => "intersection",
            Self::Callable => "callable",
        }
    }

    /// Stages that declare a workgroup size.
    pub fn has_workgroups(self) -> bool {
        matches!(self, Self::Compute | Self::Task | Self::Mesh)
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ShaderStage {
    type Err = IrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        let found = Self::ALL.into_iter().find(|stage| stage.name() == lower);
        match (found, lower.as_str()) {
            (Some(stage), _) => Ok(stage),
            (None, "vert") => Ok(Self::Vertex),
            (None, "frag") => Ok(Self::Fragment),
            (None, "comp") => Ok(Self::Compute),
            (None, "tesc") => Ok(Self::TessellationControl),
            (None, "tese") => Ok(Self::TessellationEvaluation),
            (None, "geom") => Ok(Self::Geometry),
            _ => Err(IrError::UnknownStage(s.to_string())),
        }
    }
}

impl fmt::Display for ShaderStages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let mut first = true;
        for stage in ShaderStage::ALL {
            if self.contains(stage.mask()) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(stage.name())?;
                first = false;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_are_distinct_bits() {
        let mut all = ShaderStages::empty();
        for stage in ShaderStage::ALL {
            assert_eq!(stage.mask().bits().count_ones(), 1);
            assert!(!all.intersects(stage.mask()));
            all |= stage.mask();
        }
        assert_eq!(all, ShaderStages::all());
    }

    #[test]
    fn parse_names_and_aliases() {
        assert_eq!("fragment".parse::<ShaderStage>().unwrap(), ShaderStage::Fragment);
        assert_eq!("COMP".parse::<ShaderStage>().unwrap(), ShaderStage::Compute);
        assert_eq!(
            "tess-eval".parse::<ShaderStage>().unwrap(),
            ShaderStage::TessellationEvaluation
        );
        assert!("pixel".parse::<ShaderStage>().is_err());
    }

    #[test]
    fn stage_mask_display() {
        let mask = ShaderStages::VERTEX | ShaderStages::FRAGMENT;
        assert_eq!(mask.to_string(), "vertex|fragment");
        assert_eq!(ShaderStages::empty().to_string(), "none");
    }
}

//! Layout descriptions handed to the graphics-device layer.

use std::fmt;

use spvi_ir::{DescriptorKind, ShaderStages};

/// A push-constant range and the stages that read it.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct PushConstantRange {
    pub offset: u32,
    pub size: u32,
    pub stages: ShaderStages,
}

impl PushConstantRange {
    pub fn end(&self) -> u32 {
        self.offset + self.size
    }
}

/// Shape of a binding that must agree across stages.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct BindingShape {
    pub kind: DescriptorKind,
    /// Descriptor count; for a variable-count binding, `0`.
    pub count: u32,
    /// Runtime-sized descriptor array.
    pub variable_count: bool,
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct LayoutBinding {
    pub binding: u32,
    pub kind: DescriptorKind,
    pub count: u32,
    pub variable_count: bool,
    pub stages: ShaderStages,
}

impl LayoutBinding {
    pub fn shape(&self) -> BindingShape {
        BindingShape {
            kind: self.kind,
            count: self.count,
            variable_count: self.variable_count,
        }
    }
}

/// Bindings of one descriptor set, sorted by binding.
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq)]
pub struct DescriptorSetLayoutDesc {
    pub set: u32,
    pub bindings: Vec<LayoutBinding>,
}

impl DescriptorSetLayoutDesc {
    pub fn binding(&self, binding: u32) -> Option<&LayoutBinding> {
        self.bindings.iter().find(|b| b.binding == binding)
    }
}

#[derive(Clone, Debug, Default, Hash, Eq, PartialEq)]
pub struct PipelineLayoutDesc {
    pub push_constant_ranges: Vec<PushConstantRange>,
    /// One layout per non-empty set, in set order.
    pub set_layouts: Vec<DescriptorSetLayoutDesc>,
}

impl PipelineLayoutDesc {
    pub fn set_layout(&self, set: u32) -> Option<&DescriptorSetLayoutDesc> {
        self.set_layouts.iter().find(|l| l.set == set)
    }
}

/// What a compute pipeline needs besides the shader module itself.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct ComputePipelineDesc {
    pub entry_point: String,
    pub layout: PipelineLayoutDesc,
    /// Workgroup size after specialization, if the shader declares one.
    pub workgroup_size: Option<[u32; 3]>,
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

impl fmt::Display for BindingShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.variable_count {
            write!(f, "{}[]", self.kind)
        } else if self.count == 1 {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}[{}]", self.kind, self.count)
        }
    }
}

impl fmt::Display for PushConstantRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}) {}", self.offset, self.end(), self.stages)
    }
}

impl fmt::Display for LayoutBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "binding {}: {} ({})", self.binding, self.shape(), self.stages)
    }
}

impl fmt::Display for DescriptorSetLayoutDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "set {}:", self.set)?;
        for binding in &self.bindings {
            writeln!(f, "  {binding}")?;
        }
        Ok(())
    }
}

impl fmt::Display for PipelineLayoutDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.push_constant_ranges.is_empty() {
            writeln!(f, "push constants: none")?;
        } else {
            writeln!(f, "push constants:")?;
            for range in &self.push_constant_ranges {
                writeln!(f, "  {range}")?;
            }
        }
        for set in &self.set_layouts {
            write!(f, "{set}")?;
        }
        Ok(())
    }
}

impl fmt::Display for ComputePipelineDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "compute pipeline \"{}\"", self.entry_point)?;
        if let Some([x, y, z]) = self.workgroup_size {
            write!(f, " workgroup {x}x{y}x{z}")?;
        }
        writeln!(f)?;
        write!(f, "{}", self.layout)
    }
}

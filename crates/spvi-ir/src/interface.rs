//! Stage input and output interfaces.

use crate::types::VarType;

/// One user-defined stage input.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct InputInterface {
    pub location: u32,
    pub component: u32,
    /// Array length; `1` if not an array.
    pub elements: u32,
    pub base_type: VarType,
    /// Vector length of one element; `1` for scalars.
    pub components: u32,
}

/// One user-defined stage output. Same shape as an input.
pub type OutputInterface = InputInterface;

/// A fragment shader output with its dual-source blending index.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct FragmentOutput {
    pub interface: OutputInterface,
    /// `Index` decoration; `0` when absent.
    pub color_index: u32,
}

/// Output interface of a stage, sorted by location.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum Outputs {
    Fragment(Vec<FragmentOutput>),
    Other(Vec<OutputInterface>),
}

impl Default for Outputs {
    fn default() -> Self {
        Self::Other(Vec::new())
    }
}

impl Outputs {
    pub fn len(&self) -> usize {
        match self {
            Self::Fragment(outputs) => outputs.len(),
            Self::Other(outputs) => outputs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates the outputs without their color index.
    pub fn interfaces(&self) -> impl Iterator<Item = &OutputInterface> + '_ {
        let (fragment, other) = match self {
            Self::Fragment(outputs) => (outputs.as_slice(), [].as_slice()),
            Self::Other(outputs) => ([].as_slice(), outputs.as_slice()),
        };
        fragment.iter().map(|f| &f.interface).chain(other)
    }
}

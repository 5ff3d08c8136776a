//! Specialization constants and their overrides.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use crate::arena::Span;
use crate::types::VarType;

/// A specialization constant value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SpecValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl Eq for SpecValue {}

impl Hash for SpecValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match *self {
            Self::Bool(v) => v.hash(state),
            Self::Int(v) => v.hash(state),
            Self::UInt(v) => v.hash(state),
            Self::Float(v) => v.to_bits().hash(state),
        }
    }
}

impl SpecValue {
    /// The value as an element count, if it is a positive integer.
    pub fn as_count(&self) -> Option<u32> {
        let count = match *self {
            Self::Int(v) => u32::try_from(v).ok()?,
            Self::UInt(v) => u32::try_from(v).ok()?,
            Self::Bool(_) | Self::Float(_) => return None,
        };
        (count > 0).then_some(count)
    }
}

impl std::fmt::Display for SpecValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::UInt(v) => write!(f, "{v}u"),
            Self::Float(v) => write!(f, "{v:?}"),
        }
    }
}

/// A specializable constant declared by a stage.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct SpecConstant {
    /// The `SpecId` decoration.
    pub id: u32,
    pub name: Span<str>,
    pub default: SpecValue,
    pub byte_size: u32,
    pub ty: VarType,
}

/// Specialization values supplied when building a pipeline, keyed by `SpecId`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpecializationMap {
    values: BTreeMap<u32, SpecValue>,
}

impl SpecializationMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the value for `id`, returning the previous one.
    pub fn insert(&mut self, id: u32, value: SpecValue) -> Option<SpecValue> {
        self.values.insert(id, value)
    }

    pub fn get(&self, id: u32) -> Option<SpecValue> {
        self.values.get(&id).copied()
    }

    /// The override for `id` as an element count.
    pub fn count(&self, id: u32) -> Option<u32> {
        self.get(id).and_then(|v| v.as_count())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, SpecValue)> + '_ {
        self.values.iter().map(|(&id, &v)| (id, v))
    }
}

impl FromIterator<(u32, SpecValue)> for SpecializationMap {
    fn from_iter<I: IntoIterator<Item = (u32, SpecValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Workgroup dimensions of a compute, task or mesh entry point.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq)]
pub struct WorkgroupSize {
    /// Declared sizes; for spec-constant dimensions, the default value.
    pub sizes: [u32; 3],
    /// `SpecId` of each dimension that can be specialized.
    pub spec_ids: [Option<u32>; 3],
}

impl WorkgroupSize {
    /// Sizes after applying `specialization` to spec-constant dimensions.
    pub fn specialized(&self, specialization: &SpecializationMap) -> [u32; 3] {
        let mut sizes = self.sizes;
        for (size, id) in sizes.iter_mut().zip(self.spec_ids) {
            if let Some(count) = id.and_then(|id| specialization.count(id)) {
                *size = count;
            }
        }
        sizes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_require_positive_integers() {
        assert_eq!(SpecValue::Int(4).as_count(), Some(4));
        assert_eq!(SpecValue::UInt(7).as_count(), Some(7));
        assert_eq!(SpecValue::Int(0).as_count(), None);
        assert_eq!(SpecValue::Int(-1).as_count(), None);
        assert_eq!(SpecValue::Float(4.0).as_count(), None);
        assert_eq!(SpecValue::Bool(true).as_count(), None);
    }

    #[test]
    fn map_lookup() {
        let map: SpecializationMap = [(5, SpecValue::UInt(4)), (1, SpecValue::Bool(false))]
            .into_iter()
            .collect();
        assert_eq!(map.count(5), Some(4));
        assert_eq!(map.count(1), None);
        assert_eq!(map.count(2), None);
        assert_eq!(map.iter().map(|(id, _)| id).collect::<Vec<_>>(), [1, 5]);
    }

    #[test]
    fn workgroup_specialization() {
        let size = WorkgroupSize {
            sizes: [64, 1, 1],
            spec_ids: [Some(0), None, None],
        };
        let mut map = SpecializationMap::new();
        assert_eq!(size.specialized(&map), [64, 1, 1]);
        map.insert(0, SpecValue::UInt(128));
        assert_eq!(size.specialized(&map), [128, 1, 1]);
    }
}

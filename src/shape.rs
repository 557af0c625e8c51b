use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Number of axes of the logical process lattice.
pub const LATTICE_DIM: usize = 4;

/// One lattice axis is absorbed by the node, the rest map onto the network.
pub const PHYSICAL_DIM: usize = LATTICE_DIM - 1;

/// Processes per node in the reference deployment.
pub const DEFAULT_GROUP_SIZE: usize = 4;

pub type Coord4 = [usize; LATTICE_DIM];

pub type PhysicalCoord = SmallVec<[usize; PHYSICAL_DIM]>;

fn write_extents(f: &mut fmt::Formatter<'_>, extents: &[usize]) -> fmt::Result {
    write!(f, "{}", extents.iter().join(" "))
}

fn checked_product(extents: &[usize]) -> Option<usize> {
    extents.iter().try_fold(1usize, |acc, &e| acc.checked_mul(e))
}

/// Extents of the logical 4-dim process lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LatticeShape(Coord4);

impl LatticeShape {
    pub fn new(extents: Coord4) -> Self {
        Self(extents)
    }

    pub fn extents(&self) -> &Coord4 {
        &self.0
    }

    pub fn extent(&self, axis: usize) -> usize {
        self.0[axis]
    }

    pub fn volume(&self) -> usize {
        self.0.iter().product()
    }

    /// `None` when the volume does not fit in a `usize`.
    pub fn checked_volume(&self) -> Option<usize> {
        checked_product(&self.0)
    }

    pub fn contains(&self, coord: &Coord4) -> bool {
        coord.iter().zip(self.0.iter()).all(|(c, e)| c < e)
    }
}

impl fmt::Display for LatticeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_extents(f, &self.0)
    }
}

/// Extents of the sub-lattice formed by the processes sharing one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupShape(Coord4);

impl GroupShape {
    pub fn new(extents: Coord4) -> Self {
        Self(extents)
    }

    /// Group shape of the simple variant: the whole node lies along one axis.
    pub fn along_axis(axis: usize, group_size: usize) -> Self {
        let mut extents = [1; LATTICE_DIM];
        extents[axis] = group_size;
        Self(extents)
    }

    pub fn extents(&self) -> &Coord4 {
        &self.0
    }

    pub fn extent(&self, axis: usize) -> usize {
        self.0[axis]
    }

    pub fn volume(&self) -> usize {
        self.0.iter().product()
    }

    /// `None` when the volume does not fit in a `usize`.
    pub fn checked_volume(&self) -> Option<usize> {
        checked_product(&self.0)
    }
}

impl fmt::Display for GroupShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_extents(f, &self.0)
    }
}

/// Extents of the physical topology as reported by the topology service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhysicalShape(SmallVec<[usize; PHYSICAL_DIM]>);

impl PhysicalShape {
    pub fn from_slice(extents: &[usize]) -> Self {
        Self(SmallVec::from_slice(extents))
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn extents(&self) -> &[usize] {
        &self.0
    }

    pub fn extent(&self, axis: usize) -> usize {
        self.0[axis]
    }

    pub fn volume(&self) -> usize {
        self.0.iter().product()
    }

    /// `None` when the volume does not fit in a `usize`.
    pub fn checked_volume(&self) -> Option<usize> {
        checked_product(&self.0)
    }

    pub fn contains(&self, coord: &[usize]) -> bool {
        coord.len() == self.0.len() && coord.iter().zip(self.0.iter()).all(|(c, e)| c < e)
    }
}

impl fmt::Display for PhysicalShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_extents(f, &self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volumes() {
        assert_eq!(LatticeShape::new([8, 4, 4, 4]).volume(), 512);
        assert_eq!(GroupShape::new([1, 2, 2, 1]).volume(), 4);
        assert_eq!(PhysicalShape::from_slice(&[8, 4, 4]).volume(), 128);
    }

    #[test]
    fn test_checked_volume_detects_overflow() {
        assert_eq!(LatticeShape::new([8, 4, 4, 4]).checked_volume(), Some(512));
        assert_eq!(LatticeShape::new([4, usize::MAX / 2, 4, 1]).checked_volume(), None);
        assert_eq!(PhysicalShape::from_slice(&[usize::MAX, 2, 1]).checked_volume(), None);
    }

    #[test]
    fn test_group_along_axis() {
        assert_eq!(GroupShape::along_axis(2, 4).extents(), &[1, 1, 4, 1]);
    }

    #[test]
    fn test_physical_contains() {
        let shape = PhysicalShape::from_slice(&[8, 2, 2]);
        assert!(shape.contains(&[7, 1, 0]));
        assert!(!shape.contains(&[8, 0, 0]));
        assert!(!shape.contains(&[0, 0]));
    }

    #[test]
    fn test_display() {
        assert_eq!(LatticeShape::new([8, 4, 4, 4]).to_string(), "8 4 4 4");
        assert_eq!(PhysicalShape::from_slice(&[8, 2, 2]).to_string(), "8 2 2");
    }

    #[test]
    fn test_lattice_shape_json_is_plain_array() {
        let json = serde_json::to_string(&LatticeShape::new([8, 4, 4, 1])).unwrap();
        assert_eq!(json, "[8,4,4,1]");
        let back: LatticeShape = serde_json::from_str(&json).unwrap();
        assert_eq!(back, LatticeShape::new([8, 4, 4, 1]));
    }
}

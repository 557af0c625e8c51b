use smallvec::smallvec;

use crate::axis_map::{AxisMap, AxisTarget};
use crate::shape::{Coord4, GroupShape, PhysicalCoord, LATTICE_DIM, PHYSICAL_DIM};

/// Builds lattice coordinates from a node coordinate and a position inside
/// the node. Each physical cell is subdivided by the group shape along the
/// non-grouping axes.
#[derive(Debug, Clone)]
pub struct CoordinateComposer {
    group: GroupShape,
    axis_map: AxisMap,
}

impl CoordinateComposer {
    pub fn new(group: GroupShape, axis_map: AxisMap) -> Self {
        Self { group, axis_map }
    }

    pub fn axis_map(&self) -> &AxisMap {
        &self.axis_map
    }

    pub fn compose(&self, physical: &[usize], sub: &Coord4) -> Coord4 {
        let mut coord = [0; LATTICE_DIM];
        for (axis, c) in coord.iter_mut().enumerate() {
            *c = match self.axis_map.target(axis) {
                AxisTarget::Grouping => sub[axis],
                AxisTarget::Physical(p) => self.group.extent(axis) * physical[p] + sub[axis],
            };
        }
        coord
    }

    /// Inverse of [`compose`](Self::compose): the node coordinate and the
    /// intra-node coordinate a lattice coordinate came from.
    pub fn cell_of(&self, coord: &Coord4) -> (PhysicalCoord, Coord4) {
        let mut physical: PhysicalCoord = smallvec![0; PHYSICAL_DIM];
        let mut sub = [0; LATTICE_DIM];
        for axis in 0..LATTICE_DIM {
            match self.axis_map.target(axis) {
                AxisTarget::Grouping => sub[axis] = coord[axis],
                AxisTarget::Physical(p) => {
                    let g = self.group.extent(axis);
                    physical[p] = coord[axis] / g;
                    sub[axis] = coord[axis] % g;
                }
            }
        }
        (physical, sub)
    }
}

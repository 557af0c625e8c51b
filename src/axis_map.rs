use std::fmt;

use crate::error::RankMapError;
use crate::shape::{GroupShape, LatticeShape, PhysicalShape, LATTICE_DIM};

/// Where a logical axis lives: inside the node, or along a physical axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisTarget {
    Grouping,
    Physical(usize),
}

impl fmt::Display for AxisTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisTarget::Grouping => write!(f, "node"),
            AxisTarget::Physical(axis) => write!(f, "{}", axis),
        }
    }
}

/// Correspondence between the 4 logical axes and the physical topology.
///
/// Always a bijection onto `{Grouping} ∪ {0..physical_dim}`; the only way to
/// obtain one is [`match_axes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisMap {
    targets: [AxisTarget; LATTICE_DIM],
}

impl AxisMap {
    pub fn target(&self, axis: usize) -> AxisTarget {
        self.targets[axis]
    }

    pub fn targets(&self) -> &[AxisTarget; LATTICE_DIM] {
        &self.targets
    }

    pub fn grouping_axis(&self) -> usize {
        self.targets
            .iter()
            .position(|t| *t == AxisTarget::Grouping)
            .unwrap_or(0)
    }

    /// Logical axis mapped onto `physical_axis`, if any.
    pub fn logical_axis_of(&self, physical_axis: usize) -> Option<usize> {
        self.targets
            .iter()
            .position(|t| *t == AxisTarget::Physical(physical_axis))
    }
}

impl fmt::Display for AxisMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, t) in self.targets.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", t)?;
        }
        Ok(())
    }
}

/// Physical extent a logical axis needs: its lattice extent divided by the
/// part of it that lives inside a node.
pub fn physical_requirement(lattice: &LatticeShape, group: &GroupShape, axis: usize) -> usize {
    lattice.extent(axis) / group.extent(axis)
}

/// Match logical axes to physical axes by extent.
///
/// Logical axes are scanned in index order and each takes the first unused
/// physical axis with the required extent. Anything short of a perfect
/// bijection is a topology mismatch.
pub fn match_axes(
    lattice: &LatticeShape,
    group: &GroupShape,
    grouping_axis: usize,
    physical: &PhysicalShape,
) -> Result<AxisMap, RankMapError> {
    let mismatch = || RankMapError::TopologyMismatch {
        lattice: *lattice,
        group: *group,
        grouping_axis,
        physical: physical.clone(),
    };

    let mut used = vec![0usize; physical.dimension()];
    let mut grouping_uses = 0usize;
    let mut targets = [AxisTarget::Grouping; LATTICE_DIM];

    for (axis, target) in targets.iter_mut().enumerate() {
        if axis == grouping_axis {
            *target = AxisTarget::Grouping;
            grouping_uses += 1;
            continue;
        }
        let required = physical_requirement(lattice, group, axis);
        let found = (0..physical.dimension())
            .find(|&p| used[p] == 0 && physical.extent(p) == required)
            .ok_or_else(mismatch)?;
        used[found] += 1;
        *target = AxisTarget::Physical(found);
    }

    if grouping_uses != 1 || used.iter().any(|&n| n != 1) {
        return Err(mismatch());
    }

    Ok(AxisMap { targets })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple(
        lattice: [usize; 4],
        grouping_axis: usize,
        physical: &[usize],
    ) -> Result<AxisMap, RankMapError> {
        let lattice = LatticeShape::new(lattice);
        let group = GroupShape::along_axis(grouping_axis, lattice.extent(grouping_axis));
        match_axes(&lattice, &group, grouping_axis, &PhysicalShape::from_slice(physical))
    }

    #[test]
    fn test_matches_unique_bijection() {
        let map = simple([8, 4, 4, 4], 1, &[8, 4, 4]).unwrap();
        assert_eq!(
            map.targets(),
            &[
                AxisTarget::Physical(0),
                AxisTarget::Grouping,
                AxisTarget::Physical(1),
                AxisTarget::Physical(2)
            ]
        );
        assert_eq!(map.grouping_axis(), 1);
        assert_eq!(map.logical_axis_of(2), Some(3));
    }

    #[test]
    fn test_no_second_axis_of_extent_four() {
        let err = simple([8, 4, 4, 4], 1, &[8, 4, 2]).unwrap_err();
        match err {
            RankMapError::TopologyMismatch { grouping_axis, physical, .. } => {
                assert_eq!(grouping_axis, 1);
                assert_eq!(physical.extents(), &[8, 4, 2]);
            }
            other => panic!("expected topology mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_tie_break_is_left_to_right() {
        let map = simple([4, 8, 8, 4], 0, &[8, 8, 4]).unwrap();
        assert_eq!(map.target(0), AxisTarget::Grouping);
        assert_eq!(map.target(1), AxisTarget::Physical(0));
        assert_eq!(map.target(2), AxisTarget::Physical(1));
        assert_eq!(map.target(3), AxisTarget::Physical(2));
    }

    #[test]
    fn test_matching_ignores_physical_order() {
        let map = simple([8, 4, 2, 4], 3, &[2, 4, 8]).unwrap();
        assert_eq!(map.target(0), AxisTarget::Physical(2));
        assert_eq!(map.target(1), AxisTarget::Physical(1));
        assert_eq!(map.target(2), AxisTarget::Physical(0));
    }

    #[test]
    fn test_general_requirement_divides_by_group() {
        let lattice = LatticeShape::new([8, 4, 4, 1]);
        let group = GroupShape::new([1, 2, 2, 1]);
        let physical = PhysicalShape::from_slice(&[8, 2, 2]);
        let map = match_axes(&lattice, &group, 3, &physical).unwrap();
        assert_eq!(map.to_string(), "0 1 2 node");
    }

    #[test]
    fn test_extra_physical_axis_is_mismatch() {
        let lattice = LatticeShape::new([8, 4, 4, 4]);
        let group = GroupShape::along_axis(1, 4);
        let physical = PhysicalShape::from_slice(&[8, 4, 4, 1]);
        assert!(matches!(
            match_axes(&lattice, &group, 1, &physical),
            Err(RankMapError::TopologyMismatch { .. })
        ));
    }
}

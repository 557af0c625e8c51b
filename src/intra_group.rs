use crate::error::RankMapError;
use crate::linearize::decode_mixed_radix;
use crate::shape::{Coord4, GroupShape};

/// Turns a node-local index into a coordinate of the intra-node sub-lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntraGroupDecoder {
    shape: GroupShape,
}

impl IntraGroupDecoder {
    pub fn new(shape: GroupShape, group_size: usize) -> Result<Self, RankMapError> {
        if shape.volume() != group_size {
            return Err(RankMapError::Config(format!(
                "{} != p1 x p2 x p3 x p4 (intra-node sizes {})",
                group_size, shape
            )));
        }
        Ok(Self { shape })
    }

    pub fn shape(&self) -> &GroupShape {
        &self.shape
    }

    /// `local_index` must be below the group size.
    pub fn decode(&self, local_index: usize) -> Coord4 {
        debug_assert!(local_index < self.shape.volume());
        decode_mixed_radix(local_index, self.shape.extents())
    }
}

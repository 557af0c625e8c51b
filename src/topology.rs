use crate::error::RankMapError;
use crate::shape::{PhysicalCoord, PhysicalShape};

/// Physical placement service of the job runtime.
pub trait Topology: Sync {
    fn dimension(&self) -> Result<usize, RankMapError>;

    fn shape(&self) -> Result<PhysicalShape, RankMapError>;

    /// Physical coordinate of the node hosting `rank`.
    fn coords(&self, rank: usize) -> Result<PhysicalCoord, RankMapError>;
}

/// Simulated topology: `group_size` consecutive ranks share a node and nodes
/// are laid out over the physical shape with axis 0 varying fastest.
#[derive(Debug, Clone)]
pub struct GridTopology {
    shape: PhysicalShape,
    group_size: usize,
}

impl GridTopology {
    pub fn new(shape: PhysicalShape, group_size: usize) -> Result<Self, RankMapError> {
        if shape.extents().iter().any(|&e| e == 0) {
            return Err(RankMapError::Topology(format!(
                "topology extents must be positive: {}",
                shape
            )));
        }
        if group_size == 0 {
            return Err(RankMapError::Topology("group size must be positive".to_string()));
        }
        let capacity = shape.checked_volume().and_then(|n| n.checked_mul(group_size));
        if capacity.is_none() {
            return Err(RankMapError::Topology(format!(
                "topology {} with {} processes per node is too large",
                shape, group_size
            )));
        }
        Ok(Self { shape, group_size })
    }
}

impl Topology for GridTopology {
    fn dimension(&self) -> Result<usize, RankMapError> {
        Ok(self.shape.dimension())
    }

    fn shape(&self) -> Result<PhysicalShape, RankMapError> {
        Ok(self.shape.clone())
    }

    fn coords(&self, rank: usize) -> Result<PhysicalCoord, RankMapError> {
        let node = rank / self.group_size;
        if node >= self.shape.volume() {
            return Err(RankMapError::Topology(format!(
                "rank {} lies outside the {} node topology ({} processes per node)",
                rank, self.shape, self.group_size
            )));
        }
        let mut rest = node;
        let coord: PhysicalCoord = self
            .shape
            .extents()
            .iter()
            .map(|&e| {
                let c = rest % e;
                rest /= e;
                c
            })
            .collect();
        Ok(coord)
    }
}

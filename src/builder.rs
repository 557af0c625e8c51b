use tracing::{debug, info};

use crate::axis_map::match_axes;
use crate::compose::CoordinateComposer;
use crate::config::MapConfig;
use crate::error::RankMapError;
use crate::group::{agree, ProcessGroup};
use crate::intra_group::IntraGroupDecoder;
use crate::linearize::Linearizer;
use crate::shape::{Coord4, PhysicalCoord, PhysicalShape};
use crate::table::GlobalCoordinateTable;
use crate::topology::Topology;
use crate::validate::{
    check_own_coord, check_rank_id, check_topology_dimension, check_topology_shape, slot_words,
};

/// Where one process ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub rank: usize,
    pub physical: PhysicalCoord,
    pub sub: Coord4,
    pub lattice_coord: Coord4,
    pub rank_id: usize,
}

/// Everything a process derives locally once the physical shape is known.
/// Identical on every process given identical inputs.
pub struct MappingPlan<'a> {
    config: &'a MapConfig,
    linearizer: &'a dyn Linearizer,
    physical: PhysicalShape,
    composer: CoordinateComposer,
    decoder: IntraGroupDecoder,
}

impl MappingPlan<'_> {
    pub fn physical_shape(&self) -> &PhysicalShape {
        &self.physical
    }

    pub fn composer(&self) -> &CoordinateComposer {
        &self.composer
    }

    /// Place `rank`, hosted on the node at `physical`.
    ///
    /// The node-local index is `rank % group_size`: the runtime must put
    /// `group_size` consecutive ranks on each node. That is an assumption
    /// about the launcher and cannot be checked here.
    pub fn place(&self, rank: usize, physical: &[usize]) -> Result<Placement, RankMapError> {
        check_own_coord(rank, physical, &self.physical)?;
        let sub = self.decoder.decode(rank % self.config.group_size());
        let lattice_coord = self.composer.compose(physical, &sub);
        let lattice = self.config.lattice();
        if !lattice.contains(&lattice_coord) {
            return Err(RankMapError::Internal(format!(
                "rank {} composed {:?} outside the {} lattice",
                rank, lattice_coord, lattice
            )));
        }
        let rank_id = self.linearizer.rank_id(&lattice_coord, lattice.extents());
        check_rank_id(rank_id, self.config.process_count())?;
        Ok(Placement {
            rank,
            physical: PhysicalCoord::from_slice(physical),
            sub,
            lattice_coord,
            rank_id,
        })
    }

    /// Table-sized buffer that is zero except for this process's slot.
    pub fn contribution(&self, placement: &Placement) -> Vec<i64> {
        let words = slot_words(self.physical.dimension());
        let mut buffer = vec![0i64; words * self.config.process_count()];
        self.scatter(placement, &mut buffer);
        buffer
    }

    /// Add this placement's slot into a table-sized buffer, the same way the
    /// reduction would add its contribution.
    pub fn scatter(&self, placement: &Placement, buffer: &mut [i64]) {
        let dim = self.physical.dimension();
        let words = slot_words(dim);
        let slot = &mut buffer[words * placement.rank_id..words * (placement.rank_id + 1)];
        for (word, &c) in slot.iter_mut().zip(placement.physical.iter()) {
            *word += c as i64;
        }
        slot[dim] += 1;
    }
}

/// Runs the mapping for one process of the job.
pub struct MapBuilder<'a> {
    config: &'a MapConfig,
    linearizer: &'a dyn Linearizer,
}

impl<'a> MapBuilder<'a> {
    pub fn new(config: &'a MapConfig, linearizer: &'a dyn Linearizer) -> Self {
        Self { config, linearizer }
    }

    /// Query the topology service for its shape.
    pub fn discover<T: Topology + ?Sized>(
        &self,
        topology: &T,
    ) -> Result<PhysicalShape, RankMapError> {
        let dimension = topology.dimension()?;
        check_topology_dimension(dimension)?;
        let shape = topology.shape()?;
        check_topology_shape(&shape, dimension)?;
        Ok(shape)
    }

    pub fn plan(&self, physical: &PhysicalShape) -> Result<MappingPlan<'a>, RankMapError> {
        let config = self.config;
        let axis_map = match_axes(
            config.lattice(),
            config.group(),
            config.grouping_axis(),
            physical,
        )?;
        let decoder = IntraGroupDecoder::new(*config.group(), config.group_size())?;
        Ok(MappingPlan {
            config,
            linearizer: self.linearizer,
            physical: physical.clone(),
            composer: CoordinateComposer::new(*config.group(), axis_map),
            decoder,
        })
    }

    /// One full collective pass. Every process of `group` must call this;
    /// each returns the same table or every one of them returns an error.
    #[tracing::instrument(skip_all, fields(rank = group.rank()))]
    pub fn build<G, T>(
        &self,
        group: &G,
        topology: &T,
    ) -> Result<GlobalCoordinateTable, RankMapError>
    where
        G: ProcessGroup + ?Sized,
        T: Topology + ?Sized,
    {
        let rank = group.rank();
        let np = group.size();

        agree(group, "parameter check", self.config.check_process_count(np))?;

        let physical = agree(group, "topology query", self.discover(topology))?;
        if group.is_root() {
            info!("[rankmap] shape of the physical topology: {}", physical);
            info!("[rankmap] using rankmap: {}", self.linearizer.name());
        }

        let plan = agree(group, "direction map", self.plan(&physical))?;
        if group.is_root() {
            info!(
                "[rankmap] direction map (logical axis -> physical axis): {}",
                plan.composer().axis_map()
            );
        }

        let placement = agree(
            group,
            "placement",
            topology.coords(rank).and_then(|coords| plan.place(rank, &coords)),
        )?;
        debug!(
            "[rankmap] rank {}: physical={:?} sub={:?} coords={:?} rankid={}",
            rank, placement.physical, placement.sub, placement.lattice_coord, placement.rank_id
        );

        let mut buffer = plan.contribution(&placement);
        group.all_reduce_sum(&mut buffer)?;

        agree(
            group,
            "table validation",
            GlobalCoordinateTable::from_reduced(&buffer, &physical, np),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::SoloGroup;
    use crate::linearize::Lexical;
    use crate::shape::{GroupShape, LatticeShape};
    use crate::topology::GridTopology;

    #[test]
    fn test_single_process_job() {
        let config = MapConfig::simple(LatticeShape::new([1, 1, 1, 1]), None, 1).unwrap();
        let topology = GridTopology::new(PhysicalShape::from_slice(&[1, 1, 1]), 1).unwrap();
        let table = MapBuilder::new(&config, &Lexical).build(&SoloGroup, &topology).unwrap();
        assert_eq!(table.to_string(), "(0,0,0)\n");
    }

    #[test]
    fn test_process_count_checked_first() {
        let config = MapConfig::simple(LatticeShape::new([8, 4, 4, 4]), None, 4).unwrap();
        let topology = GridTopology::new(PhysicalShape::from_slice(&[8, 4, 4]), 4).unwrap();
        let err = MapBuilder::new(&config, &Lexical).build(&SoloGroup, &topology).unwrap_err();
        assert!(matches!(err, RankMapError::Config(_)));
    }

    #[test]
    fn test_wrong_dimension_is_config_error() {
        let config = MapConfig::simple(LatticeShape::new([8, 4, 4, 4]), None, 4).unwrap();
        let topology = GridTopology::new(PhysicalShape::from_slice(&[8, 16]), 4).unwrap();
        let err = MapBuilder::new(&config, &Lexical).discover(&topology).unwrap_err();
        assert!(err.to_string().contains("must be 3-dim"));
    }

    #[test]
    fn test_contribution_touches_only_own_slot() {
        let lattice = LatticeShape::new([8, 4, 4, 1]);
        let config = MapConfig::general(lattice, GroupShape::new([1, 2, 2, 1]), 4).unwrap();
        let builder = MapBuilder::new(&config, &Lexical);
        let plan = builder.plan(&PhysicalShape::from_slice(&[8, 2, 2])).unwrap();
        let placement = plan.place(13, &[3, 1, 0]).unwrap();
        // local index 1 -> sub (0,1,0,0); coords (3, 2*1+1, 0, 0)
        assert_eq!(placement.lattice_coord, [3, 3, 0, 0]);
        assert_eq!(placement.rank_id, 3 + 8 * 3);
        let buffer = plan.contribution(&placement);
        assert_eq!(buffer.len(), 4 * 128);
        let nonzero: Vec<usize> = buffer
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != 0)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(nonzero, vec![4 * 27, 4 * 27 + 1, 4 * 27 + 3]);
    }

    #[test]
    fn test_scatter_matches_summed_contributions() {
        let lattice = LatticeShape::new([8, 4, 4, 1]);
        let config = MapConfig::general(lattice, GroupShape::new([1, 2, 2, 1]), 4).unwrap();
        let builder = MapBuilder::new(&config, &Lexical);
        let plan = builder.plan(&PhysicalShape::from_slice(&[8, 2, 2])).unwrap();
        let placements = [
            plan.place(13, &[3, 1, 0]).unwrap(),
            plan.place(14, &[3, 1, 0]).unwrap(),
            plan.place(127, &[7, 1, 1]).unwrap(),
        ];

        let mut summed = vec![0i64; 4 * 128];
        let mut scattered = vec![0i64; 4 * 128];
        for placement in &placements {
            for (acc, v) in summed.iter_mut().zip(plan.contribution(placement)) {
                *acc += v;
            }
            plan.scatter(placement, &mut scattered);
        }
        assert_eq!(scattered, summed);

        // a second write to the same slot shows up in its occupancy word
        plan.scatter(&placements[0], &mut scattered);
        assert_eq!(scattered[4 * placements[0].rank_id + 3], 2);
    }

    #[test]
    fn test_place_rejects_coordinate_outside_topology() {
        let config = MapConfig::simple(LatticeShape::new([8, 4, 4, 4]), None, 4).unwrap();
        let builder = MapBuilder::new(&config, &Lexical);
        let plan = builder.plan(&PhysicalShape::from_slice(&[8, 4, 4])).unwrap();
        assert!(matches!(plan.place(0, &[8, 0, 0]), Err(RankMapError::Topology(_))));
    }
}

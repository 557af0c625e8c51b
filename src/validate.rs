//! Consistency checks around the aggregation.
//!
//! Shape consistency (positive extents, group divisibility, process count)
//! is checked when a [`MapConfig`](crate::config::MapConfig) is built and by
//! [`MapConfig::check_process_count`](crate::config::MapConfig::check_process_count);
//! axis feasibility by [`match_axes`](crate::axis_map::match_axes). The
//! checks here cover the topology service's answers and the reduced table.

use fixedbitset::FixedBitSet;

use crate::error::RankMapError;
use crate::shape::{PhysicalCoord, PhysicalShape, PHYSICAL_DIM};

/// Words per table slot in the reduction buffer: the coordinate followed by
/// an occupancy counter.
pub fn slot_words(physical_dim: usize) -> usize {
    physical_dim + 1
}

pub fn check_topology_dimension(dimension: usize) -> Result<(), RankMapError> {
    if dimension != PHYSICAL_DIM {
        return Err(RankMapError::Config(format!(
            "rank topology must be {}-dim but given dimension is {}",
            PHYSICAL_DIM, dimension
        )));
    }
    Ok(())
}

pub fn check_topology_shape(shape: &PhysicalShape, dimension: usize) -> Result<(), RankMapError> {
    if shape.dimension() != dimension {
        return Err(RankMapError::Topology(format!(
            "topology reports dimension {} but a shape of {} axes: {}",
            dimension,
            shape.dimension(),
            shape
        )));
    }
    if shape.extents().iter().any(|&e| e == 0) {
        return Err(RankMapError::Topology(format!(
            "topology shape has an empty axis: {}",
            shape
        )));
    }
    Ok(())
}

pub fn check_own_coord(
    rank: usize,
    coord: &[usize],
    shape: &PhysicalShape,
) -> Result<(), RankMapError> {
    if !shape.contains(coord) {
        return Err(RankMapError::Topology(format!(
            "rank {} reported coordinate {:?} outside the topology {}",
            rank, coord, shape
        )));
    }
    Ok(())
}

pub fn check_rank_id(rank_id: usize, process_count: usize) -> Result<(), RankMapError> {
    if rank_id >= process_count {
        return Err(RankMapError::Internal(format!(
            "rank id {} out of range for {} processes",
            rank_id, process_count
        )));
    }
    Ok(())
}

/// Unpack a reduced buffer into per-rank coordinates.
///
/// Every slot must have been written by exactly one process and hold a
/// coordinate inside `shape`.
pub fn check_reduced(
    buffer: &[i64],
    shape: &PhysicalShape,
    process_count: usize,
) -> Result<Vec<PhysicalCoord>, RankMapError> {
    let dim = shape.dimension();
    let words = slot_words(dim);
    if buffer.len() != words * process_count {
        return Err(RankMapError::Internal(format!(
            "reduced buffer has {} words, expected {}",
            buffer.len(),
            words * process_count
        )));
    }

    let mut written = FixedBitSet::with_capacity(process_count);
    let mut entries = Vec::with_capacity(process_count);
    for (rank_id, slot) in buffer.chunks_exact(words).enumerate() {
        let occupancy = slot[dim];
        if occupancy > 1 {
            return Err(RankMapError::Internal(format!(
                "rank id {} was written by {} processes",
                rank_id, occupancy
            )));
        }
        if occupancy == 1 {
            written.insert(rank_id);
        }
        let mut coord = PhysicalCoord::with_capacity(dim);
        for (axis, &value) in slot[..dim].iter().enumerate() {
            if value < 0 || value as usize >= shape.extent(axis) {
                return Err(RankMapError::Internal(format!(
                    "cannot happen: rank id {}, axis {}, coordinate {} outside [0, {})",
                    rank_id,
                    axis,
                    value,
                    shape.extent(axis)
                )));
            }
            coord.push(value as usize);
        }
        entries.push(coord);
    }

    let missing = process_count - written.count_ones(..);
    if missing > 0 {
        written.toggle_range(..);
        let gaps: Vec<usize> = written.ones().take(8).collect();
        return Err(RankMapError::Internal(format!(
            "{} rank ids were never written, first: {:?}",
            missing, gaps
        )));
    }
    Ok(entries)
}

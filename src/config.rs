use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::axis_map::physical_requirement;
use crate::error::RankMapError;
use crate::linearize::{Lexical, Linearizer, ReverseLexical};
use crate::shape::{Coord4, GroupShape, LatticeShape, DEFAULT_GROUP_SIZE, LATTICE_DIM, PHYSICAL_DIM};
use crate::validate::slot_words;

/// Default name of the rank map file.
pub const RANK_MAP_FILE: &str = "rankmap_4d_list.txt";

/// Which linearization turns lattice coordinates into rank ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum LinearizerKind {
    #[default]
    Lexical,
    ReverseLexical,
}

impl LinearizerKind {
    pub fn build(self) -> Box<dyn Linearizer> {
        match self {
            LinearizerKind::Lexical => Box::new(Lexical),
            LinearizerKind::ReverseLexical => Box::new(ReverseLexical),
        }
    }
}

/// Fully validated description of the requested mapping.
///
/// Both program variants end up here: the simple variant is a group shape
/// that is 1 everywhere except `group_size` along the grouping axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapConfig {
    lattice: LatticeShape,
    group: GroupShape,
    grouping_axis: usize,
    group_size: usize,
}

fn check_positive(what: &str, extents: &Coord4) -> Result<(), RankMapError> {
    if extents.iter().any(|&e| e == 0) {
        return Err(RankMapError::Config(format!(
            "{} sizes must be positive: {},{},{},{}",
            what, extents[0], extents[1], extents[2], extents[3]
        )));
    }
    Ok(())
}

/// The process count and the reduction buffer derived from it must both fit
/// in a `usize`.
fn check_lattice_size(lattice: &LatticeShape) -> Result<(), RankMapError> {
    lattice
        .checked_volume()
        .and_then(|n| n.checked_mul(slot_words(PHYSICAL_DIM)))
        .map(|_| ())
        .ok_or_else(|| RankMapError::Config(format!("process lattice is too large: {}", lattice)))
}

impl MapConfig {
    /// One lattice axis equals the group size and holds the whole node.
    /// `grouping_axis` picks it (0-based); `None` takes the first axis whose
    /// extent equals the group size.
    pub fn simple(
        lattice: LatticeShape,
        grouping_axis: Option<usize>,
        group_size: usize,
    ) -> Result<Self, RankMapError> {
        check_positive("process lattice", lattice.extents())?;
        check_lattice_size(&lattice)?;
        if group_size == 0 {
            return Err(RankMapError::Config("group size must be positive".to_string()));
        }
        let axis = match grouping_axis {
            Some(axis) if axis >= LATTICE_DIM => {
                return Err(RankMapError::Config(format!(
                    "bad direction: must be in [1-4] but given as {}",
                    axis + 1
                )));
            }
            Some(axis) => {
                if lattice.extent(axis) != group_size {
                    return Err(RankMapError::Config(format!(
                        "direction is {} but proc[{}] = {} != {}",
                        axis + 1,
                        axis,
                        lattice.extent(axis),
                        group_size
                    )));
                }
                axis
            }
            None => (0..LATTICE_DIM)
                .find(|&axis| lattice.extent(axis) == group_size)
                .ok_or_else(|| {
                    RankMapError::Config(format!(
                        "none of the proc size is {} (at least one must be {}): {}",
                        group_size, group_size, lattice
                    ))
                })?,
        };
        Ok(Self {
            lattice,
            group: GroupShape::along_axis(axis, group_size),
            grouping_axis: axis,
            group_size,
        })
    }

    /// Intra-node sub-lattice given explicitly. The grouping axis is the
    /// single axis whose node-lattice extent is 1.
    pub fn general(
        lattice: LatticeShape,
        group: GroupShape,
        group_size: usize,
    ) -> Result<Self, RankMapError> {
        check_positive("process lattice", lattice.extents())?;
        check_positive("intra-node lattice", group.extents())?;
        check_lattice_size(&lattice)?;
        if group.checked_volume() != Some(group_size) {
            return Err(RankMapError::Config(format!(
                "{} != p1 x p2 x p3 x p4 (p1,p2,p3,p4={})",
                group_size, group
            )));
        }
        for axis in 0..LATTICE_DIM {
            if lattice.extent(axis) % group.extent(axis) != 0 {
                return Err(RankMapError::Config(format!(
                    "intra-node size {} does not divide process size {} in direction {}",
                    group.extent(axis),
                    lattice.extent(axis),
                    axis + 1
                )));
            }
        }
        let node_lattice: Vec<usize> = (0..LATTICE_DIM)
            .map(|axis| physical_requirement(&lattice, &group, axis))
            .collect();
        let absorbed: Vec<usize> = (0..LATTICE_DIM)
            .filter(|&axis| node_lattice[axis] == 1)
            .collect();
        let grouping_axis = match absorbed.as_slice() {
            [axis] => *axis,
            [] => {
                return Err(RankMapError::Config(format!(
                    "none of the node lattice size is 1: {:?}",
                    node_lattice
                )));
            }
            _ => {
                return Err(RankMapError::Config(format!(
                    "more than one node lattice size is 1: {:?}",
                    node_lattice
                )));
            }
        };
        Ok(Self {
            lattice,
            group,
            grouping_axis,
            group_size,
        })
    }

    pub fn lattice(&self) -> &LatticeShape {
        &self.lattice
    }

    pub fn group(&self) -> &GroupShape {
        &self.group
    }

    pub fn grouping_axis(&self) -> usize {
        self.grouping_axis
    }

    pub fn group_size(&self) -> usize {
        self.group_size
    }

    pub fn process_count(&self) -> usize {
        self.lattice.volume()
    }

    /// Number of nodes the lattice occupies.
    pub fn node_count(&self) -> usize {
        self.process_count() / self.group_size
    }

    /// The lattice must use every process of the job, no more and no less.
    pub fn check_process_count(&self, np: usize) -> Result<(), RankMapError> {
        if np != self.process_count() {
            let e = self.lattice.extents();
            return Err(RankMapError::Config(format!(
                "np={} != P1 x P2 x P3 x P4 (P1,P2,P3,P4={},{},{},{})",
                np, e[0], e[1], e[2], e[3]
            )));
        }
        Ok(())
    }
}

/// JSON job description, an alternative to passing shapes on the command
/// line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobFile {
    pub lattice: LatticeShape,
    #[serde(default)]
    pub group: Option<GroupShape>,
    /// 1-based, simple variant only.
    #[serde(default)]
    pub inner_direction: Option<usize>,
    #[serde(default = "default_group_size")]
    pub group_size: usize,
    pub topology: Vec<usize>,
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub rankmap: LinearizerKind,
}

fn default_group_size() -> usize {
    DEFAULT_GROUP_SIZE
}

impl JobFile {
    pub fn load(path: &Path) -> Result<Self, RankMapError> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, RankMapError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn map_config(&self) -> Result<MapConfig, RankMapError> {
        match (self.group, self.inner_direction) {
            (Some(_), Some(_)) => Err(RankMapError::Config(
                "inner_direction only applies when no group shape is given".to_string(),
            )),
            (Some(group), None) => MapConfig::general(self.lattice, group, self.group_size),
            (None, direction) => {
                let axis = match direction {
                    Some(0) => {
                        return Err(RankMapError::Config(
                            "bad direction: must be in [1-4] but given as 0".to_string(),
                        ));
                    }
                    Some(d) => Some(d - 1),
                    None => None,
                };
                MapConfig::simple(self.lattice, axis, self.group_size)
            }
        }
    }
}

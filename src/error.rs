use std::fmt;

use crate::shape::{GroupShape, LatticeShape, PhysicalShape};

#[derive(Debug)]
pub enum RankMapError {
    Config(String),
    TopologyMismatch {
        lattice: LatticeShape,
        group: GroupShape,
        grouping_axis: usize,
        physical: PhysicalShape,
    },
    Topology(String),
    Runtime(String),
    Internal(String),
    PeerFailure { step: String },
    Parse(String),
    Io(std::io::Error),
}

impl fmt::Display for RankMapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankMapError::Config(e) => write!(f, "Configuration error: {}", e),
            RankMapError::TopologyMismatch {
                lattice,
                group,
                grouping_axis,
                physical,
            } => {
                writeln!(
                    f,
                    "Topology mismatch: cannot map the process lattice to the given topology"
                )?;
                writeln!(f, " required 4-dim process size: {}", lattice)?;
                writeln!(f, " intra-node 4-dim process size: {}", group)?;
                writeln!(f, " in-node direction [1-4]: {}", grouping_axis + 1)?;
                write!(f, " {}-dim node shape: {}", physical.dimension(), physical)
            }
            RankMapError::Topology(e) => write!(f, "Topology service error: {}", e),
            RankMapError::Runtime(e) => write!(f, "Process group error: {}", e),
            RankMapError::Internal(e) => write!(f, "Internal consistency error: {}", e),
            RankMapError::PeerFailure { step } => write!(f, "Another process failed at {}", step),
            RankMapError::Parse(e) => write!(f, "Parse error: {}", e),
            RankMapError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for RankMapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RankMapError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RankMapError {
    fn from(err: std::io::Error) -> Self {
        RankMapError::Io(err)
    }
}

impl From<serde_json::Error> for RankMapError {
    fn from(err: serde_json::Error) -> Self {
        RankMapError::Parse(err.to_string())
    }
}

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use itertools::Itertools;
use rustc_hash::FxHashMap;

use crate::error::RankMapError;
use crate::shape::{PhysicalCoord, PhysicalShape};
use crate::validate::check_reduced;

/// Physical coordinate of every rank id, indexed by rank id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalCoordinateTable {
    shape: PhysicalShape,
    entries: Vec<PhysicalCoord>,
}

impl GlobalCoordinateTable {
    /// Validate and unpack the buffer produced by the aggregation.
    pub fn from_reduced(
        buffer: &[i64],
        shape: &PhysicalShape,
        process_count: usize,
    ) -> Result<Self, RankMapError> {
        let entries = check_reduced(buffer, shape, process_count)?;
        Ok(Self {
            shape: shape.clone(),
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn physical_shape(&self) -> &PhysicalShape {
        &self.shape
    }

    pub fn get(&self, rank_id: usize) -> Option<&[usize]> {
        self.entries.get(rank_id).map(|c| c.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &[usize]> {
        self.entries.iter().map(|c| c.as_slice())
    }

    /// How many rank ids land on each node.
    pub fn ranks_per_node(&self) -> FxHashMap<PhysicalCoord, usize> {
        let mut counts = FxHashMap::default();
        for entry in &self.entries {
            *counts.entry(entry.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// One `(x,y,z)` line per rank id, ascending.
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<(), RankMapError> {
        write!(out, "{}", self)?;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), RankMapError> {
        let mut out = BufWriter::new(File::create(path)?);
        self.write_to(&mut out)?;
        out.flush()?;
        Ok(())
    }
}

impl fmt::Display for GlobalCoordinateTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{}", Tuple(entry))?;
        }
        Ok(())
    }
}

struct Tuple<'a>(&'a [usize]);

impl fmt::Display for Tuple<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.0.iter().join(","))
    }
}

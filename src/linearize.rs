use crate::shape::{Coord4, LATTICE_DIM};

/// Bijection between lattice coordinates and rank ids.
///
/// Implementations must be total over `[0,e0) x .. x [0,e3)` and produce
/// exactly `0..product(e)`. Inputs are not checked: extents are positive and
/// coordinates/ids in range by the caller's contract.
pub trait Linearizer: Send + Sync {
    /// Name reported in the run log.
    fn name(&self) -> &'static str;

    fn rank_id(&self, coord: &Coord4, extents: &Coord4) -> usize;

    fn coords_of(&self, id: usize, extents: &Coord4) -> Coord4;
}

/// Axis 0 varies fastest.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lexical;

impl Linearizer for Lexical {
    fn name(&self) -> &'static str {
        "lexical rankmap"
    }

    fn rank_id(&self, coord: &Coord4, extents: &Coord4) -> usize {
        coord[0] + extents[0] * (coord[1] + extents[1] * (coord[2] + extents[2] * coord[3]))
    }

    fn coords_of(&self, id: usize, extents: &Coord4) -> Coord4 {
        decode_mixed_radix(id, extents)
    }
}

/// Axis 3 varies fastest.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReverseLexical;

impl Linearizer for ReverseLexical {
    fn name(&self) -> &'static str {
        "reverse lexical rankmap"
    }

    fn rank_id(&self, coord: &Coord4, extents: &Coord4) -> usize {
        coord[3] + extents[3] * (coord[2] + extents[2] * (coord[1] + extents[1] * coord[0]))
    }

    fn coords_of(&self, id: usize, extents: &Coord4) -> Coord4 {
        let mut coord = [0; LATTICE_DIM];
        let mut rest = id;
        for axis in (1..LATTICE_DIM).rev() {
            coord[axis] = rest % extents[axis];
            rest /= extents[axis];
        }
        coord[0] = rest;
        coord
    }
}

/// Mixed-radix decode with axis 0 as the least significant digit. The last
/// axis absorbs whatever remains.
pub fn decode_mixed_radix(index: usize, extents: &Coord4) -> Coord4 {
    let mut coord = [0; LATTICE_DIM];
    let mut rest = index;
    for axis in 0..LATTICE_DIM - 1 {
        coord[axis] = rest % extents[axis];
        rest /= extents[axis];
    }
    coord[LATTICE_DIM - 1] = rest;
    coord
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixedbitset::FixedBitSet;
    use itertools::Itertools;

    fn all_coords(extents: &Coord4) -> Vec<Coord4> {
        extents
            .iter()
            .map(|&e| 0..e)
            .multi_cartesian_product()
            .map(|c| [c[0], c[1], c[2], c[3]])
            .collect()
    }

    fn assert_bijection(linearizer: &dyn Linearizer, extents: Coord4) {
        let volume: usize = extents.iter().product();
        let mut seen = FixedBitSet::with_capacity(volume);
        for coord in all_coords(&extents) {
            let id = linearizer.rank_id(&coord, &extents);
            assert!(id < volume, "{} produced {} for {:?}", linearizer.name(), id, coord);
            assert!(!seen.contains(id), "{} repeated id {}", linearizer.name(), id);
            seen.insert(id);
            assert_eq!(linearizer.coords_of(id, &extents), coord);
        }
        assert_eq!(seen.count_ones(..), volume);
    }

    #[test]
    fn test_lexical_formula() {
        let extents = [8, 4, 4, 4];
        assert_eq!(Lexical.rank_id(&[0, 0, 0, 0], &extents), 0);
        assert_eq!(Lexical.rank_id(&[1, 0, 0, 0], &extents), 1);
        assert_eq!(Lexical.rank_id(&[0, 1, 0, 0], &extents), 8);
        assert_eq!(Lexical.rank_id(&[0, 0, 1, 0], &extents), 32);
        assert_eq!(Lexical.rank_id(&[7, 3, 3, 3], &extents), 511);
    }

    #[test]
    fn test_lexical_is_bijection() {
        assert_bijection(&Lexical, [8, 4, 4, 4]);
        assert_bijection(&Lexical, [3, 1, 5, 2]);
        assert_bijection(&Lexical, [1, 1, 1, 1]);
    }

    #[test]
    fn test_reverse_lexical_is_bijection() {
        assert_bijection(&ReverseLexical, [8, 4, 4, 4]);
        assert_bijection(&ReverseLexical, [2, 3, 1, 7]);
    }

    #[test]
    fn test_reverse_lexical_axis_order() {
        let extents = [2, 3, 4, 5];
        assert_eq!(ReverseLexical.rank_id(&[0, 0, 0, 1], &extents), 1);
        assert_eq!(ReverseLexical.rank_id(&[1, 0, 0, 0], &extents), 60);
    }

    #[test]
    fn test_decode_mixed_radix() {
        assert_eq!(decode_mixed_radix(3, &[1, 2, 2, 1]), [0, 1, 1, 0]);
        assert_eq!(decode_mixed_radix(2, &[1, 4, 1, 1]), [0, 2, 0, 0]);
    }
}

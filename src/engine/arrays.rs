//! Multi-dimensional array element addressing.
//!
//! A rank-N array carries per-dimension bounds with a precomputed stride
//! ("multiplier") for every dimension but the last. Each access computes
//! one absolute linear index by, for each dimension, subtracting the
//! lower bound, bounds-checking the unsigned result against the length,
//! scaling by the stride, and accumulating. Any violation raises an
//! index-out-of-range fault and performs no memory access.

use crate::engine::thread::RuntimeFault;

/// Bounds of one array dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArrayBounds {
    /// Lowest valid index in this dimension
    pub lower: i32,
    /// Number of elements in this dimension
    pub length: u32,
    /// Linear stride of one step in this dimension (1 for the last)
    pub multiplier: u32,
}

/// The shape of a rank-N array: per-dimension bounds with precomputed
/// strides.
#[derive(Clone, Debug)]
pub struct ArrayShape {
    dims: Vec<ArrayBounds>,
}

impl ArrayShape {
    /// Build a shape from `(lower_bound, length)` pairs, computing each
    /// dimension's stride as the product of all later lengths.
    #[must_use]
    pub fn new(bounds: &[(i32, u32)]) -> ArrayShape {
        let mut dims: Vec<ArrayBounds> = bounds
            .iter()
            .map(|&(lower, length)| ArrayBounds {
                lower,
                length,
                multiplier: 1,
            })
            .collect();
        let mut stride: u64 = 1;
        for dim in dims.iter_mut().rev() {
            dim.multiplier = stride.min(u64::from(u32::MAX)) as u32;
            stride = stride.saturating_mul(u64::from(dim.length));
        }
        ArrayShape { dims }
    }

    /// Number of dimensions.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Bounds of dimension `dim`.
    #[must_use]
    pub fn bounds(&self, dim: usize) -> Option<&ArrayBounds> {
        self.dims.get(dim)
    }

    /// Total number of elements.
    #[must_use]
    pub fn total_length(&self) -> u64 {
        self.dims
            .iter()
            .fold(1u64, |total, dim| total * u64::from(dim.length))
    }

    /// Compute the absolute linear index of one element.
    ///
    /// # Errors
    /// [`RuntimeFault::IndexOutOfRange`] when any index falls outside its
    /// dimension (including below a non-zero lower bound) or the index
    /// count does not match the rank.
    pub fn element_index(&self, indices: &[i32]) -> Result<u32, RuntimeFault> {
        if indices.len() != self.dims.len() {
            return Err(RuntimeFault::IndexOutOfRange);
        }
        let mut absolute: u64 = 0;
        for (dim, &index) in self.dims.iter().zip(indices) {
            // Subtracting the lower bound and comparing unsigned folds the
            // below-lower and above-length checks into one
            let position = index.wrapping_sub(dim.lower) as u32;
            if position >= dim.length {
                return Err(RuntimeFault::IndexOutOfRange);
            }
            absolute += u64::from(position) * u64::from(dim.multiplier);
        }
        Ok(absolute as u32)
    }

    /// Compute the byte offset of one element given its size.
    ///
    /// # Errors
    /// Same conditions as [`ArrayShape::element_index`].
    pub fn element_offset(&self, indices: &[i32], elem_size: u32) -> Result<u64, RuntimeFault> {
        Ok(u64::from(self.element_index(indices)?) * u64::from(elem_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_dimensional_linear_index() {
        // Lower bounds (0,0), lengths (3,4)
        let shape = ArrayShape::new(&[(0, 3), (0, 4)]);
        assert_eq!(shape.rank(), 2);
        assert_eq!(shape.total_length(), 12);
        assert_eq!(shape.bounds(0).unwrap().multiplier, 4);
        assert_eq!(shape.bounds(1).unwrap().multiplier, 1);

        // (2,3) lands at linear offset 2*4+3 = 11
        assert_eq!(shape.element_index(&[2, 3]).unwrap(), 11);
        assert_eq!(shape.element_index(&[0, 0]).unwrap(), 0);

        // (3,0) is out of range in the first dimension
        assert_eq!(
            shape.element_index(&[3, 0]),
            Err(RuntimeFault::IndexOutOfRange)
        );
        assert_eq!(
            shape.element_index(&[0, 4]),
            Err(RuntimeFault::IndexOutOfRange)
        );
        assert_eq!(
            shape.element_index(&[-1, 0]),
            Err(RuntimeFault::IndexOutOfRange)
        );
    }

    #[test]
    fn non_zero_lower_bounds() {
        let shape = ArrayShape::new(&[(1, 3), (10, 2)]);
        assert_eq!(shape.element_index(&[1, 10]).unwrap(), 0);
        assert_eq!(shape.element_index(&[3, 11]).unwrap(), 5);
        // Below the lower bound trips the same unsigned check
        assert_eq!(
            shape.element_index(&[0, 10]),
            Err(RuntimeFault::IndexOutOfRange)
        );
        assert_eq!(
            shape.element_index(&[1, 9]),
            Err(RuntimeFault::IndexOutOfRange)
        );
    }

    #[test]
    fn negative_lower_bounds() {
        let shape = ArrayShape::new(&[(-2, 5)]);
        assert_eq!(shape.element_index(&[-2]).unwrap(), 0);
        assert_eq!(shape.element_index(&[2]).unwrap(), 4);
        assert_eq!(
            shape.element_index(&[3]),
            Err(RuntimeFault::IndexOutOfRange)
        );
    }

    #[test]
    fn three_dimensional_strides() {
        let shape = ArrayShape::new(&[(0, 2), (0, 3), (0, 4)]);
        assert_eq!(shape.bounds(0).unwrap().multiplier, 12);
        assert_eq!(shape.bounds(1).unwrap().multiplier, 4);
        assert_eq!(shape.bounds(2).unwrap().multiplier, 1);
        assert_eq!(shape.element_index(&[1, 2, 3]).unwrap(), 23);
    }

    #[test]
    fn element_offsets_scale_by_size() {
        let shape = ArrayShape::new(&[(0, 3), (0, 4)]);
        assert_eq!(shape.element_offset(&[2, 3], 8).unwrap(), 88);
    }

    #[test]
    fn rank_mismatch_is_out_of_range() {
        let shape = ArrayShape::new(&[(0, 3), (0, 4)]);
        assert_eq!(
            shape.element_index(&[1]),
            Err(RuntimeFault::IndexOutOfRange)
        );
    }
}

//! Sparse numeric matrices
//!
//! An n-dimensional sparse tensor of scalar values, indexed by flat
//! row-major indices. An absent index reads as zero. A matrix flagged
//! boolean additionally guarantees every stored cell is `{0,1}`-valued;
//! operations that preserve that property preserve the flag.
//!
//! All cells of one matrix must come from one factory; the operations take
//! the factory explicitly, so the invariant is structural rather than
//! checked per call.

use std::rc::Rc;

use super::NumValue;
use crate::util::SparseSequence;

/// Dimensions of a matrix: the side of each dimension plus the derived
/// total capacity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dimensions {
    dims: Rc<[usize]>,
    capacity: usize,
}

impl Dimensions {
    /// Square dimensions: `n` dimensions of side `size`.
    ///
    /// # Panics
    /// Panics if the capacity `size^n` overflows; use
    /// [`Dimensions::checked_square`] where the inputs are not trusted.
    pub fn square(size: usize, n: usize) -> Dimensions {
        Self::checked_square(size, n).expect("matrix capacity overflow")
    }

    /// Square dimensions, or `None` when `size^n` overflows `usize`.
    pub fn checked_square(size: usize, n: usize) -> Option<Dimensions> {
        assert!(n >= 1, "dimensions need at least one dimension");
        let mut capacity: usize = 1;
        for _ in 0..n {
            capacity = capacity.checked_mul(size)?;
        }
        Some(Dimensions {
            dims: vec![size; n].into(),
            capacity,
        })
    }

    /// Rectangular dimensions with the given sides.
    pub fn rectangular(sides: Vec<usize>) -> Dimensions {
        assert!(!sides.is_empty(), "dimensions need at least one dimension");
        let capacity = sides
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .expect("matrix capacity overflow");
        Dimensions {
            dims: sides.into(),
            capacity,
        }
    }

    /// Total number of cells.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of dimensions.
    pub fn num_dimensions(&self) -> usize {
        self.dims.len()
    }

    /// Side of the `i`-th dimension.
    pub fn dimension(&self, i: usize) -> usize {
        self.dims[i]
    }

    /// True if `index` addresses a cell.
    pub fn validate(&self, index: usize) -> bool {
        index < self.capacity
    }

    /// True if every dimension has the same side.
    pub fn is_square(&self) -> bool {
        self.dims.iter().all(|&d| d == self.dims[0])
    }

    /// Dimensions of the dot product `self . other`: all of `self` but the
    /// last, then all of `other` but the first.
    ///
    /// # Panics
    /// Panics if the shared dimension disagrees or the result would be
    /// zero-dimensional.
    pub fn dot(&self, other: &Dimensions) -> Dimensions {
        assert_eq!(
            self.dims[self.dims.len() - 1],
            other.dims[0],
            "dimensions incompatible for multiplication"
        );
        assert!(
            self.dims.len() + other.dims.len() > 2,
            "dot product of two vectors is zero-dimensional"
        );
        let sides: Vec<usize> = self.dims[..self.dims.len() - 1]
            .iter()
            .chain(&other.dims[1..])
            .copied()
            .collect();
        Dimensions::rectangular(sides)
    }

    /// Dimensions of the cross product `self x other`.
    pub fn cross(&self, other: &Dimensions) -> Dimensions {
        let sides: Vec<usize> = self.dims.iter().chain(other.dims.iter()).copied().collect();
        Dimensions::rectangular(sides)
    }

    /// Dimensions with the two dimensions swapped.
    ///
    /// # Panics
    /// Panics unless the matrix is two-dimensional.
    pub fn transpose(&self) -> Dimensions {
        assert_eq!(self.dims.len(), 2, "transpose requires two dimensions");
        Dimensions::rectangular(vec![self.dims[1], self.dims[0]])
    }

    /// Decomposes a flat index into per-dimension coordinates.
    pub fn convert(&self, mut index: usize, coordinates: &mut [usize]) {
        debug_assert_eq!(coordinates.len(), self.dims.len());
        for i in (0..self.dims.len()).rev() {
            coordinates[i] = index % self.dims[i];
            index /= self.dims[i];
        }
    }

    /// Composes per-dimension coordinates into a flat index.
    pub fn index_of(&self, coordinates: &[usize]) -> usize {
        debug_assert_eq!(coordinates.len(), self.dims.len());
        let mut index = 0;
        for (i, &c) in coordinates.iter().enumerate() {
            debug_assert!(c < self.dims[i]);
            index = index * self.dims[i] + c;
        }
        index
    }
}

/// An n-dimensional sparse matrix of numeric scalars.
#[derive(Debug, Clone)]
pub struct NumericMatrix {
    dims: Dimensions,
    boolean: bool,
    cells: SparseSequence<NumValue>,
}

impl NumericMatrix {
    /// An empty matrix; `boolean` marks the `{0,1}`-valued invariant.
    pub fn empty(dims: Dimensions, boolean: bool) -> Self {
        Self {
            dims,
            boolean,
            cells: SparseSequence::tree(),
        }
    }

    /// A matrix holding `ONE` at each of `true_indices`. The backing store
    /// is chosen from the shape of `all_indices`: a contiguous range gets a
    /// dense array, anything else a tree.
    pub fn with_bounds(
        dims: Dimensions,
        boolean: bool,
        all_indices: &[usize],
        true_indices: &[usize],
    ) -> Self {
        debug_assert!(all_indices.len() >= true_indices.len());
        let contiguous = !all_indices.is_empty()
            && all_indices[all_indices.len() - 1] - all_indices[0] + 1 == all_indices.len();
        let mut cells = if contiguous {
            SparseSequence::dense(all_indices[0], all_indices[all_indices.len() - 1])
        } else {
            SparseSequence::tree()
        };
        for &i in true_indices {
            assert!(i < dims.capacity(), "index {} out of capacity", i);
            cells.put(i, NumValue::ONE);
        }
        Self {
            dims,
            boolean,
            cells,
        }
    }

    /// A matrix holding the same value at every given index.
    pub fn homogeneous(dims: Dimensions, indices: Vec<usize>, value: NumValue) -> Self {
        if value.is_zero() {
            return Self::empty(dims, false);
        }
        Self {
            dims,
            boolean: false,
            cells: SparseSequence::homogeneous(indices, value),
        }
    }

    /// Returns the dimensions of this matrix.
    pub fn dimensions(&self) -> &Dimensions {
        &self.dims
    }

    /// True if every cell of this matrix is `{0,1}`-valued.
    pub fn is_boolean(&self) -> bool {
        self.boolean
    }

    /// Number of non-zero cells.
    pub fn density(&self) -> usize {
        self.cells.len()
    }

    /// Returns the cell at `index`; absent cells read as zero.
    ///
    /// # Panics
    /// Panics if `index` is out of capacity.
    pub fn get(&self, index: usize) -> NumValue {
        assert!(
            self.dims.validate(index),
            "{} is not a valid index",
            index
        );
        self.cells.get(index).cloned().unwrap_or(NumValue::ZERO)
    }

    /// Sets the cell at `index`; a zero value removes the cell.
    ///
    /// # Panics
    /// Panics if `index` is out of capacity.
    pub fn set(&mut self, index: usize, value: NumValue) {
        assert!(
            self.dims.validate(index),
            "{} is not a valid index",
            index
        );
        self.fast_set(index, value);
    }

    pub(crate) fn fast_set(&mut self, index: usize, value: NumValue) {
        if value.is_zero() {
            self.cells.remove(index);
        } else {
            self.cells.put(index, value);
        }
    }

    pub(crate) fn fast_get(&self, index: usize) -> NumValue {
        self.cells.get(index).cloned().unwrap_or(NumValue::ZERO)
    }

    /// Iterates the non-zero cells in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &NumValue)> {
        self.cells.iter()
    }

    /// The non-zero cells, cloned, in ascending index order.
    pub fn entries(&self) -> Vec<(usize, NumValue)> {
        self.cells.iter().map(|(i, v)| (i, v.clone())).collect()
    }

    /// The indices of the non-zero cells.
    pub fn dense_indices(&self) -> Vec<usize> {
        self.cells.indices()
    }

    /// The non-zero value with the smallest index, or zero if none.
    pub fn get_first(&self) -> NumValue {
        self.cells
            .first()
            .map(|(_, v)| v.clone())
            .unwrap_or(NumValue::ZERO)
    }

    pub(crate) fn cells(&self) -> &SparseSequence<NumValue> {
        &self.cells
    }

    pub(crate) fn cells_mut(&mut self) -> &mut SparseSequence<NumValue> {
        &mut self.cells
    }

    pub(crate) fn set_boolean(&mut self, boolean: bool) {
        self.boolean = boolean;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_dimensions() {
        let d = Dimensions::square(3, 2);
        assert_eq!(d.capacity(), 9);
        assert_eq!(d.num_dimensions(), 2);
        assert!(d.is_square());
        assert!(d.validate(8));
        assert!(!d.validate(9));
    }

    #[test]
    fn checked_square_detects_overflow() {
        assert!(Dimensions::checked_square(usize::MAX, 2).is_none());
        assert!(Dimensions::checked_square(10, 3).is_some());
    }

    #[test]
    fn dot_and_cross_dimensions() {
        let a = Dimensions::square(3, 2);
        let b = Dimensions::square(3, 2);
        let dot = a.dot(&b);
        assert_eq!(dot.num_dimensions(), 2);
        assert_eq!(dot.capacity(), 9);

        let cross = a.cross(&b);
        assert_eq!(cross.num_dimensions(), 4);
        assert_eq!(cross.capacity(), 81);
    }

    #[test]
    fn index_conversion_round_trips() {
        let d = Dimensions::square(4, 3);
        let mut coords = [0usize; 3];
        for index in [0usize, 5, 17, 63] {
            d.convert(index, &mut coords);
            assert_eq!(d.index_of(&coords), index);
        }
    }

    #[test]
    fn absent_cells_read_as_zero() {
        let m = NumericMatrix::empty(Dimensions::square(2, 2), false);
        assert!(m.get(0).is_zero());
        assert_eq!(m.density(), 0);
    }

    #[test]
    fn set_zero_removes_cell() {
        let mut m = NumericMatrix::empty(Dimensions::square(2, 1), false);
        m.set(1, NumValue::ONE);
        assert_eq!(m.density(), 1);
        m.set(1, NumValue::ZERO);
        assert_eq!(m.density(), 0);
    }

    #[test]
    fn with_bounds_marks_lower_bound_cells() {
        let m = NumericMatrix::with_bounds(Dimensions::square(3, 1), true, &[0, 1, 2], &[1]);
        assert!(m.get(0).is_zero());
        assert!(m.get(1).is_one());
        assert_eq!(m.density(), 1);
    }

    #[test]
    #[should_panic(expected = "not a valid index")]
    fn out_of_capacity_get_panics() {
        let m = NumericMatrix::empty(Dimensions::square(2, 1), false);
        m.get(2);
    }
}

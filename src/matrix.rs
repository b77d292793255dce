//! This module defines the interface the KPM core needs from a raw Hamiltonian.
//!
//! Building the locality-optimized layout never multiplies the raw operator by a
//! vector. It only walks its sparsity structure: starting from a basis site, it must
//! enumerate the `(neighbor index, coefficient)` pairs of that site's row. The
//! [`SparseOperator`] trait captures exactly that contract, so the layout builder can
//! be written once and fed by any row-addressable storage.
//!
//! Implementations are provided for `faer`'s compressed sparse row matrices, owned
//! ([`SparseRowMat`]) and borrowed ([`SparseRowMatRef`]).
//!
//! The operator is expected to be Hermitian, which in particular makes its sparsity
//! pattern symmetric: the sites a row references are also the sites that row's site
//! propagates to under matrix-vector multiplication.

use crate::scalar::Scalar;
use faer::sparse::{SparseRowMat, SparseRowMatRef};

/// Row-wise access to a sparse linear operator.
///
/// # Example
///
/// ```
/// use faer::sparse::{SparseRowMat, Triplet};
/// use kpm_core::matrix::SparseOperator;
///
/// let triplets = [
///     Triplet { row: 0, col: 1, val: 1.0 },
///     Triplet { row: 1, col: 0, val: 1.0 },
/// ];
/// let h = SparseRowMat::<usize, f64>::try_new_from_triplets(2, 2, &triplets).unwrap();
///
/// let mut neighbors = Vec::new();
/// h.for_each_in_row(0, &mut |col, val| neighbors.push((col, val)));
/// assert_eq!(neighbors, vec![(1, 1.0)]);
/// ```
pub trait SparseOperator<T: Scalar> {
    /// Returns the number of rows of the operator.
    fn nrows(&self) -> usize;

    /// Returns the number of columns of the operator.
    fn ncols(&self) -> usize;

    /// Calls `f(col, value)` for every stored entry of row `row`.
    ///
    /// # Panics
    ///
    /// Implementations may panic if `row >= self.nrows()`.
    fn for_each_in_row(&self, row: usize, f: &mut dyn FnMut(usize, T));
}

// faer reaches `nrows`/`ncols` through `Deref`, so inside these impls those names
// resolve to the trait methods themselves. `shape` has no such clash.
impl<T: Scalar> SparseOperator<T> for SparseRowMatRef<'_, usize, T> {
    #[inline]
    fn nrows(&self) -> usize {
        (*self).shape().0
    }

    #[inline]
    fn ncols(&self) -> usize {
        (*self).shape().1
    }

    #[inline]
    fn for_each_in_row(&self, row: usize, f: &mut dyn FnMut(usize, T)) {
        let cols = (*self).col_idx_of_row_raw(row);
        let vals = (*self).val_of_row(row);
        for (&col, &val) in cols.iter().zip(vals) {
            f(col, val);
        }
    }
}

impl<T: Scalar> SparseOperator<T> for SparseRowMat<usize, T> {
    #[inline]
    fn nrows(&self) -> usize {
        self.as_ref().shape().0
    }

    #[inline]
    fn ncols(&self) -> usize {
        self.as_ref().shape().1
    }

    #[inline]
    fn for_each_in_row(&self, row: usize, f: &mut dyn FnMut(usize, T)) {
        self.as_ref().for_each_in_row(row, f)
    }
}

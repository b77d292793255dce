//! Locality-optimized, rescaled representation of the Hamiltonian.
//!
//! A sparse operator can only carry information one hop per matrix-vector product.
//! Starting from the support of the starter, `n` recursion steps therefore touch only
//! the sites within `n` hops. [`OptimizedHamiltonian::build`] exploits this twice:
//!
//! 1. A breadth-first expansion from the starter support collects every site within
//!    `max_steps` hops and renumbers them by distance. The first rows of the layout are
//!    the starter itself, then its neighbors, then theirs, and so on. Early recursion
//!    steps work on a short, cache-resident prefix that grows one layer per step.
//! 2. The reachable rows are copied into a compact `faer` [`SparseRowMat`] with the
//!    rescaling `(H - b) / a` already applied, so the recursion never touches the raw
//!    operator.
//!
//! The [`SliceMap`] records where each distance layer ends. It tells the recursion how
//! many rows can be non-zero at a given step and, for diagonal moments, how many rows
//! can still influence a later moment.

use crate::{
    error::{KpmError, KpmErrorKind},
    matrix::SparseOperator,
    scalar::Scalar,
    scale::Scale,
    starter::{Seed, Starter},
};
use faer::sparse::{SparseRowMat, SparseRowMatRef, SymbolicSparseRowMat};
use std::fmt;

/// Slack on the row-norm test that detects scale hints narrower than the spectrum.
const OUT_OF_BOUNDS_TOLERANCE: f64 = 1e-12;

/// Cumulative row counts of the distance layers of an optimized layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceMap {
    /// `ends[d]` is the number of rows at distance `<= d` from the starter support.
    ends: Vec<usize>,
}

impl SliceMap {
    /// Number of rows within `distance` hops of the starter support.
    ///
    /// Distances past the last layer return the full layout size.
    pub fn end(&self, distance: usize) -> usize {
        self.ends[distance.min(self.ends.len() - 1)]
    }

    pub fn num_layers(&self) -> usize {
        self.ends.len()
    }

    /// Distance layer of an optimized row.
    pub fn layer_of(&self, row: usize) -> usize {
        self.ends.partition_point(|&end| end <= row)
    }
}

/// Size summary of an optimized layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutStats {
    pub original_dim: usize,
    pub dim: usize,
    pub nnz: usize,
    pub layers: usize,
}

impl fmt::Display for LayoutStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} sites, {} non-zeros, {} layers",
            self.dim, self.original_dim, self.nnz, self.layers
        )
    }
}

/// Reordered, truncated and rescaled CSR copy of a Hamiltonian, built for one starter.
///
/// Immutable once built; it can be shared by reference across threads and reused by any
/// number of moment computations whose starter support lies in its first layer.
#[derive(Debug, Clone)]
pub struct OptimizedHamiltonian<T> {
    /// `H'` on the layout, rows and columns in optimized order.
    matrix: SparseRowMat<usize, T>,
    /// Optimized row -> original basis index.
    order: Vec<usize>,
    /// Original basis index -> optimized row, `None` when unreachable.
    position: Vec<Option<usize>>,
    slices: SliceMap,
    scale: Scale,
    max_steps: usize,
}

impl<T: Scalar> OptimizedHamiltonian<T> {
    /// Builds the layout of `operator` for `starter`, keeping every site within
    /// `max_steps` hops of the starter support, and applies `scale`.
    ///
    /// # Errors
    /// * `DimensionMismatch` if the operator is not square or the starter's dimension
    ///   differs from it.
    /// * `OutOfBounds` if a row of the rescaled operator has a Euclidean norm above one.
    ///   For a Hermitian operator this norm is a lower bound on the spectral radius, so
    ///   the scale provably does not contain the spectrum. Passing this check does not
    ///   prove the opposite.
    pub fn build<O>(
        operator: &O,
        starter: &Starter<T>,
        max_steps: usize,
        scale: Scale,
    ) -> Result<Self, KpmError>
    where
        O: SparseOperator<T> + ?Sized,
    {
        let n = operator.nrows();
        if operator.ncols() != n {
            return Err(KpmErrorKind::DimensionMismatch {
                expected: n,
                actual: operator.ncols(),
            }
            .into());
        }
        if starter.dim() != n {
            return Err(KpmErrorKind::DimensionMismatch {
                expected: n,
                actual: starter.dim(),
            }
            .into());
        }

        let (order, position, slices) = breadth_first_order(operator, starter, max_steps);

        let inv_a = 1.0 / scale.a();
        let shift = scale.b();
        let mut row_ptr = Vec::with_capacity(order.len() + 1);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        let mut row: Vec<(usize, T)> = Vec::new();
        row_ptr.push(0);

        for (p, &site) in order.iter().enumerate() {
            row.clear();
            let mut has_diagonal = false;
            operator.for_each_in_row(site, &mut |col, val| {
                // Entries leaving the reachable set only ever multiply zeros.
                if let Some(q) = position[col] {
                    if q == p && !has_diagonal {
                        has_diagonal = true;
                        row.push((q, val - T::from_real(shift)));
                    } else {
                        row.push((q, val));
                    }
                }
            });
            if !has_diagonal && shift != 0.0 {
                row.push((p, T::from_real(-shift)));
            }
            row.sort_unstable_by_key(|&(q, _)| q);

            let mut norm2 = 0.0;
            for &(q, val) in &row {
                let rescaled = val.scale(inv_a);
                norm2 += rescaled.abs2();
                col_idx.push(q);
                values.push(rescaled);
            }
            let norm = norm2.sqrt();
            if norm > 1.0 + OUT_OF_BOUNDS_TOLERANCE {
                return Err(KpmErrorKind::OutOfBounds { row: site, norm }.into());
            }
            row_ptr.push(col_idx.len());
        }

        // Rows are sorted and duplicate-free, as `new_checked` requires.
        let dim = order.len();
        let symbolic =
            SymbolicSparseRowMat::<usize>::new_checked(dim, dim, row_ptr, None, col_idx);
        let oh = Self {
            matrix: SparseRowMat::new(symbolic, values),
            order,
            position,
            slices,
            scale,
            max_steps,
        };
        log::debug!(
            "Optimized Hamiltonian for {max_steps} steps: {}",
            oh.stats()
        );
        Ok(oh)
    }

    /// One sparse matrix-vector product `H' x` in the optimized layout.
    ///
    /// # Panics
    /// Panics if `x.len() != self.dim()`.
    pub fn apply(&self, x: &[T]) -> Vec<T> {
        assert_eq!(
            x.len(),
            self.dim(),
            "Dimension mismatch: layout has {} rows but vector has {} entries.",
            self.dim(),
            x.len(),
        );
        (0..self.dim()).map(|p| self.row_dot(p, x)).collect()
    }

    /// Original basis index of an optimized row.
    pub fn original_index(&self, optimized_index: usize) -> usize {
        self.order[optimized_index]
    }

    /// Optimized row of an original basis index, if it is part of the layout.
    pub fn optimized_index(&self, basis_index: usize) -> Option<usize> {
        self.position.get(basis_index).copied().flatten()
    }

    /// Copies a seed into a dense vector in optimized order. Entries at sites outside the
    /// layout are dropped.
    pub fn materialize(&self, seed: &Seed<T>) -> Vec<T> {
        let mut out = vec![T::zero(); self.dim()];
        match seed {
            Seed::Site(i) => {
                if let Some(p) = self.optimized_index(*i) {
                    out[p] = T::one();
                }
            }
            Seed::Vector(v) => {
                for (p, &site) in self.order.iter().enumerate() {
                    out[p] = v[site];
                }
            }
        }
        out
    }

    /// Returns `true` if this layout can serve `starter`: same basis, and every ket is
    /// supported on the first layer.
    pub fn is_built_for(&self, starter: &Starter<T>) -> bool {
        if starter.dim() != self.original_dim() {
            return false;
        }
        let first_layer = self.slices.end(0);
        let mut ok = true;
        starter.for_each_support(|i| {
            ok &= self.optimized_index(i).is_some_and(|p| p < first_layer);
        });
        ok
    }

    /// Rows that can be non-zero after `step` products.
    pub fn reachable_size(&self, step: usize) -> usize {
        self.slices.end(step)
    }

    /// Rows that matter at `step` when computing `num_moments` diagonal moments: within
    /// `step` hops (others are zero) and within `num_moments - 1 - step` hops (others can
    /// no longer propagate back to the starter).
    pub fn optimal_size(&self, step: usize, num_moments: usize) -> usize {
        let backward = num_moments.saturating_sub(step + 1);
        self.slices.end(step.min(backward))
    }

    pub fn slice_map(&self) -> &SliceMap {
        &self.slices
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    /// Number of hops the layout was built for.
    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Number of rows in the optimized layout.
    pub fn dim(&self) -> usize {
        self.order.len()
    }

    /// Dimension of the original operator.
    pub fn original_dim(&self) -> usize {
        self.position.len()
    }

    pub fn nnz(&self) -> usize {
        self.matrix().compute_nnz()
    }

    /// The rescaled operator `H'` in optimized order, `dim() × dim()`.
    pub fn matrix(&self) -> SparseRowMatRef<'_, usize, T> {
        self.matrix.as_ref()
    }

    pub fn stats(&self) -> LayoutStats {
        LayoutStats {
            original_dim: self.original_dim(),
            dim: self.dim(),
            nnz: self.nnz(),
            layers: self.slices.num_layers(),
        }
    }

    #[inline]
    fn row_dot(&self, p: usize, x: &[T]) -> T {
        let h = self.matrix();
        h.col_idx_of_row_raw(p)
            .iter()
            .zip(h.val_of_row(p))
            .fold(T::zero(), |acc, (&q, &v)| acc + v * x[q])
    }

    /// `y = H' x` on the first `rows` rows. Returns the squared norm of those rows.
    pub(crate) fn multiply_into(&self, rows: usize, x: &[T], y: &mut [T]) -> f64 {
        let mut norm2 = 0.0;
        for (p, yp) in y[..rows].iter_mut().enumerate() {
            *yp = self.row_dot(p, x);
            norm2 += yp.abs2();
        }
        norm2
    }

    /// `y = 2 H' x - y` on the first `rows` rows. Returns the squared norm of those rows.
    pub(crate) fn recurrence_into(&self, rows: usize, x: &[T], y: &mut [T]) -> f64 {
        let mut norm2 = 0.0;
        for (p, yp) in y[..rows].iter_mut().enumerate() {
            *yp = self.row_dot(p, x).scale(2.0) - *yp;
            norm2 += yp.abs2();
        }
        norm2
    }

    /// Interleaved variant of [`Self::multiply_into`] / [`Self::recurrence_into`] for
    /// `width` vectors stored row-major (`x[p * width + k]`). Each matrix entry is loaded
    /// once for all vectors of the block. `acc` is scratch of length `width`.
    pub(crate) fn block_into(
        &self,
        rows: usize,
        width: usize,
        x: &[T],
        y: &mut [T],
        acc: &mut [T],
        first: bool,
    ) -> f64 {
        let h = self.matrix();
        let mut norm2 = 0.0;
        for p in 0..rows {
            acc.fill(T::zero());
            for (&q, &v) in h.col_idx_of_row_raw(p).iter().zip(h.val_of_row(p)) {
                let base = q * width;
                for (a, &xv) in acc.iter_mut().zip(&x[base..base + width]) {
                    *a += v * xv;
                }
            }
            for (out, &a) in y[p * width..(p + 1) * width].iter_mut().zip(acc.iter()) {
                *out = if first { a } else { a.scale(2.0) - *out };
                norm2 += out.abs2();
            }
        }
        norm2
    }
}

/// Breadth-first renumbering of the sites within `max_steps` hops of the starter support.
fn breadth_first_order<T, O>(
    operator: &O,
    starter: &Starter<T>,
    max_steps: usize,
) -> (Vec<usize>, Vec<Option<usize>>, SliceMap)
where
    T: Scalar,
    O: SparseOperator<T> + ?Sized,
{
    let mut position = vec![None; operator.nrows()];
    let mut order = Vec::new();
    starter.for_each_support(|i| {
        if position[i].is_none() {
            position[i] = Some(order.len());
            order.push(i);
        }
    });

    let mut ends = vec![order.len()];
    let mut start = 0;
    for _ in 0..max_steps {
        let end = order.len();
        for k in start..end {
            let site = order[k];
            operator.for_each_in_row(site, &mut |col, _| {
                if position[col].is_none() {
                    position[col] = Some(order.len());
                    order.push(col);
                }
            });
        }
        // Saturated: every reachable site is already numbered.
        if order.len() == end {
            break;
        }
        ends.push(order.len());
        start = end;
    }

    (order, position, SliceMap { ends })
}

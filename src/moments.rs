//! Output buffers for computed moments.
//!
//! The engine writes into a caller-owned [`MomentsRef`]: one row of `num_moments`
//! values per ket of the starter, rows in ket order. Values are in rescaled units;
//! converting back to physical units and applying a damping kernel is up to the caller.
//!
//! The engine never combines rows. For stochastic trace estimation the caller owns the
//! aggregation step, for instance through [`Moments::mean`] and
//! [`Moments::standard_error`].

use crate::scalar::Scalar;

/// Mutable view over a caller-owned moment buffer.
#[derive(Debug)]
pub struct MomentsRef<'a, T> {
    data: &'a mut [T],
}

impl<'a, T> MomentsRef<'a, T> {
    pub fn new(data: &'a mut [T]) -> Self {
        Self { data }
    }

    /// Total capacity in values.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub(crate) fn into_slice(self) -> &'a mut [T] {
        self.data
    }
}

impl<'a, T> From<&'a mut [T]> for MomentsRef<'a, T> {
    fn from(data: &'a mut [T]) -> Self {
        Self::new(data)
    }
}

impl<'a, T> From<&'a mut Vec<T>> for MomentsRef<'a, T> {
    fn from(data: &'a mut Vec<T>) -> Self {
        Self::new(data.as_mut_slice())
    }
}

/// Owned `rows × num_moments` block of moments.
#[derive(Debug, Clone, PartialEq)]
pub struct Moments<T> {
    data: Vec<T>,
    num_moments: usize,
}

impl<T: Scalar> Moments<T> {
    /// Zero-filled storage for `rows` kets of `num_moments` moments each.
    pub fn zeros(rows: usize, num_moments: usize) -> Self {
        Self {
            data: vec![T::zero(); rows * num_moments],
            num_moments,
        }
    }

    pub fn as_moments_ref(&mut self) -> MomentsRef<'_, T> {
        MomentsRef::new(&mut self.data)
    }

    pub fn num_moments(&self) -> usize {
        self.num_moments
    }

    pub fn rows(&self) -> usize {
        if self.num_moments == 0 {
            0
        } else {
            self.data.len() / self.num_moments
        }
    }

    /// Moments of ket `k`.
    pub fn row(&self, k: usize) -> &[T] {
        &self.data[k * self.num_moments..(k + 1) * self.num_moments]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[T]> {
        self.data.chunks(self.num_moments.max(1))
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Average of all rows.
    pub fn mean(&self) -> Vec<T> {
        let rows = self.rows();
        let mut mean = vec![T::zero(); self.num_moments];
        if rows == 0 {
            return mean;
        }
        for row in self.iter_rows() {
            for (m, &x) in mean.iter_mut().zip(row) {
                *m += x;
            }
        }
        let inv = 1.0 / rows as f64;
        mean.iter_mut().for_each(|m| *m = m.scale(inv));
        mean
    }

    /// Standard error of [`Self::mean`] per moment, from the sample variance of the rows.
    /// Zero when there is a single row.
    pub fn standard_error(&self) -> Vec<f64> {
        let rows = self.rows();
        if rows < 2 {
            return vec![0.0; self.num_moments];
        }
        let mean = self.mean();
        let mut variance = vec![0.0; self.num_moments];
        for row in self.iter_rows() {
            for ((v, &m), &x) in variance.iter_mut().zip(&mean).zip(row) {
                *v += (x - m).abs2();
            }
        }
        let n = rows as f64;
        variance
            .into_iter()
            .map(|v| (v / (n - 1.0) / n).sqrt())
            .collect()
    }
}

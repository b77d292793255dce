//! Chebyshev recursion machinery.
//!
//! ** NOTE: We recommend using [`crate::compute::Compute`] instead. This module is
//! intended for use cases where the individual recursion vectors are needed.
//!
//! The central piece is [`ChebyshevIteration`], a stateful iterator producing
//!
//! ```text
//! r_1 = H' r_0,    r_{n+1} = 2 H' r_n - r_{n-1}
//! ```
//!
//! on an [`OptimizedHamiltonian`]. It advances either a single vector or a block of
//! vectors stored interleaved, in which case every matrix entry is loaded once for the
//! whole block. The moment extraction built on top of it lives in [`chebyshev`].

pub mod chebyshev;

use crate::{
    config::{AlgorithmConfig, MomentVariant},
    error::{KpmError, KpmErrorKind},
    optimized::OptimizedHamiltonian,
    scalar::{Scalar, dot},
    starter::Seed,
};

/// Which rows of the layout a recursion step computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Truncation {
    /// Every row, at every step.
    Full,
    /// Rows within `n` hops of the seed support at step `n`; the others are zero.
    Reachable,
    /// Additionally drops rows more than `num_moments - 1 - n` hops away, which can no
    /// longer reach a bra supported on the first layer.
    TwoSided { num_moments: usize },
}

impl Truncation {
    pub(crate) fn for_config(config: &AlgorithmConfig) -> Self {
        if !config.optimal_size() {
            Truncation::Full
        } else if config.variant() == MomentVariant::Diagonal && !config.doubling() {
            Truncation::TwoSided {
                num_moments: config.num_moments(),
            }
        } else {
            Truncation::Reachable
        }
    }

    fn rows<T: Scalar>(self, oh: &OptimizedHamiltonian<T>, step: usize) -> usize {
        match self {
            Truncation::Full => oh.dim(),
            Truncation::Reachable => oh.reachable_size(step),
            Truncation::TwoSided { num_moments } => oh.optimal_size(step, num_moments),
        }
    }
}

/// A bra located in the optimized layout.
#[derive(Debug, Clone)]
pub(crate) enum Bra<T> {
    /// Unit vector at an optimized row; `None` when the site lies outside the layout,
    /// where every recursion vector vanishes.
    Site(Option<usize>),
    Dense(Vec<T>),
}

impl<T: Scalar> Bra<T> {
    pub(crate) fn locate(oh: &OptimizedHamiltonian<T>, seed: &Seed<T>) -> Self {
        match seed {
            Seed::Site(i) => Bra::Site(oh.optimized_index(*i)),
            Seed::Vector(_) => Bra::Dense(oh.materialize(seed)),
        }
    }

    /// `<bra, r>` for member `k` of an interleaved block of `width` vectors. Only the
    /// rows present in `r` contribute.
    pub(crate) fn dot_member(&self, r: &[T], width: usize, k: usize) -> T {
        match self {
            Bra::Site(Some(p)) => r.get(p * width + k).copied().unwrap_or_else(T::zero),
            Bra::Site(None) => T::zero(),
            Bra::Dense(v) if width == 1 => dot(v, r),
            Bra::Dense(v) => strided_dot(v, 1, 0, r, width, k),
        }
    }
}

/// `Σ_p conj(x[p * wx + kx]) * y[p * wy + ky]` over the rows present in both.
pub(crate) fn strided_dot<T: Scalar>(
    x: &[T],
    wx: usize,
    kx: usize,
    y: &[T],
    wy: usize,
    ky: usize,
) -> T {
    x.iter()
        .skip(kx)
        .step_by(wx)
        .zip(y.iter().skip(ky).step_by(wy))
        .fold(T::zero(), |acc, (&a, &b)| acc + a.conj() * b)
}

/// Rejects recursion vectors whose norm grew beyond the configured factor.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DivergenceGuard {
    initial_norm2: f64,
    limit_norm2: f64,
}

impl DivergenceGuard {
    pub(crate) fn new(threshold: f64, initial_norm2: f64) -> Self {
        Self {
            initial_norm2,
            limit_norm2: threshold * threshold * initial_norm2,
        }
    }

    /// `moment` is the index of the first moment that depends on the checked vector.
    pub(crate) fn check(&self, norm2: f64, moment: usize) -> Result<(), KpmError> {
        // Written so that NaN fails the check.
        if norm2 <= self.limit_norm2 {
            return Ok(());
        }
        let ratio = (norm2 / self.initial_norm2).sqrt();
        log::warn!("Chebyshev recursion diverged before moment {moment}: norm ratio {ratio}.");
        Err(KpmErrorKind::NumericDivergence { moment, ratio }.into())
    }
}

/// Stateful Chebyshev recursion over an [`OptimizedHamiltonian`].
///
/// After `n` calls to [`advance`](Self::advance), [`current`](Self::current) holds
/// `r_n = T_n(H') r_0` and [`previous`](Self::previous) holds `r_{n-1}`. The vectors
/// are never renormalized: with the spectrum of `H'` inside [-1, 1], their norms stay
/// bounded by the norm of `r_0`.
///
/// # Example
///
/// ```
/// use kpm_core::{
///     algorithms::ChebyshevIteration, optimized::OptimizedHamiltonian, scale::Scale,
///     starter::Starter, utils::lattice,
/// };
///
/// let h = lattice::chain(3, 1.0, false).unwrap().hamiltonian;
/// let starter = Starter::site(3, 1).unwrap();
/// let oh = OptimizedHamiltonian::build(&h, &starter, 4, Scale::new(2.0, 0.0).unwrap()).unwrap();
///
/// let mut iter = ChebyshevIteration::new(&oh, vec![1.0, 0.0, 0.0]).unwrap();
/// iter.advance();
/// iter.advance();
/// // Two neighbors at hopping 1/2: r_2 = 2 H'^2 r_0 - r_0 = (2 * 2 * 0.25 - 1) r_0.
/// assert!(iter.current()[0].abs() < 1e-15);
/// ```
#[derive(Debug, Clone)]
pub struct ChebyshevIteration<'a, T> {
    oh: &'a OptimizedHamiltonian<T>,
    r_prev: Vec<T>,
    r_curr: Vec<T>,
    /// Scratch for the interleaved kernel.
    acc: Vec<T>,
    width: usize,
    step: usize,
    prev_rows: usize,
    curr_rows: usize,
    truncation: Truncation,
}

impl<'a, T: Scalar> ChebyshevIteration<'a, T> {
    /// Starts a single-vector recursion from `r0`, given in optimized order.
    ///
    /// Every row is computed at every step, so `r0` may be any vector of the layout's
    /// dimension.
    pub fn new(oh: &'a OptimizedHamiltonian<T>, r0: Vec<T>) -> Result<Self, KpmError> {
        if r0.len() != oh.dim() {
            return Err(KpmErrorKind::DimensionMismatch {
                expected: oh.dim(),
                actual: r0.len(),
            }
            .into());
        }
        Ok(Self::block(oh, r0, 1, Truncation::Full))
    }

    /// Starts a recursion over `width` interleaved vectors (`r0[p * width + k]`). With a
    /// truncation other than `Full`, `r0` must vanish outside the first layer.
    pub(crate) fn block(
        oh: &'a OptimizedHamiltonian<T>,
        r0: Vec<T>,
        width: usize,
        truncation: Truncation,
    ) -> Self {
        debug_assert_eq!(r0.len(), oh.dim() * width);
        let rows = truncation.rows(oh, 0);
        Self {
            oh,
            r_prev: vec![T::zero(); r0.len()],
            r_curr: r0,
            acc: vec![T::zero(); width],
            width,
            step: 0,
            prev_rows: 0,
            curr_rows: rows,
            truncation,
        }
    }

    /// Computes the next vector and returns its squared norm over the computed rows.
    pub fn advance(&mut self) -> f64 {
        let next = self.step + 1;
        let rows = self.truncation.rows(self.oh, next);
        let first = next == 1;

        // The new vector overwrites r_{n-1} in place.
        let norm2 = if self.width == 1 {
            if first {
                self.oh.multiply_into(rows, &self.r_curr, &mut self.r_prev)
            } else {
                self.oh.recurrence_into(rows, &self.r_curr, &mut self.r_prev)
            }
        } else {
            self.oh.block_into(
                rows,
                self.width,
                &self.r_curr,
                &mut self.r_prev,
                &mut self.acc,
                first,
            )
        };

        std::mem::swap(&mut self.r_prev, &mut self.r_curr);
        self.prev_rows = self.curr_rows;
        self.curr_rows = rows;
        self.step = next;
        norm2
    }

    /// Index `n` of the current vector `r_n`.
    pub fn step(&self) -> usize {
        self.step
    }

    /// Number of vectors advanced together.
    pub fn width(&self) -> usize {
        self.width
    }

    /// The computed rows of `r_n`. Rows past the end are zero or do not influence the
    /// remaining moments.
    pub fn current(&self) -> &[T] {
        &self.r_curr[..self.curr_rows * self.width]
    }

    /// The computed rows of `r_{n-1}`; empty before the first step.
    pub fn previous(&self) -> &[T] {
        &self.r_prev[..self.prev_rows * self.width]
    }
}

//! Moment extraction on top of [`ChebyshevIteration`].
//!
//! A group of kets (one ket, or `batch_width` kets advanced in lockstep) is turned into
//! one row of moments per ket. Two strategies are available:
//!
//! - **plain**: `mu_n = <bra, r_n>` for every `n`, one matrix-vector product per moment.
//!   Used for both variants.
//! - **doubled**: for diagonal moments of a Hermitian operator, the identities
//!   `T_m T_n = (T_{m+n} + T_{|m-n|}) / 2` give
//!   `mu_{2n} = 2 <r_n, r_n> - mu_0` and `mu_{2n+1} = 2 <r_{n+1}, r_n> - mu_1`,
//!   so only about half the products are needed.

use super::{Bra, ChebyshevIteration, DivergenceGuard, Truncation, strided_dot};
use crate::{
    config::AlgorithmConfig,
    error::KpmError,
    optimized::OptimizedHamiltonian,
    scalar::{Scalar, norm2},
    starter::Seed,
};

/// Computes the moments of one group of kets into `out`, which holds
/// `kets.len() × num_moments` values, one row per ket.
///
/// `bras` is `None` for diagonal moments, where each ket is its own bra and the zeroth
/// moment is exactly one.
pub(crate) fn group_moments<T: Scalar>(
    oh: &OptimizedHamiltonian<T>,
    kets: &[Seed<T>],
    bras: Option<&[Seed<T>]>,
    config: &AlgorithmConfig,
    out: &mut [T],
) -> Result<(), KpmError> {
    let width = kets.len();
    let num_moments = config.num_moments();
    debug_assert_eq!(out.len(), width * num_moments);

    let dim = oh.dim();
    let mut r0 = vec![T::zero(); dim * width];
    for (k, ket) in kets.iter().enumerate() {
        for (p, v) in oh.materialize(ket).into_iter().enumerate() {
            r0[p * width + k] = v;
        }
    }
    let readouts: Vec<Bra<T>> = match bras {
        Some(bras) => bras.iter().map(|b| Bra::locate(oh, b)).collect(),
        None => kets.iter().map(|k| Bra::locate(oh, k)).collect(),
    };

    let guard = DivergenceGuard::new(config.divergence_threshold(), norm2(&r0));
    let iter = ChebyshevIteration::block(oh, r0, width, Truncation::for_config(config));

    if config.doubling() && bras.is_none() {
        doubled(iter, &readouts, guard, num_moments, out)
    } else {
        plain(iter, &readouts, bras.is_none(), guard, num_moments, out)
    }
}

fn plain<T: Scalar>(
    mut iter: ChebyshevIteration<'_, T>,
    readouts: &[Bra<T>],
    diagonal: bool,
    guard: DivergenceGuard,
    num_moments: usize,
    out: &mut [T],
) -> Result<(), KpmError> {
    let width = iter.width();
    for (k, bra) in readouts.iter().enumerate() {
        out[k * num_moments] = if diagonal {
            T::one()
        } else {
            bra.dot_member(iter.current(), width, k)
        };
    }

    for n in 1..num_moments {
        guard.check(iter.advance(), n)?;
        let r_n = iter.current();
        for (k, bra) in readouts.iter().enumerate() {
            out[k * num_moments + n] = bra.dot_member(r_n, width, k);
        }
    }
    Ok(())
}

fn doubled<T: Scalar>(
    mut iter: ChebyshevIteration<'_, T>,
    readouts: &[Bra<T>],
    guard: DivergenceGuard,
    num_moments: usize,
    out: &mut [T],
) -> Result<(), KpmError> {
    let width = iter.width();
    guard.check(iter.advance(), 1)?;
    for (k, bra) in readouts.iter().enumerate() {
        out[k * num_moments] = T::one();
        out[k * num_moments + 1] = bra.dot_member(iter.current(), width, k);
    }

    // Invariant at the top of the loop: `current` is r_n, `previous` is r_{n-1}.
    let mut n = 1;
    while 2 * n < num_moments {
        for k in 0..width {
            let r_n = iter.current();
            let row = &mut out[k * num_moments..(k + 1) * num_moments];
            row[2 * n] = strided_dot(r_n, width, k, r_n, width, k).scale(2.0) - row[0];
        }
        if 2 * n + 1 >= num_moments {
            break;
        }

        guard.check(iter.advance(), 2 * n + 1)?;
        for k in 0..width {
            let cross = strided_dot(iter.current(), width, k, iter.previous(), width, k);
            let row = &mut out[k * num_moments..(k + 1) * num_moments];
            row[2 * n + 1] = cross.scale(2.0) - row[1];
        }
        n += 1;
    }
    Ok(())
}

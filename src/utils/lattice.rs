//! This module provides generators for small tight-binding Hamiltonians.
//!
//! They are used by the demo binary, the documentation examples and the tests. Every
//! generator returns the Hamiltonian in compressed sparse row form together with bounds
//! that provably contain its spectrum, ready to be passed to
//! [`Scale::from_bounds`](crate::scale::Scale::from_bounds).

use crate::error::{KpmError, KpmErrorKind};
use faer::{
    c64,
    sparse::{SparseRowMat, Triplet},
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::f64::consts::PI;

/// A tight-binding Hamiltonian and bounds on its spectrum.
pub struct TightBinding<T = f64> {
    /// The Hamiltonian, with `-t` on every nearest-neighbor bond.
    pub hamiltonian: SparseRowMat<usize, T>,
    pub min_energy: f64,
    pub max_energy: f64,
}

/// One-dimensional chain of `n` sites with nearest-neighbor `hopping`.
///
/// The spectrum lies in `[-2|t|, 2|t|]`. A periodic chain needs at least three sites so
/// that the two bonds of every site are distinct.
pub fn chain(n: usize, hopping: f64, periodic: bool) -> Result<TightBinding, KpmError> {
    if n == 0 {
        return Err(KpmErrorKind::input("A chain needs at least one site."));
    }
    if periodic && n < 3 {
        return Err(KpmErrorKind::input(format!(
            "A periodic chain needs at least 3 sites, got {n}."
        )));
    }

    let mut triplets: Vec<Triplet<usize, usize, f64>> = Vec::with_capacity(2 * n);
    let bonds = if periodic { n } else { n - 1 };
    for i in 0..bonds {
        push_bond(&mut triplets, i, (i + 1) % n, -hopping, -hopping);
    }

    let bound = 2.0 * hopping.abs();
    Ok(TightBinding {
        hamiltonian: assemble(n, &triplets)?,
        min_energy: -bound,
        max_energy: bound,
    })
}

/// Open `nx × ny` square lattice; site `(x, y)` has index `x + nx * y`.
///
/// The spectrum lies in `[-4|t|, 4|t|]`.
pub fn square(nx: usize, ny: usize, hopping: f64) -> Result<TightBinding, KpmError> {
    let n = nx * ny;
    if n == 0 {
        return Err(KpmErrorKind::input("A lattice needs at least one site."));
    }

    let index = |x: usize, y: usize| x + nx * y;
    let mut triplets: Vec<Triplet<usize, usize, f64>> = Vec::with_capacity(4 * n);
    for y in 0..ny {
        for x in 0..nx {
            if x + 1 < nx {
                push_bond(&mut triplets, index(x, y), index(x + 1, y), -hopping, -hopping);
            }
            if y + 1 < ny {
                push_bond(&mut triplets, index(x, y), index(x, y + 1), -hopping, -hopping);
            }
        }
    }

    let bound = 4.0 * hopping.abs();
    Ok(TightBinding {
        hamiltonian: assemble(n, &triplets)?,
        min_energy: -bound,
        max_energy: bound,
    })
}

/// Open chain with on-site energies drawn uniformly from `[-W/2, W/2]` (Anderson model).
///
/// The spectrum lies in `[-(2|t| + W/2), 2|t| + W/2]`. The same `seed` always yields the
/// same potential.
pub fn anderson_chain(
    n: usize,
    hopping: f64,
    disorder: f64,
    seed: u64,
) -> Result<TightBinding, KpmError> {
    if n == 0 {
        return Err(KpmErrorKind::input("A chain needs at least one site."));
    }
    if !(disorder >= 0.0) || !disorder.is_finite() {
        return Err(KpmErrorKind::input(format!(
            "The disorder strength must be finite and non-negative, got {disorder}."
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let half = 0.5 * disorder;
    let mut triplets: Vec<Triplet<usize, usize, f64>> = Vec::with_capacity(3 * n);
    for i in 0..n {
        triplets.push(Triplet {
            row: i,
            col: i,
            val: rng.random_range(-half..=half),
        });
        if i + 1 < n {
            push_bond(&mut triplets, i, i + 1, -hopping, -hopping);
        }
    }

    let bound = 2.0 * hopping.abs() + half;
    Ok(TightBinding {
        hamiltonian: assemble(n, &triplets)?,
        min_energy: -bound,
        max_energy: bound,
    })
}

/// Periodic ring of `n` sites threaded by `flux` flux quanta.
///
/// The Peierls phase `2π flux / n` is attached to every bond, making the Hamiltonian
/// complex Hermitian. The spectrum lies in `[-2|t|, 2|t|]`.
pub fn peierls_ring(n: usize, hopping: f64, flux: f64) -> Result<TightBinding<c64>, KpmError> {
    if n < 3 {
        return Err(KpmErrorKind::input(format!(
            "A ring needs at least 3 sites, got {n}."
        )));
    }

    let phase = 2.0 * PI * flux / n as f64;
    let forward = c64::new(-hopping * phase.cos(), -hopping * phase.sin());
    let backward = c64::new(forward.re, -forward.im);

    let mut triplets: Vec<Triplet<usize, usize, c64>> = Vec::with_capacity(2 * n);
    for i in 0..n {
        push_bond(&mut triplets, (i + 1) % n, i, forward, backward);
    }

    let bound = 2.0 * hopping.abs();
    Ok(TightBinding {
        hamiltonian: assemble(n, &triplets)?,
        min_energy: -bound,
        max_energy: bound,
    })
}

/// Pushes `H[i][j] = forward` and `H[j][i] = backward`.
fn push_bond<T>(
    triplets: &mut Vec<Triplet<usize, usize, T>>,
    i: usize,
    j: usize,
    forward: T,
    backward: T,
) {
    triplets.push(Triplet {
        row: i,
        col: j,
        val: forward,
    });
    triplets.push(Triplet {
        row: j,
        col: i,
        val: backward,
    });
}

fn assemble<T>(
    n: usize,
    triplets: &[Triplet<usize, usize, T>],
) -> Result<SparseRowMat<usize, T>, KpmError>
where
    T: faer::traits::ComplexField,
{
    SparseRowMat::try_new_from_triplets(n, n, triplets)
        .map_err(|_| KpmErrorKind::input("Failed to assemble the sparse Hamiltonian."))
}

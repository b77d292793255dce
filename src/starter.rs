//! Seed vectors of the Chebyshev recursion.
//!
//! A [`Starter`] holds one or more kets, the vectors the recursion is seeded with, and
//! decides how moments are read out:
//!
//! - **Diagonal** mode uses each ket as its own bra, yielding `<r0| T_n(H) |r0>`. A unit
//!   ket at a site gives the local density of states moments; a set of random vectors
//!   gives a stochastic estimate of the trace.
//! - **Generic** mode pairs every ket `u` with an explicit bra `v`, yielding the cross
//!   moments `<v| T_n(H) |u>` needed for off-diagonal Green's functions.
//!
//! A starter is a pure descriptor. Materialization into the optimized basis ordering is
//! done by [`OptimizedHamiltonian`](crate::optimized::OptimizedHamiltonian).

use crate::{
    error::{KpmError, KpmErrorKind},
    scalar::{Scalar, norm2},
};
use rand::{SeedableRng, rngs::StdRng};

/// A single seed: a unit vector at a basis site or a dense vector in basis order.
#[derive(Debug, Clone, PartialEq)]
pub enum Seed<T> {
    Site(usize),
    Vector(Vec<T>),
}

impl<T: Scalar> Seed<T> {
    /// Calls `f` with every basis index where the seed is non-zero.
    pub fn for_each_support(&self, mut f: impl FnMut(usize)) {
        match self {
            Seed::Site(i) => f(*i),
            Seed::Vector(v) => v
                .iter()
                .enumerate()
                .filter(|(_, x)| **x != T::zero())
                .for_each(|(i, _)| f(i)),
        }
    }
}

/// How moments are extracted from the recursion vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StarterMode {
    Diagonal,
    Generic,
}

/// One or more seed vectors over a basis of dimension `dim`.
#[derive(Debug, Clone, PartialEq)]
pub struct Starter<T> {
    dim: usize,
    kets: Vec<Seed<T>>,
    /// One bra per ket in generic mode.
    bras: Option<Vec<Seed<T>>>,
}

impl<T: Scalar> Starter<T> {
    /// Diagonal starter at a single basis site.
    pub fn site(dim: usize, index: usize) -> Result<Self, KpmError> {
        Self::sites(dim, &[index])
    }

    /// Diagonal starter with one unit ket per listed site.
    pub fn sites(dim: usize, indices: &[usize]) -> Result<Self, KpmError> {
        if indices.is_empty() {
            return Err(KpmErrorKind::input("A starter needs at least one index."));
        }
        indices
            .iter()
            .try_for_each(|&index| check_index(index, dim))?;
        Ok(Self {
            dim,
            kets: indices.iter().map(|&i| Seed::Site(i)).collect(),
            bras: None,
        })
    }

    /// Diagonal starter with a single dense ket, normalized to unit norm.
    pub fn vector(v: Vec<T>) -> Result<Self, KpmError> {
        let dim = v.len();
        Self::vectors(dim, vec![v])
    }

    /// Diagonal starter with several dense kets, each normalized to unit norm so that the
    /// zeroth moment of every ket is one.
    pub fn vectors(dim: usize, vectors: Vec<Vec<T>>) -> Result<Self, KpmError> {
        if vectors.is_empty() {
            return Err(KpmErrorKind::input("A starter needs at least one vector."));
        }
        let kets = vectors
            .into_iter()
            .map(|v| normalized(dim, v).map(Seed::Vector))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            dim,
            kets,
            bras: None,
        })
    }

    /// Diagonal starter with `count` random vectors for stochastic trace estimation.
    ///
    /// Entries have unit modulus and random sign (real) or phase (complex) before
    /// normalization. The same `seed` always yields the same vectors.
    pub fn random(dim: usize, count: usize, seed: u64) -> Result<Self, KpmError> {
        if dim == 0 || count == 0 {
            return Err(KpmErrorKind::input(
                "Random starters need a non-empty basis and at least one vector.",
            ));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let norm = 1.0 / (dim as f64).sqrt();
        let kets = (0..count)
            .map(|_| {
                Seed::Vector(
                    (0..dim)
                        .map(|_| T::random_phase(&mut rng).scale(norm))
                        .collect(),
                )
            })
            .collect();
        Ok(Self {
            dim,
            kets,
            bras: None,
        })
    }

    /// Generic starter seeded at site `ket`, read out at site `bra`.
    pub fn pair(dim: usize, ket: usize, bra: usize) -> Result<Self, KpmError> {
        check_index(ket, dim)?;
        check_index(bra, dim)?;
        Ok(Self {
            dim,
            kets: vec![Seed::Site(ket)],
            bras: Some(vec![Seed::Site(bra)]),
        })
    }

    /// Generic starter with one `(ket, bra)` site pair per row of moments.
    pub fn pairs(dim: usize, pairs: &[(usize, usize)]) -> Result<Self, KpmError> {
        if pairs.is_empty() {
            return Err(KpmErrorKind::input("A starter needs at least one pair."));
        }
        for &(ket, bra) in pairs {
            check_index(ket, dim)?;
            check_index(bra, dim)?;
        }
        Ok(Self {
            dim,
            kets: pairs.iter().map(|&(k, _)| Seed::Site(k)).collect(),
            bras: Some(pairs.iter().map(|&(_, b)| Seed::Site(b)).collect()),
        })
    }

    /// Generic starter with dense vectors: moments are `<v| T_n(H) |u>`. The vectors are
    /// used as given, without normalization.
    ///
    /// # Errors
    /// `DimensionMismatch` if the lengths differ, `InputError` if `u` is zero or either
    /// vector has a non-finite entry.
    pub fn cross(u: Vec<T>, v: Vec<T>) -> Result<Self, KpmError> {
        let dim = u.len();
        if v.len() != dim {
            return Err(KpmErrorKind::DimensionMismatch {
                expected: dim,
                actual: v.len(),
            }
            .into());
        }
        let norm_u = norm2(&u);
        if norm_u == 0.0 {
            return Err(KpmErrorKind::input("The ket `u` must not be a zero vector."));
        }
        if !norm_u.is_finite() {
            return Err(KpmErrorKind::input("The ket `u` must have finite entries."));
        }
        if !norm2(&v).is_finite() {
            return Err(KpmErrorKind::input("The bra `v` must have finite entries."));
        }
        Ok(Self {
            dim,
            kets: vec![Seed::Vector(u)],
            bras: Some(vec![Seed::Vector(v)]),
        })
    }

    /// Dimension of the basis the seeds live in.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn mode(&self) -> StarterMode {
        if self.bras.is_some() {
            StarterMode::Generic
        } else {
            StarterMode::Diagonal
        }
    }

    pub fn kets(&self) -> &[Seed<T>] {
        &self.kets
    }

    /// Number of kets, which is also the number of moment rows produced.
    pub fn len(&self) -> usize {
        self.kets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kets.is_empty()
    }

    /// Explicit bras, one per ket; `None` in diagonal mode.
    pub fn bras(&self) -> Option<&[Seed<T>]> {
        self.bras.as_deref()
    }

    /// The bra paired with ket `k`: the ket itself in diagonal mode.
    pub fn bra(&self, k: usize) -> &Seed<T> {
        match &self.bras {
            Some(bras) => &bras[k],
            None => &self.kets[k],
        }
    }

    /// Calls `f` with every basis index where some ket is non-zero.
    pub fn for_each_support(&self, mut f: impl FnMut(usize)) {
        for ket in &self.kets {
            ket.for_each_support(&mut f);
        }
    }
}

fn check_index(index: usize, dim: usize) -> Result<(), KpmError> {
    if index >= dim {
        return Err(KpmErrorKind::InvalidIndex { index, dim }.into());
    }
    Ok(())
}

fn normalized<T: Scalar>(dim: usize, v: Vec<T>) -> Result<Vec<T>, KpmError> {
    if v.len() != dim {
        return Err(KpmErrorKind::DimensionMismatch {
            expected: dim,
            actual: v.len(),
        }
        .into());
    }
    let norm = norm2(&v).sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return Err(KpmErrorKind::input(
            "Starter vectors must be non-zero with finite entries.",
        ));
    }
    Ok(v.into_iter().map(|x| x.scale(1.0 / norm)).collect())
}

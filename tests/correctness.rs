//! Integration test suite to verify the mathematical correctness of the moment engine.
//!
//! # Test Methodology
//!
//! The moments produced by the engine are compared against ground truths computed
//! independently from a dense copy of the rescaled operator `H' = (H - b) / a`:
//!
//! 1.  **Spectral reference:** the dense `H'` is diagonalized with `faer`, and the moments
//!     follow from `mu_n = Σ_k |<psi_k|r_0>|² cos(n arccos E_k)`. This checks the whole
//!     pipeline (reordering, truncation, recursion) against the definition of `T_n`.
//! 2.  **Recurrence reference:** the three-term recurrence is run with dense `faer`
//!     matrix-vector products, which checks generic (off-diagonal) moments with
//!     arbitrary bras.
//!
//! Alternative execution paths (no truncation, moment doubling, batching, the parallel
//! backend) are then checked against the default path, and the documented failure modes
//! are triggered on purpose.

use anyhow::{Result, anyhow, ensure};
use faer::{Mat, Side, sparse::SparseRowMat};
use kpm_core::{
    AlgorithmConfig, Compute, DefaultCompute, KpmErrorKind, Moments, MomentsRef,
    OptimizedHamiltonian, ParallelCompute, Scale, Starter, kpm_moments, utils::lattice,
};
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Tolerance against the dense references.
///
/// The recursion accumulates one rounding error per step and per non-zero, so a few
/// hundred ulps over the tested moment counts are expected.
const DENSE_TOLERANCE: f64 = 1e-11;

/// Dense copy of `(H - b) / a`.
fn dense_rescaled(h: &SparseRowMat<usize, f64>, scale: Scale) -> Mat<f64> {
    let h = h.as_ref();
    let n = h.nrows();
    let mut dense = Mat::zeros(n, n);
    for i in 0..n {
        for (&j, &v) in h.col_idx_of_row_raw(i).iter().zip(h.val_of_row(i)) {
            dense.as_mut()[(i, j)] += v / scale.a();
        }
        dense.as_mut()[(i, i)] -= scale.b() / scale.a();
    }
    dense
}

/// Eigendecomposition of a dense rescaled operator.
struct Spectrum {
    vectors: Mat<f64>,
    energies: Vec<f64>,
}

impl Spectrum {
    fn new(h: &Mat<f64>) -> Result<Self> {
        let evd = h
            .as_ref()
            .self_adjoint_eigen(Side::Lower)
            .map_err(|e| anyhow!("EVD failed: {:?}", e))?;
        let s = evd.S();
        Ok(Self {
            vectors: evd.U().to_owned(),
            energies: (0..h.nrows()).map(|k| s[k]).collect(),
        })
    }

    /// `mu_n = Σ_k w_k T_n(E_k)` with `w_k = |<psi_k|r0>|²`.
    fn moments(&self, r0: &[f64], num_moments: usize) -> Vec<f64> {
        let u = self.vectors.as_ref();
        let mut moments = vec![0.0; num_moments];
        for (k, &energy) in self.energies.iter().enumerate() {
            let overlap: f64 = r0.iter().enumerate().map(|(i, x)| u[(i, k)] * x).sum();
            let theta = energy.clamp(-1.0, 1.0).acos();
            for (m, mu) in moments.iter_mut().enumerate() {
                *mu += overlap * overlap * (m as f64 * theta).cos();
            }
        }
        moments
    }

    /// Normalized trace moments `(1/N) Σ_k T_n(E_k)`.
    fn trace_moments(&self, num_moments: usize) -> Vec<f64> {
        let n = self.energies.len() as f64;
        (0..num_moments)
            .map(|m| {
                self.energies
                    .iter()
                    .map(|e| (m as f64 * e.clamp(-1.0, 1.0).acos()).cos())
                    .sum::<f64>()
                    / n
            })
            .collect()
    }
}

/// `mu_n = <v, T_n(h) u>` through dense matrix-vector products.
fn recurrence_moments(h: &Mat<f64>, u: &[f64], v: &[f64], num_moments: usize) -> Vec<f64> {
    let n = h.nrows();
    let dot = |r: &Mat<f64>| (0..n).map(|i| v[i] * r.as_ref()[(i, 0)]).sum::<f64>();

    let mut prev = Mat::from_fn(n, 1, |i, _| u[i]);
    let mut curr = h * &prev;
    let mut moments = vec![dot(&prev), dot(&curr)];
    while moments.len() < num_moments {
        let hr = h * &curr;
        let next = Mat::from_fn(n, 1, |i, _| {
            2.0 * hr.as_ref()[(i, 0)] - prev.as_ref()[(i, 0)]
        });
        moments.push(dot(&next));
        prev = curr;
        curr = next;
    }
    moments.truncate(num_moments);
    moments
}

fn unit(n: usize, i: usize) -> Vec<f64> {
    let mut e = vec![0.0; n];
    e[i] = 1.0;
    e
}

fn random_unit_vector(n: usize, rng: &mut StdRng) -> Vec<f64> {
    let v: Vec<f64> = (0..n).map(|_| rng.random_range(-1.0..1.0)).collect();
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    v.into_iter().map(|x| x / norm).collect()
}

fn max_deviation(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

#[test]
fn test_three_site_chain_moments() -> Result<()> {
    let chain = lattice::chain(3, 1.0, false)?;
    let scale = Scale::new(2.0, 0.0)?;

    // The middle site couples to both ends: H'^2 e_1 = e_1 / 2, so T_2 e_1 = 0.
    let middle = Starter::site(3, 1)?;
    let config = AlgorithmConfig::for_starter(&middle, 4)?;
    let moments = kpm_moments(&chain.hamiltonian, &middle, scale, &config)?;
    ensure!(
        max_deviation(moments.row(0), &[1.0, 0.0, 0.0, 0.0]) < 1e-15,
        "Middle site moments: {:?}",
        moments.row(0)
    );

    // An end site has a single neighbor: mu_2 = 2 (1/2)^2 - 1.
    let end = Starter::site(3, 0)?;
    let moments = kpm_moments(&chain.hamiltonian, &end, scale, &config)?;
    ensure!(
        max_deviation(moments.row(0), &[1.0, 0.0, -0.5, 0.0]) < 1e-15,
        "End site moments: {:?}",
        moments.row(0)
    );
    Ok(())
}

#[test]
fn test_zeroth_moment_is_exactly_one() -> Result<()> {
    let tb = lattice::anderson_chain(128, 1.0, 2.0, 5)?;
    let scale = Scale::from_bounds(tb.min_energy, tb.max_energy)?;

    for starter in [Starter::sites(128, &[0, 64, 127])?, Starter::random(128, 3, 8)?] {
        let config = AlgorithmConfig::for_starter(&starter, 16)?;
        let moments = kpm_moments(&tb.hamiltonian, &starter, scale, &config)?;
        for row in moments.iter_rows() {
            ensure!(row[0] == 1.0, "mu_0 = {} is not exactly one", row[0]);
        }
    }
    Ok(())
}

#[test]
fn test_ldos_moments_match_spectral_decomposition() -> Result<()> {
    let n = 80;
    let num_moments = 60;
    let tb = lattice::anderson_chain(n, 1.0, 3.0, 2024)?;
    let scale = Scale::from_bounds(tb.min_energy, tb.max_energy)?;
    let spectrum = Spectrum::new(&dense_rescaled(&tb.hamiltonian, scale))?;

    let sites = [3, 40, 79];
    let starter = Starter::sites(n, &sites)?;
    let config = AlgorithmConfig::for_starter(&starter, num_moments)?;
    let moments = kpm_moments(&tb.hamiltonian, &starter, scale, &config)?;

    for (k, &site) in sites.iter().enumerate() {
        let reference = spectrum.moments(&unit(n, site), num_moments);
        let deviation = max_deviation(moments.row(k), &reference);
        ensure!(
            deviation < DENSE_TOLERANCE,
            "Site {} deviates from the spectral reference by {}",
            site,
            deviation
        );
    }
    Ok(())
}

#[test]
fn test_generic_moments_match_dense_recurrence() -> Result<()> {
    let (nx, ny) = (7, 6);
    let n = nx * ny;
    let num_moments = 40;
    let tb = lattice::square(nx, ny, 1.0)?;
    let scale = Scale::from_bounds(tb.min_energy, tb.max_energy)?;
    let reference_h = dense_rescaled(&tb.hamiltonian, scale);

    // Opposite corners: the first moments vanish until the recursion crosses the lattice.
    let starter = Starter::pairs(n, &[(0, n - 1), (3, 3)])?;
    let config = AlgorithmConfig::for_starter(&starter, num_moments)?;
    let moments = kpm_moments(&tb.hamiltonian, &starter, scale, &config)?;

    for (k, (ket, bra)) in [(0, n - 1), (3, 3)].into_iter().enumerate() {
        let reference = recurrence_moments(&reference_h, &unit(n, ket), &unit(n, bra), num_moments);
        let deviation = max_deviation(moments.row(k), &reference);
        ensure!(
            deviation < DENSE_TOLERANCE,
            "Pair ({}, {}) deviates from the dense recurrence by {}",
            ket,
            bra,
            deviation
        );
    }

    // Dense vectors.
    let mut rng = StdRng::seed_from_u64(42);
    let u = random_unit_vector(n, &mut rng);
    let v = random_unit_vector(n, &mut rng);
    let starter = Starter::cross(u.clone(), v.clone())?;
    let moments = kpm_moments(&tb.hamiltonian, &starter, scale, &config)?;
    let reference = recurrence_moments(&reference_h, &u, &v, num_moments);
    let deviation = max_deviation(moments.row(0), &reference);
    ensure!(
        deviation < DENSE_TOLERANCE,
        "Dense cross moments deviate by {}",
        deviation
    );
    Ok(())
}

#[test]
fn test_moments_are_bounded() -> Result<()> {
    let tb = lattice::square(20, 20, 1.0)?;
    let scale = Scale::from_bounds(tb.min_energy, tb.max_energy)?;
    let starter = Starter::random(400, 4, 99)?;
    let config = AlgorithmConfig::for_starter(&starter, 200)?;
    let moments = kpm_moments(&tb.hamiltonian, &starter, scale, &config)?;

    let worst = moments
        .as_slice()
        .iter()
        .map(|mu| mu.abs())
        .fold(0.0, f64::max);
    ensure!(worst <= 1.0 + 1e-12, "A moment exceeds one: {}", worst);
    Ok(())
}

#[test]
fn test_generic_with_equal_vectors_matches_diagonal() -> Result<()> {
    let n = 150;
    let tb = lattice::anderson_chain(n, 1.0, 1.0, 77)?;
    let scale = Scale::from_bounds(tb.min_energy, tb.max_energy)?;
    let mut rng = StdRng::seed_from_u64(3);
    let u = random_unit_vector(n, &mut rng);

    let diagonal = Starter::vector(u.clone())?;
    let generic = Starter::cross(u.clone(), u)?;
    let diagonal_moments = kpm_moments(
        &tb.hamiltonian,
        &diagonal,
        scale,
        &AlgorithmConfig::for_starter(&diagonal, 50)?,
    )?;
    let generic_moments = kpm_moments(
        &tb.hamiltonian,
        &generic,
        scale,
        &AlgorithmConfig::for_starter(&generic, 50)?,
    )?;

    let deviation = max_deviation(diagonal_moments.row(0), generic_moments.row(0));
    ensure!(deviation < 1e-12, "Generic and diagonal differ by {}", deviation);
    Ok(())
}

#[test]
fn test_short_buffer_is_rejected_untouched() -> Result<()> {
    let tb = lattice::chain(50, 1.0, false)?;
    let starter = Starter::sites(50, &[10, 20])?;
    let config = AlgorithmConfig::for_starter(&starter, 10)?;
    let oh = OptimizedHamiltonian::build(&tb.hamiltonian, &starter, 10, Scale::new(2.5, 0.0)?)?;

    let mut out = vec![-3.0; 19];
    let result = DefaultCompute.moments(MomentsRef::from(&mut out), &starter, &config, &oh);
    let err = result.err().ok_or_else(|| anyhow!("A short buffer was accepted"))?;
    ensure!(
        matches!(err.kind(), KpmErrorKind::ConfigMismatch(_)),
        "Unexpected error: {}",
        err
    );
    ensure!(out.iter().all(|&x| x == -3.0), "The buffer was modified");
    Ok(())
}

#[test]
fn test_repeated_runs_are_bit_identical() -> Result<()> {
    let tb = lattice::anderson_chain(300, 1.0, 2.0, 1)?;
    let scale = Scale::from_bounds(tb.min_energy, tb.max_energy)?;
    let starter = Starter::random(300, 8, 12)?;
    let config = AlgorithmConfig::for_starter(&starter, 64)?.with_batch_width(2)?;
    let oh = OptimizedHamiltonian::build(&tb.hamiltonian, &starter, 64, scale)?;

    let mut first = Moments::zeros(8, 64);
    let mut second = Moments::zeros(8, 64);
    ParallelCompute.moments(first.as_moments_ref(), &starter, &config, &oh)?;
    ParallelCompute.moments(second.as_moments_ref(), &starter, &config, &oh)?;
    ensure!(first == second, "Repeated runs differ");
    Ok(())
}

/// Diagonal starter on four sites of an `n`-site chain, including both ends.
fn four_sites(n: usize) -> Result<Starter<f64>> {
    Ok(Starter::sites(n, &[0, 150, 151, n - 1])?)
}

/// Generic starter with four ket/bra pairs: one bra beyond the layout, one off-diagonal
/// pair, one diagonal pair and one pair whose bra lies deep in the layout.
fn four_pairs(n: usize) -> Result<Starter<f64>> {
    Ok(Starter::pairs(n, &[(0, n - 1), (150, 160), (151, 151), (20, 60)])?)
}

/// A macro to generate tests checking an alternative execution path against the default
/// one.
///
/// Both runs use a disordered chain and the starter built by `$starter`. `$configure`
/// maps the default configuration to the alternative, and `$backend` is the backend
/// running it.
macro_rules! generate_agreement_test {
    ($test_name:ident, $starter:expr, $configure:expr, $backend:expr, $tolerance:expr) => {
        #[test]
        fn $test_name() -> Result<()> {
            let n = 400;
            let num_moments = 90;
            let tb = lattice::anderson_chain(n, 1.0, 2.5, 31)?;
            let scale = Scale::from_bounds(tb.min_energy, tb.max_energy)?;
            let starter = $starter(n)?;
            let oh = OptimizedHamiltonian::build(&tb.hamiltonian, &starter, num_moments, scale)?;

            let base = AlgorithmConfig::for_starter(&starter, num_moments)?;
            let mut expected = Moments::zeros(starter.len(), num_moments);
            DefaultCompute.moments(expected.as_moments_ref(), &starter, &base, &oh)?;

            let alternative = $configure(base)?;
            let mut actual = Moments::zeros(starter.len(), num_moments);
            $backend.moments(actual.as_moments_ref(), &starter, &alternative, &oh)?;

            ensure!(
                expected.as_slice().iter().any(|&mu| mu != 0.0 && mu != 1.0),
                "{} produced only trivial moments",
                stringify!($test_name)
            );
            let deviation = max_deviation(expected.as_slice(), actual.as_slice());
            ensure!(
                deviation <= $tolerance,
                "{} deviates from the default path by {}",
                stringify!($test_name),
                deviation
            );
            Ok(())
        }
    };
}

// Rows dropped by the truncation are exactly zero or never read again, so the results are
// bit-identical.
generate_agreement_test!(
    test_truncation_does_not_change_moments,
    four_sites,
    |c: AlgorithmConfig| -> Result<AlgorithmConfig> { Ok(c.with_optimal_size(false)) },
    DefaultCompute,
    0.0
);

// Interleaved storage changes the summation order of nothing: every member sees the same
// sequence of operations.
generate_agreement_test!(
    test_batched_matches_single,
    four_sites,
    |c: AlgorithmConfig| -> Result<AlgorithmConfig> { Ok(c.with_batch_width(4)?) },
    DefaultCompute,
    0.0
);

generate_agreement_test!(
    test_parallel_matches_sequential,
    four_sites,
    |c: AlgorithmConfig| -> Result<AlgorithmConfig> { Ok(c.with_batch_width(2)?) },
    ParallelCompute,
    0.0
);

// Doubling reads the moments from different inner products.
generate_agreement_test!(
    test_doubling_matches_plain_recursion,
    four_sites,
    |c: AlgorithmConfig| -> Result<AlgorithmConfig> { Ok(c.with_doubling(true)?) },
    DefaultCompute,
    1e-12
);

// Generic moments read every bra through the strided readout of a block.
generate_agreement_test!(
    test_generic_truncation_does_not_change_moments,
    four_pairs,
    |c: AlgorithmConfig| -> Result<AlgorithmConfig> { Ok(c.with_optimal_size(false)) },
    DefaultCompute,
    0.0
);

generate_agreement_test!(
    test_generic_batched_matches_single,
    four_pairs,
    |c: AlgorithmConfig| -> Result<AlgorithmConfig> { Ok(c.with_batch_width(4)?) },
    DefaultCompute,
    0.0
);

generate_agreement_test!(
    test_generic_parallel_matches_sequential,
    four_pairs,
    |c: AlgorithmConfig| -> Result<AlgorithmConfig> { Ok(c.with_batch_width(2)?) },
    ParallelCompute,
    0.0
);

generate_agreement_test!(
    test_generic_parallel_without_truncation_matches_sequential,
    four_pairs,
    |c: AlgorithmConfig| -> Result<AlgorithmConfig> {
        Ok(c.with_batch_width(4)?.with_optimal_size(false))
    },
    ParallelCompute,
    0.0
);

#[test]
fn test_under_scaled_operator_diverges() -> Result<()> {
    // Spectrum [-2, 2] mapped with a = 1.5: the band edges land at ±4/3. Every row norm
    // is still below one, so the layout is accepted.
    let tb = lattice::chain(200, 1.0, false)?;
    let starter = Starter::site(200, 100)?;
    let config = AlgorithmConfig::for_starter(&starter, 200)?;
    let oh = OptimizedHamiltonian::build(&tb.hamiltonian, &starter, 200, Scale::new(1.5, 0.0)?)?;

    let mut out = vec![f64::NAN; 200];
    let result = DefaultCompute.moments(MomentsRef::from(&mut out), &starter, &config, &oh);
    let err = result.err().ok_or_else(|| anyhow!("Divergence was not detected"))?;
    let KpmErrorKind::NumericDivergence { moment, ratio } = err.kind().clone() else {
        return Err(anyhow!("Unexpected error: {}", err));
    };
    ensure!(moment > 1 && moment < 200, "Divergence reported at moment {}", moment);
    ensure!(ratio > 100.0, "Reported ratio {} is below the threshold", ratio);
    ensure!(
        out[..moment].iter().all(|mu| mu.is_finite()),
        "Moments before the divergence were not written"
    );
    Ok(())
}

#[test]
fn test_out_of_bounds_scale_is_rejected() -> Result<()> {
    let tb = lattice::square(5, 5, 1.0)?;
    let starter = Starter::site(25, 12)?;
    // The center row has four unit entries: norm 2 / 1.9 > 1.
    let result = OptimizedHamiltonian::build(&tb.hamiltonian, &starter, 10, Scale::new(1.9, 0.0)?);
    let err = result.err().ok_or_else(|| anyhow!("An under-scaled operator was accepted"))?;
    ensure!(
        matches!(err.kind(), KpmErrorKind::OutOfBounds { .. }),
        "Unexpected error: {}",
        err
    );
    Ok(())
}

#[test]
fn test_complex_path_matches_real_path() -> Result<()> {
    let n = 40;
    let num_moments = 32;
    let real = lattice::chain(n, 1.0, true)?;
    let complex = lattice::peierls_ring(n, 1.0, 0.0)?;
    let scale = Scale::from_bounds(real.min_energy, real.max_energy)?;

    let real_starter = Starter::sites(n, &[0, 7])?;
    let real_moments = kpm_moments(
        &real.hamiltonian,
        &real_starter,
        scale,
        &AlgorithmConfig::for_starter(&real_starter, num_moments)?,
    )?;

    let complex_starter = Starter::sites(n, &[0, 7])?;
    let complex_moments = kpm_moments(
        &complex.hamiltonian,
        &complex_starter,
        scale,
        &AlgorithmConfig::for_starter(&complex_starter, num_moments)?,
    )?;

    for (r, c) in real_moments.as_slice().iter().zip(complex_moments.as_slice()) {
        ensure!(
            (r - c.re).abs() < 1e-13 && c.im.abs() < 1e-13,
            "Complex moment {:?} differs from real moment {}",
            c,
            r
        );
    }

    // Diagonal moments of a Hermitian operator stay real with a non-trivial flux.
    let threaded = lattice::peierls_ring(n, 1.0, 0.3)?;
    let moments = kpm_moments(
        &threaded.hamiltonian,
        &complex_starter,
        scale,
        &AlgorithmConfig::for_starter(&complex_starter, num_moments)?,
    )?;
    let worst = moments
        .as_slice()
        .iter()
        .map(|mu| mu.im.abs())
        .fold(0.0, f64::max);
    ensure!(worst < 1e-13, "Imaginary part {} in diagonal moments", worst);
    Ok(())
}

#[test]
fn test_stochastic_trace_estimate() -> Result<()> {
    let n = 200;
    let num_moments = 24;
    let tb = lattice::anderson_chain(n, 1.0, 2.0, 8)?;
    let scale = Scale::from_bounds(tb.min_energy, tb.max_energy)?;
    let exact = Spectrum::new(&dense_rescaled(&tb.hamiltonian, scale))?.trace_moments(num_moments);

    let starter = Starter::random(n, 64, 2025)?;
    let config = AlgorithmConfig::for_starter(&starter, num_moments)?.with_batch_width(8)?;
    let moments = kpm_moments(&tb.hamiltonian, &starter, scale, &config)?;
    let mean = moments.mean();
    let errors = moments.standard_error();

    ensure!(mean[0] == 1.0 && errors[0] == 0.0, "mu_0 estimate is not exact");
    for m in 1..num_moments {
        ensure!(
            (mean[m] - exact[m]).abs() <= 6.0 * errors[m] + 1e-12,
            "Moment {}: estimate {} ± {} vs exact {}",
            m,
            mean[m],
            errors[m],
            exact[m]
        );
    }
    Ok(())
}

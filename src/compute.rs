//! This module provides the high-level entry point of the crate: computing the
//! Chebyshev moments of a starter on an [`OptimizedHamiltonian`].
//!
//! [`Compute`] is the polymorphic contract. [`DefaultCompute`] runs the batch groups of a
//! starter one after the other on the calling thread; [`ParallelCompute`] distributes them
//! over the rayon global pool. Both produce bit-identical moments.

use crate::{
    algorithms::chebyshev::group_moments,
    config::AlgorithmConfig,
    error::{KpmError, KpmErrorKind},
    matrix::SparseOperator,
    moments::{Moments, MomentsRef},
    optimized::OptimizedHamiltonian,
    scalar::Scalar,
    scale::Scale,
    starter::{Seed, Starter},
};
use rayon::prelude::*;

/// Computes Chebyshev moments into a caller-owned buffer.
pub trait Compute<T: Scalar> {
    /// Writes `starter.len() × config.num_moments()` moments into `out`, one row per ket.
    ///
    /// # Arguments
    /// * `out`: Destination buffer. Its length must be exactly the number of kets times
    ///   the number of moments.
    /// * `starter`: The seeds of the recursion.
    /// * `config`: Algorithm selection. Must match the starter (see
    ///   [`AlgorithmConfig::check_starter`]).
    /// * `oh`: Layout built for `starter` with at least `num_moments` steps.
    ///
    /// # Errors
    /// `ConfigMismatch` if any precondition fails, in which case `out` is left untouched.
    /// `NumericDivergence` if a recursion vector grows beyond the configured threshold;
    /// the moments computed before that point remain written.
    fn moments(
        &self,
        out: MomentsRef<'_, T>,
        starter: &Starter<T>,
        config: &AlgorithmConfig,
        oh: &OptimizedHamiltonian<T>,
    ) -> Result<(), KpmError>;
}

/// Sequential backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCompute;

/// Runs independent batch groups concurrently on the rayon global pool.
///
/// A starter with a single group gains nothing from this backend; split the kets into
/// several groups with [`AlgorithmConfig::with_batch_width`] to expose parallelism.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelCompute;

impl<T: Scalar> Compute<T> for DefaultCompute {
    fn moments(
        &self,
        out: MomentsRef<'_, T>,
        starter: &Starter<T>,
        config: &AlgorithmConfig,
        oh: &OptimizedHamiltonian<T>,
    ) -> Result<(), KpmError> {
        check_preconditions(out.len(), starter, config, oh)?;
        log_run("sequential", starter, config, oh);

        let width = config.batch_width();
        let group_len = width * config.num_moments();
        out.into_slice()
            .chunks_mut(group_len)
            .enumerate()
            .try_for_each(|(g, chunk)| {
                let (kets, bras) = group(starter, g, width);
                group_moments(oh, kets, bras, config, chunk)
            })
    }
}

impl<T: Scalar> Compute<T> for ParallelCompute {
    fn moments(
        &self,
        out: MomentsRef<'_, T>,
        starter: &Starter<T>,
        config: &AlgorithmConfig,
        oh: &OptimizedHamiltonian<T>,
    ) -> Result<(), KpmError> {
        check_preconditions(out.len(), starter, config, oh)?;
        log_run("parallel", starter, config, oh);

        let width = config.batch_width();
        let group_len = width * config.num_moments();
        // Collected in group order so that the reported error is the lowest group's.
        let results: Vec<Result<(), KpmError>> = out
            .into_slice()
            .par_chunks_mut(group_len)
            .enumerate()
            .map(|(g, chunk)| {
                let (kets, bras) = group(starter, g, width);
                group_moments(oh, kets, bras, config, chunk)
            })
            .collect();
        results.into_iter().collect()
    }
}

/// Builds the layout for `starter` and computes its moments with [`DefaultCompute`].
///
/// # Example
///
/// ```
/// use kpm_core::{
///     compute::kpm_moments, config::AlgorithmConfig, scale::Scale, starter::Starter,
///     utils::lattice,
/// };
///
/// let chain = lattice::chain(3, 1.0, false).unwrap();
/// let starter = Starter::site(3, 0).unwrap();
/// let config = AlgorithmConfig::for_starter(&starter, 4).unwrap();
/// let scale = Scale::new(2.0, 0.0).unwrap();
///
/// let moments = kpm_moments(&chain.hamiltonian, &starter, scale, &config).unwrap();
/// assert_eq!(moments.row(0)[0], 1.0);
/// assert!((moments.row(0)[2] + 0.5).abs() < 1e-15);
/// ```
pub fn kpm_moments<T, O>(
    operator: &O,
    starter: &Starter<T>,
    scale: Scale,
    config: &AlgorithmConfig,
) -> Result<Moments<T>, KpmError>
where
    T: Scalar,
    O: SparseOperator<T> + ?Sized,
{
    let oh = OptimizedHamiltonian::build(operator, starter, config.num_moments(), scale)?;
    let mut moments = Moments::zeros(starter.len(), config.num_moments());
    DefaultCompute.moments(moments.as_moments_ref(), starter, config, &oh)?;
    Ok(moments)
}

fn check_preconditions<T: Scalar>(
    capacity: usize,
    starter: &Starter<T>,
    config: &AlgorithmConfig,
    oh: &OptimizedHamiltonian<T>,
) -> Result<(), KpmError> {
    config.check_starter(starter)?;
    let required = starter.len() * config.num_moments();
    if capacity != required {
        return Err(KpmErrorKind::config_mismatch(format!(
            "the output buffer holds {capacity} values but {} kets of {} moments need {required}",
            starter.len(),
            config.num_moments()
        )));
    }
    if oh.max_steps() < config.num_moments() {
        return Err(KpmErrorKind::config_mismatch(format!(
            "the layout covers {} steps but {} moments were requested",
            oh.max_steps(),
            config.num_moments()
        )));
    }
    if !oh.is_built_for(starter) {
        return Err(KpmErrorKind::config_mismatch(
            "the layout was not built for this starter",
        ));
    }
    Ok(())
}

/// Kets of group `g` and, in generic mode, their bras.
fn group<T: Scalar>(
    starter: &Starter<T>,
    g: usize,
    width: usize,
) -> (&[Seed<T>], Option<&[Seed<T>]>) {
    let range = g * width..(g + 1) * width;
    (
        &starter.kets()[range.clone()],
        starter.bras().map(|bras| &bras[range]),
    )
}

fn log_run<T: Scalar>(
    backend: &str,
    starter: &Starter<T>,
    config: &AlgorithmConfig,
    oh: &OptimizedHamiltonian<T>,
) {
    log::debug!(
        "{backend} run: {} kets in groups of {}, {} {:?} moments ({:?}, optimal size {}, doubling {}) on {}",
        starter.len(),
        config.batch_width(),
        config.num_moments(),
        config.variant(),
        config.mode(),
        config.optimal_size(),
        config.doubling(),
        oh.stats()
    );
}

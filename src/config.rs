//! Algorithm selection for a moment computation.
//!
//! [`AlgorithmConfig`] is a validated value object. The checks that only need the
//! configuration itself (moment count, batch width, threshold) run when it is built; the
//! checks that relate it to a concrete starter run in [`AlgorithmConfig::check_starter`],
//! which every [`Compute`](crate::compute::Compute) implementation calls before writing
//! any output.

use crate::{
    error::{KpmError, KpmErrorKind},
    scalar::{NumericMode, Scalar},
    starter::{Starter, StarterMode},
};

/// Default bound on `||r_n|| / ||r_0||` before a run is declared divergent.
pub const DEFAULT_DIVERGENCE_THRESHOLD: f64 = 100.0;

/// Which moments the recursion extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MomentVariant {
    /// `<r0| T_n(H) |r0>`, one index per ket.
    Diagonal,
    /// `<v| T_n(H) |u>`, a bra paired with every ket.
    Generic,
}

impl From<StarterMode> for MomentVariant {
    fn from(mode: StarterMode) -> Self {
        match mode {
            StarterMode::Diagonal => MomentVariant::Diagonal,
            StarterMode::Generic => MomentVariant::Generic,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlgorithmConfig {
    num_moments: usize,
    variant: MomentVariant,
    batch_width: usize,
    mode: NumericMode,
    optimal_size: bool,
    doubling: bool,
    divergence_threshold: f64,
}

impl AlgorithmConfig {
    /// Creates a configuration computing `num_moments` moments of the given variant in
    /// the given numeric mode, one ket at a time, with layer truncation enabled.
    ///
    /// # Errors
    /// `InputError` if `num_moments < 2`.
    pub fn new(
        num_moments: usize,
        variant: MomentVariant,
        mode: NumericMode,
    ) -> Result<Self, KpmError> {
        if num_moments < 2 {
            return Err(KpmErrorKind::input(format!(
                "At least 2 moments are required, got {num_moments}."
            )));
        }
        Ok(Self {
            num_moments,
            variant,
            batch_width: 1,
            mode,
            optimal_size: true,
            doubling: false,
            divergence_threshold: DEFAULT_DIVERGENCE_THRESHOLD,
        })
    }

    /// Creates a configuration whose variant and numeric mode match `starter`.
    pub fn for_starter<T: Scalar>(
        starter: &Starter<T>,
        num_moments: usize,
    ) -> Result<Self, KpmError> {
        Self::new(num_moments, starter.mode().into(), T::MODE)
    }

    /// Advances `width` kets through the recursion in lockstep.
    ///
    /// # Errors
    /// `InputError` if `width == 0`. Divisibility of the ket count is checked against
    /// the starter by [`Self::check_starter`].
    pub fn with_batch_width(mut self, width: usize) -> Result<Self, KpmError> {
        if width == 0 {
            return Err(KpmErrorKind::input("The batch width must be at least 1."));
        }
        self.batch_width = width;
        Ok(self)
    }

    /// Restricts each step to the rows that can matter (enabled by default). Disabling it
    /// multiplies the whole layout at every step; results are the same.
    pub fn with_optimal_size(mut self, enabled: bool) -> Self {
        self.optimal_size = enabled;
        self
    }

    /// Obtains two diagonal moments per matrix-vector product from the product identity
    /// of Chebyshev polynomials. Requires a Hermitian operator.
    ///
    /// # Errors
    /// `InputError` if the variant is generic.
    pub fn with_doubling(mut self, enabled: bool) -> Result<Self, KpmError> {
        if enabled && self.variant == MomentVariant::Generic {
            return Err(KpmErrorKind::input(
                "Moment doubling only applies to diagonal moments.",
            ));
        }
        self.doubling = enabled;
        Ok(self)
    }

    /// Sets the bound on `||r_n|| / ||r_0||`.
    ///
    /// # Errors
    /// `InputError` unless `threshold > 1`.
    pub fn with_divergence_threshold(mut self, threshold: f64) -> Result<Self, KpmError> {
        if !(threshold > 1.0) {
            return Err(KpmErrorKind::input(format!(
                "The divergence threshold must be greater than 1, got {threshold}."
            )));
        }
        self.divergence_threshold = threshold;
        Ok(self)
    }

    pub fn num_moments(&self) -> usize {
        self.num_moments
    }

    pub fn variant(&self) -> MomentVariant {
        self.variant
    }

    pub fn batch_width(&self) -> usize {
        self.batch_width
    }

    pub fn mode(&self) -> NumericMode {
        self.mode
    }

    pub fn optimal_size(&self) -> bool {
        self.optimal_size
    }

    pub fn doubling(&self) -> bool {
        self.doubling
    }

    pub fn divergence_threshold(&self) -> f64 {
        self.divergence_threshold
    }

    /// Checks that this configuration can run with `starter`.
    ///
    /// # Errors
    /// `ConfigMismatch` if the numeric mode differs from the scalar type, the variant
    /// differs from the starter's mode, or the batch width does not divide the number
    /// of kets.
    pub fn check_starter<T: Scalar>(&self, starter: &Starter<T>) -> Result<(), KpmError> {
        if self.mode != T::MODE {
            return Err(KpmErrorKind::config_mismatch(format!(
                "configured for {:?} arithmetic but the starter is {:?}",
                self.mode,
                T::MODE
            )));
        }
        let starter_variant = MomentVariant::from(starter.mode());
        if self.variant != starter_variant {
            return Err(KpmErrorKind::config_mismatch(format!(
                "configured for {:?} moments but the starter is {:?}",
                self.variant, starter_variant
            )));
        }
        if starter.len() % self.batch_width != 0 {
            return Err(KpmErrorKind::config_mismatch(format!(
                "batch width {} does not divide the {} kets of the starter",
                self.batch_width,
                starter.len()
            )));
        }
        Ok(())
    }
}

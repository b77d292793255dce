//! Affine rescaling of the Hamiltonian spectrum into [-1, 1].
//!
//! Chebyshev polynomials are bounded only on [-1, 1], so the recursion runs on
//! `H' = (H - b) / a`. The pair `(a, b)` comes from an external spectral-bound
//! estimator; [`Scale::from_bounds`] turns such bounds into a safe scale by widening
//! them with a small tolerance.

use crate::error::{KpmError, KpmErrorKind};

/// Relative widening applied by [`Scale::from_bounds`].
pub const DEFAULT_TOLERANCE: f64 = 0.01;

/// Half-width `a` and center `b` of the interval the spectrum is mapped from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    a: f64,
    b: f64,
}

impl Scale {
    /// Creates a scale from an explicit half-width and shift.
    pub fn new(a: f64, b: f64) -> Result<Self, KpmError> {
        if !(a.is_finite() && a > 0.0) {
            return Err(KpmErrorKind::input(format!(
                "The scale factor `a` must be positive and finite, got {a}."
            )));
        }
        if !b.is_finite() {
            return Err(KpmErrorKind::input(format!(
                "The shift `b` must be finite, got {b}."
            )));
        }
        Ok(Self { a, b })
    }

    /// Creates a scale from spectral bounds using [`DEFAULT_TOLERANCE`].
    pub fn from_bounds(min: f64, max: f64) -> Result<Self, KpmError> {
        Self::from_bounds_with_tolerance(min, max, DEFAULT_TOLERANCE)
    }

    /// Creates a scale from spectral bounds, widening the half-width by `1 + tolerance`.
    ///
    /// A shift that is negligible relative to the half-width is snapped to zero, which
    /// keeps the rescaled operator free of artificial on-site terms.
    pub fn from_bounds_with_tolerance(
        min: f64,
        max: f64,
        tolerance: f64,
    ) -> Result<Self, KpmError> {
        if !(min.is_finite() && max.is_finite() && min < max) {
            return Err(KpmErrorKind::input(format!(
                "Spectral bounds must be finite with min < max, got [{min}, {max}]."
            )));
        }
        if !(tolerance.is_finite() && tolerance >= 0.0) {
            return Err(KpmErrorKind::input(format!(
                "The tolerance must be non-negative, got {tolerance}."
            )));
        }

        let a = 0.5 * (max - min) * (1.0 + tolerance);
        let mut b = 0.5 * (max + min);
        if (b / a).abs() < 0.01 * tolerance {
            b = 0.0;
        }
        Self::new(a, b)
    }

    pub fn a(&self) -> f64 {
        self.a
    }

    pub fn b(&self) -> f64 {
        self.b
    }

    /// Maps a physical energy into rescaled units.
    pub fn to_rescaled(&self, energy: f64) -> f64 {
        (energy - self.b) / self.a
    }

    /// Maps a rescaled energy back to physical units.
    pub fn to_physical(&self, x: f64) -> f64 {
        x * self.a + self.b
    }

    /// Returns `true` if `[min, max]` maps inside [-1, 1].
    pub fn contains(&self, min: f64, max: f64) -> bool {
        self.to_rescaled(min) >= -1.0 && self.to_rescaled(max) <= 1.0
    }
}

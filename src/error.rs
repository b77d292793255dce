//! This module defines the custom error types for the library.
//!
//! Every failure of the KPM core is reported through a single public error type,
//! [`KpmError`], wrapping a [`KpmErrorKind`] that callers can match on through
//! [`KpmError::kind`].
//!
//! The [`thiserror`] crate provides the `Display` and `Error` implementations. None of
//! these errors is retried internally: widening a scale hint or rebuilding a layout is
//! a decision left to the caller.
use thiserror::Error;

/// Represents all possible errors that can occur while building a layout or computing moments.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct KpmError(#[from] KpmErrorKind);

impl KpmError {
    /// Returns the specific kind of this error.
    pub fn kind(&self) -> &KpmErrorKind {
        &self.0
    }
}

/// The distinct kinds of errors.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum KpmErrorKind {
    /// A starter references a basis index outside the operator's basis.
    #[error("Invalid index: basis index {index} is out of range for dimension {dim}.")]
    InvalidIndex { index: usize, dim: usize },

    /// The scale hint does not contain the spectrum of the operator. Detected when a row
    /// of the rescaled operator has a Euclidean norm above one, which bounds the spectral
    /// radius from below.
    #[error(
        "Scale hint out of bounds: row {row} of the rescaled operator has norm {norm}, the spectrum exceeds [-1, 1]."
    )]
    OutOfBounds { row: usize, norm: f64 },

    /// A precondition linking the output buffer, the configuration, the starter and the
    /// optimized Hamiltonian is violated. Raised before any value is written.
    #[error("Configuration mismatch: {0}")]
    ConfigMismatch(String),

    /// The norm of a recursion vector grew beyond the configured threshold. Moments with
    /// an index below `moment` have already been written.
    #[error(
        "Numeric divergence at moment {moment}: vector norm grew by a factor of {ratio}. The scale hint is too narrow."
    )]
    NumericDivergence { moment: usize, ratio: f64 },

    /// The dimensions of two objects that must agree do not.
    #[error("Dimension mismatch: expected dimension {expected} but found {actual}.")]
    DimensionMismatch { expected: usize, actual: usize },

    /// An invalid input parameter was provided to a function.
    #[error("Invalid input parameter: {0}")]
    InputError(String),
}

impl PartialEq for KpmError {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl KpmErrorKind {
    pub(crate) fn config_mismatch(msg: impl Into<String>) -> KpmError {
        KpmError(KpmErrorKind::ConfigMismatch(msg.into()))
    }

    pub(crate) fn input(msg: impl Into<String>) -> KpmError {
        KpmError(KpmErrorKind::InputError(msg.into()))
    }
}

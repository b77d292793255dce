//! Arithmetic fields supported by the recursion.
//!
//! The real fast path runs on `f64` and the complex general path on [`faer::c64`].
//! Both paths share the same code: the field is a type parameter and is resolved at
//! compile time, while [`NumericMode`] is the runtime tag an
//! [`AlgorithmConfig`](crate::config::AlgorithmConfig) uses to state which one it expects.

use faer::c64;
use rand::Rng;
use std::{
    fmt::Debug,
    ops::{Add, AddAssign, Mul, Sub},
};

/// Tag of the arithmetic field the recursion runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericMode {
    Real,
    Complex,
}

/// Scalar type of operator entries, vectors and moments.
pub trait Scalar:
    Copy
    + Debug
    + PartialEq
    + Send
    + Sync
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + AddAssign
    + 'static
{
    /// The numeric mode this field corresponds to.
    const MODE: NumericMode;

    fn zero() -> Self;

    fn one() -> Self;

    fn from_real(x: f64) -> Self;

    /// Complex conjugate (identity on the reals).
    fn conj(self) -> Self;

    /// Squared modulus.
    fn abs2(self) -> f64;

    fn real(self) -> f64;

    /// Multiplies by a real factor.
    fn scale(self, factor: f64) -> Self;

    fn is_finite(self) -> bool;

    /// Draws a random unit-modulus value: a random sign for real fields and a uniformly
    /// distributed phase for complex ones.
    fn random_phase<R: Rng + ?Sized>(rng: &mut R) -> Self;
}

impl Scalar for f64 {
    const MODE: NumericMode = NumericMode::Real;

    #[inline]
    fn zero() -> Self {
        0.0
    }

    #[inline]
    fn one() -> Self {
        1.0
    }

    #[inline]
    fn from_real(x: f64) -> Self {
        x
    }

    #[inline]
    fn conj(self) -> Self {
        self
    }

    #[inline]
    fn abs2(self) -> f64 {
        self * self
    }

    #[inline]
    fn real(self) -> f64 {
        self
    }

    #[inline]
    fn scale(self, factor: f64) -> Self {
        self * factor
    }

    #[inline]
    fn is_finite(self) -> bool {
        f64::is_finite(self)
    }

    fn random_phase<R: Rng + ?Sized>(rng: &mut R) -> Self {
        if rng.random_bool(0.5) { 1.0 } else { -1.0 }
    }
}

impl Scalar for c64 {
    const MODE: NumericMode = NumericMode::Complex;

    #[inline]
    fn zero() -> Self {
        c64::new(0.0, 0.0)
    }

    #[inline]
    fn one() -> Self {
        c64::new(1.0, 0.0)
    }

    #[inline]
    fn from_real(x: f64) -> Self {
        c64::new(x, 0.0)
    }

    #[inline]
    fn conj(self) -> Self {
        c64::new(self.re, -self.im)
    }

    #[inline]
    fn abs2(self) -> f64 {
        self.re * self.re + self.im * self.im
    }

    #[inline]
    fn real(self) -> f64 {
        self.re
    }

    #[inline]
    fn scale(self, factor: f64) -> Self {
        c64::new(self.re * factor, self.im * factor)
    }

    #[inline]
    fn is_finite(self) -> bool {
        self.re.is_finite() && self.im.is_finite()
    }

    fn random_phase<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let phase = rng.random_range(0.0..std::f64::consts::TAU);
        c64::new(phase.cos(), phase.sin())
    }
}

/// Inner product `<x, y> = Σ conj(x_i) y_i` over the common prefix of both slices.
#[inline]
pub(crate) fn dot<T: Scalar>(x: &[T], y: &[T]) -> T {
    x.iter()
        .zip(y)
        .fold(T::zero(), |acc, (&a, &b)| acc + a.conj() * b)
}

/// Squared Euclidean norm.
#[inline]
pub(crate) fn norm2<T: Scalar>(x: &[T]) -> f64 {
    x.iter().map(|v| v.abs2()).sum()
}

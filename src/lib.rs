//! Chebyshev moments of sparse Hermitian operators for the Kernel Polynomial Method.
//!
//! This crate computes the Chebyshev moments
//!
//! ```text
//! mu_n = <v| T_n(H') |u>,    H' = (H - b) / a,
//! ```
//!
//! of a large sparse Hamiltonian `H` whose spectrum has been mapped into [-1, 1]. The
//! moments are the raw material of the Kernel Polynomial Method: after damping with a
//! kernel they expand densities of states, local densities of states and Green's
//! functions. Kernels, spectral reconstruction and physical post-processing are left to
//! the caller.
//!
//! The implementation targets operators with `10^5` to `10^7` rows and is organized
//! around three pieces:
//!
//! - **[`Starter`]**: the seed vectors of the recursion. Unit vectors at sites give local
//!   densities of states, random vectors give stochastic trace estimates, and explicit
//!   ket/bra pairs give off-diagonal moments.
//! - **[`OptimizedHamiltonian`]**: a reordered and rescaled copy of the operator. Rows are
//!   sorted by their hop distance from the starter, so that the recursion can skip rows
//!   that are provably zero or that can no longer influence the moments.
//! - **[`Compute`]**: the engine. [`DefaultCompute`] runs sequentially,
//!   [`ParallelCompute`] spreads independent groups of kets over the rayon pool.
//!
//! Operators are accessed through the [`SparseOperator`] trait, implemented for the
//! compressed sparse row matrices of [`faer`]. Real (`f64`) and complex
//! ([`faer::c64`]) arithmetic are both supported.
//!
//! ## Example Usage
//!
//! The following example computes the first moments of the local density of states at
//! the end of a short chain, and then a stochastic estimate of the full density of states
//! of a disordered chain.
//!
//! ```rust
//! use kpm_core::{
//!     AlgorithmConfig, Compute, DefaultCompute, Moments, OptimizedHamiltonian, Scale,
//!     Starter, utils::lattice,
//! };
//!
//! // Local density of states at site 0 of a three-site chain.
//! let chain = lattice::chain(3, 1.0, false).unwrap();
//! let starter = Starter::site(3, 0).unwrap();
//! let config = AlgorithmConfig::for_starter(&starter, 4).unwrap();
//! let oh = OptimizedHamiltonian::build(&chain.hamiltonian, &starter, 4, Scale::new(2.0, 0.0).unwrap())
//!     .unwrap();
//!
//! let mut moments = Moments::zeros(starter.len(), 4);
//! DefaultCompute
//!     .moments(moments.as_moments_ref(), &starter, &config, &oh)
//!     .unwrap();
//! assert_eq!(moments.row(0)[0], 1.0);
//!
//! // Trace estimate from 8 random vectors, advanced in groups of 4.
//! let disordered = lattice::anderson_chain(500, 1.0, 2.0, 42).unwrap();
//! let scale = Scale::from_bounds(disordered.min_energy, disordered.max_energy).unwrap();
//! let starter = Starter::random(500, 8, 7).unwrap();
//! let config = AlgorithmConfig::for_starter(&starter, 64)
//!     .unwrap()
//!     .with_batch_width(4)
//!     .unwrap();
//! let oh = OptimizedHamiltonian::build(&disordered.hamiltonian, &starter, 64, scale).unwrap();
//!
//! let mut moments = Moments::zeros(starter.len(), 64);
//! DefaultCompute
//!     .moments(moments.as_moments_ref(), &starter, &config, &oh)
//!     .unwrap();
//! let mean = moments.mean();
//! assert!(mean.iter().all(|mu| mu.abs() <= 1.0 + 1e-12));
//! ```
//!
//! ## Performance Characteristics
//!
//! Every step of the recursion costs one sparse matrix-vector product, fused with the
//! norm computation used to detect divergence. With a batch width `w > 1`, `w` kets are
//! stored interleaved and every matrix entry is loaded once for the whole group. Moment
//! doubling halves the number of products for diagonal moments. No allocation happens
//! inside the recursion loop.

pub mod algorithms;
pub mod compute;
pub mod config;
pub mod error;
pub mod matrix;
pub mod moments;
pub mod optimized;
pub mod scalar;
pub mod scale;
pub mod starter;
pub mod utils;

// Re-export the main API for convenient access.
pub use compute::{Compute, DefaultCompute, ParallelCompute, kpm_moments};
pub use config::{AlgorithmConfig, MomentVariant};
pub use error::{KpmError, KpmErrorKind};
pub use matrix::SparseOperator;
pub use moments::{Moments, MomentsRef};
pub use optimized::OptimizedHamiltonian;
pub use scalar::{NumericMode, Scalar};
pub use scale::Scale;
pub use starter::{Seed, Starter, StarterMode};

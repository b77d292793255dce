//! Common utilities shared by the demo binary, the documentation and the tests.
//!
//! - **`lattice`**: Generators for tight-binding Hamiltonians (chains, square lattices,
//!   disordered chains and flux-threaded rings) in compressed sparse row form, along
//!   with bounds on their spectra.

pub mod lattice;

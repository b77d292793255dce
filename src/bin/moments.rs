//! Moment Generator for Tight-Binding Lattices.
//!
//! This executable builds one of the lattices of `kpm_core::utils::lattice`, computes its
//! Chebyshev moments and writes them as CSV. With `--site` it computes the local density
//! of states moments at that site; otherwise it averages the moments of `--random` random
//! vectors, a stochastic estimate of the density of states, and reports the standard
//! error of each averaged moment.

use anyhow::{Context, Result, ensure};
use clap::{Parser, ValueEnum};
use kpm_core::{
    AlgorithmConfig, Compute, DefaultCompute, Moments, OptimizedHamiltonian, ParallelCompute,
    Scale, Starter, utils::lattice,
};
use serde::Serialize;
use std::{io, path::PathBuf, time::Instant};

/// The lattice whose Hamiltonian is expanded.
#[derive(ValueEnum, Clone, Debug, Copy)]
enum Lattice {
    /// Open chain of `size` sites.
    Chain,
    /// Open square lattice of `size × size` sites.
    Square,
    /// Open chain of `size` sites with a random on-site potential of width `disorder`.
    Anderson,
}

/// Command-line arguments for the moment generator.
#[derive(Parser, Debug)]
#[clap(
    name = "kpm-moments",
    about = "Computes Chebyshev moments of a tight-binding lattice and writes them as CSV."
)]
struct MomentsArgs {
    /// The lattice to build.
    #[clap(long, value_enum, default_value = "chain")]
    lattice: Lattice,

    /// Linear size of the lattice.
    #[clap(long, default_value_t = 1000)]
    size: usize,

    /// Nearest-neighbor hopping energy.
    #[clap(long, default_value_t = 1.0)]
    hopping: f64,

    /// Width of the random potential (Anderson lattice only).
    #[clap(long, default_value_t = 1.0)]
    disorder: f64,

    /// Seed for the random potential and the random vectors.
    #[clap(long, default_value_t = 42)]
    seed: u64,

    /// Compute the local density of states at this site instead of a trace estimate.
    #[clap(long)]
    site: Option<usize>,

    /// Number of random vectors for the trace estimate.
    #[clap(long, default_value_t = 16)]
    random: usize,

    /// Number of moments to compute.
    #[clap(long, default_value_t = 256)]
    num_moments: usize,

    /// Number of random vectors advanced together.
    #[clap(long, default_value_t = 1)]
    batch: usize,

    /// Obtain two moments per matrix-vector product.
    #[clap(long)]
    doubling: bool,

    /// Run independent groups of vectors on all cores.
    #[clap(long)]
    parallel: bool,

    /// Path to the output CSV file. Defaults to standard output.
    #[clap(long, value_name = "PATH")]
    output: Option<PathBuf>,
}

/// A single row of the output CSV.
#[derive(Debug, Serialize)]
struct MomentRecord {
    /// Index `n` of the Chebyshev moment.
    n: usize,
    /// The moment, averaged over all vectors.
    moment: f64,
    /// Standard error of the average; zero for a single vector.
    standard_error: f64,
}

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .try_init()?;
    let args = MomentsArgs::parse();
    log::info!(
        "Computing {} moments on a {:?} lattice of size {}",
        args.num_moments,
        args.lattice,
        args.size
    );

    // 1. Build the lattice and the rescaling.
    let tb = match args.lattice {
        Lattice::Chain => lattice::chain(args.size, args.hopping, false),
        Lattice::Square => lattice::square(args.size, args.size, args.hopping),
        Lattice::Anderson => {
            lattice::anderson_chain(args.size, args.hopping, args.disorder, args.seed)
        }
    }
    .context("Failed to build the lattice")?;
    let dim = tb.hamiltonian.nrows();
    let scale = Scale::from_bounds(tb.min_energy, tb.max_energy)?;
    log::info!(
        "Lattice has {} sites, scale a = {:.4}, b = {:.4}",
        dim,
        scale.a(),
        scale.b()
    );

    // 2. Seed the recursion.
    let starter = match args.site {
        Some(site) => Starter::site(dim, site)?,
        None => {
            ensure!(
                args.random % args.batch == 0,
                "--batch ({}) must divide --random ({})",
                args.batch,
                args.random
            );
            Starter::random(dim, args.random, args.seed)?
        }
    };
    let config = AlgorithmConfig::for_starter(&starter, args.num_moments)?
        .with_batch_width(if args.site.is_some() { 1 } else { args.batch })?
        .with_doubling(args.doubling)?;

    // 3. Reorder the operator and run the recursion.
    let start = Instant::now();
    let oh = OptimizedHamiltonian::build(&tb.hamiltonian, &starter, args.num_moments, scale)?;
    log::info!("Optimized layout: {}", oh.stats());

    let mut moments = Moments::zeros(starter.len(), args.num_moments);
    if args.parallel {
        ParallelCompute.moments(moments.as_moments_ref(), &starter, &config, &oh)?;
    } else {
        DefaultCompute.moments(moments.as_moments_ref(), &starter, &config, &oh)?;
    }
    log::info!("Moments computed in {:.3?}", start.elapsed());

    // 4. Write results to CSV.
    let sink: Box<dyn io::Write> = match &args.output {
        Some(path) => {
            log::info!("Writing results to {:?}...", path);
            Box::new(
                std::fs::File::create(path)
                    .with_context(|| format!("Failed to create {}", path.display()))?,
            )
        }
        None => Box::new(io::stdout().lock()),
    };
    let mut writer = csv::Writer::from_writer(sink);
    let mean = moments.mean();
    let errors = moments.standard_error();
    for (n, (&moment, &standard_error)) in mean.iter().zip(&errors).enumerate() {
        writer.serialize(MomentRecord {
            n,
            moment,
            standard_error,
        })?;
    }
    writer.flush()?;

    log::info!("Done.");
    Ok(())
}

//! Rust Ewald - periodic Coulomb energies for quantum Monte Carlo
//!
//! This crate evaluates the Coulomb energy of a periodic cell of fixed ions
//! and mobile electrons with Ewald summation. It provides total energies per
//! configuration, per-particle energies, the marginal energy of an added test
//! electron, and a sharded driver for large batches.

pub mod configs;
pub mod driver;
pub mod error;
pub mod ewald;
pub mod io;
pub mod lattice;

// Re-export commonly used types at crate root
pub use configs::ConfigurationBatch;
pub use driver::{ShardSummary, ShardedEwald};
pub use error::{EwaldError, Result};
pub use ewald::{
    ConvergenceReport, ConvergenceWarning, ElectronEwald, Ewald, EwaldConstants, EwaldEnergy,
    EwaldParams, EwaldSettings, IonEwald,
};
pub use io::{read_run_config, RunConfig};
pub use lattice::{Cell, MinimalImageDistance};

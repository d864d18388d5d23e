//! Error type shared by the whole crate.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while setting up or evaluating an Ewald sum.
///
/// Geometry problems surface at setup and are never retried. Shape problems
/// are detected before any accumulation starts, so an error never comes with
/// partial results.
#[derive(Error, Debug)]
pub enum EwaldError {
    /// A cell height is zero, negative or not finite, so α cannot be derived.
    #[error("degenerate lattice: smallest cell height is {smallest_height:.3e}")]
    DegenerateLattice { smallest_height: f64 },

    /// The lattice matrix has no inverse (zero volume).
    #[error("singular lattice: determinant is {determinant:.3e}")]
    SingularLattice { determinant: f64 },

    /// Array dimensions do not agree with each other or with the cell.
    #[error("shape mismatch for {what}: expected {expected}, found {found}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    /// Two particles sit on top of each other (r = 0 in a Coulomb term).
    #[error("coincident particles: {first} and {second} are at zero separation")]
    CoincidentParticles { first: String, second: String },

    /// A user supplied parameter is outside its valid range.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// I/O failure while reading a run description.
    #[error("I/O error at path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML input: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, EwaldError>;

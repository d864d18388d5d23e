//! YAML run descriptions.
//!
//! Example file:
//!
//! ```yaml
//! lattice:
//!   - [10.0, 0.0, 0.0]
//!   - [0.0, 10.0, 0.0]
//!   - [0.0, 0.0, 10.0]
//! ions:
//!   - { position: [0.0, 0.0, 0.0], charge: 1.0 }
//!   - { position: [0.0, 0.0, 1.5], charge: 1.0 }
//! ewald:
//!   gmax: 200
//!   nlatvec: 2
//! random:
//!   nconf: 100
//!   nelec: 2
//!   seed: 7
//! threads: 4
//! shards: 8
//! ```

use nalgebra::{Matrix3, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::configs::ConfigurationBatch;
use crate::error::{EwaldError, Result};
use crate::ewald::EwaldSettings;
use crate::lattice::Cell;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IonSpec {
    pub position: [f64; 3],
    pub charge: f64,
}

/// Uniformly random electron configurations inside the cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RandomConfigs {
    pub nconf: usize,
    pub nelec: usize,
    #[serde(default)]
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Lattice vectors, one per row (Bohr)
    pub lattice: [[f64; 3]; 3],
    #[serde(default)]
    pub ions: Vec<IonSpec>,
    #[serde(default)]
    pub ewald: EwaldSettings,
    /// Explicit electron configurations, (nconf, nelec, 3)
    #[serde(default)]
    pub electrons: Option<Vec<Vec<[f64; 3]>>>,
    #[serde(default)]
    pub random: Option<RandomConfigs>,
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Number of shards; defaults to the number of threads
    #[serde(default)]
    pub shards: Option<usize>,
}

fn default_threads() -> usize {
    1
}

impl RunConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn cell(&self) -> Result<Cell> {
        let lattice = Matrix3::from_fn(|i, j| self.lattice[i][j]);
        let coords = self.ions.iter().map(|ion| Vector3::from(ion.position)).collect();
        let charges = self.ions.iter().map(|ion| ion.charge).collect();
        Cell::new(lattice, coords, charges)
    }

    /// Electron configurations: the explicit list if present, otherwise
    /// random ones.
    pub fn configurations(&self, cell: &Cell) -> Result<ConfigurationBatch> {
        if let Some(electrons) = &self.electrons {
            let configs = electrons
                .iter()
                .map(|conf| conf.iter().map(|&r| Vector3::from(r)).collect())
                .collect();
            return ConfigurationBatch::new(configs);
        }
        match self.random {
            Some(random) => {
                let mut rng = StdRng::seed_from_u64(random.seed);
                Ok(ConfigurationBatch::random(cell, random.nconf, random.nelec, &mut rng))
            }
            None => Err(EwaldError::InvalidParameter {
                name: "electrons",
                reason: "either `electrons` or `random` must be given".to_string(),
            }),
        }
    }

    /// Worker threads, unless overridden on the command line.
    pub fn num_threads(&self, threads_override: Option<usize>) -> usize {
        threads_override.unwrap_or(self.threads)
    }

    /// Number of shards; follows the thread count when not set.
    pub fn num_shards(&self, threads_override: Option<usize>) -> usize {
        self.shards.unwrap_or_else(|| self.num_threads(threads_override))
    }
}

/// Read a run description from a YAML file.
pub fn read_run_config<P: AsRef<Path>>(path: P) -> Result<RunConfig> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|source| EwaldError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = std::io::BufReader::new(file);
    Ok(serde_yaml::from_reader(reader)?)
}

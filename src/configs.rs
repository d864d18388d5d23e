//! Batches of mobile-particle configurations.
//!
//! A batch holds `nconf` independent configurations of `nelec` particles
//! each. Configurations never interact, so a batch can be split into shards
//! and joined again without changing any result.

use nalgebra::Vector3;
use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::error::{EwaldError, Result};
use crate::lattice::Cell;

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationBatch {
    nconf: usize,
    nelec: usize,
    /// Row-major (conf, elec) storage
    positions: Vec<Vector3<f64>>,
}

impl ConfigurationBatch {
    /// Build a batch from one position list per configuration.
    ///
    /// All configurations must hold the same number of particles.
    pub fn new(configs: Vec<Vec<Vector3<f64>>>) -> Result<Self> {
        let nconf = configs.len();
        let nelec = configs.first().map_or(0, Vec::len);
        if let Some(bad) = configs.iter().find(|c| c.len() != nelec) {
            return Err(EwaldError::ShapeMismatch {
                what: "particles per configuration",
                expected: nelec,
                found: bad.len(),
            });
        }
        let positions = configs.into_iter().flatten().collect();
        Ok(Self {
            nconf,
            nelec,
            positions,
        })
    }

    /// Build a batch from a flat (nconf, nelec, ndim) array.
    pub fn from_flat(nconf: usize, nelec: usize, ndim: usize, data: &[f64]) -> Result<Self> {
        if ndim != 3 {
            return Err(EwaldError::ShapeMismatch {
                what: "spatial dimensions",
                expected: 3,
                found: ndim,
            });
        }
        if data.len() != nconf * nelec * ndim {
            return Err(EwaldError::ShapeMismatch {
                what: "flat configuration data",
                expected: nconf * nelec * ndim,
                found: data.len(),
            });
        }
        let positions = data
            .chunks_exact(3)
            .map(|c| Vector3::new(c[0], c[1], c[2]))
            .collect();
        Ok(Self {
            nconf,
            nelec,
            positions,
        })
    }

    /// Uniformly distributed particles inside the home cell.
    pub fn random<R: Rng + ?Sized>(cell: &Cell, nconf: usize, nelec: usize, rng: &mut R) -> Self {
        let dist = Uniform::new(0.0, 1.0);
        let positions = (0..nconf * nelec)
            .map(|_| {
                let frac = Vector3::new(dist.sample(rng), dist.sample(rng), dist.sample(rng));
                cell.to_cartesian(&frac)
            })
            .collect();
        Self {
            nconf,
            nelec,
            positions,
        }
    }

    pub fn nconf(&self) -> usize {
        self.nconf
    }

    pub fn nelec(&self) -> usize {
        self.nelec
    }

    /// Positions of configuration `c`.
    pub fn configuration(&self, c: usize) -> &[Vector3<f64>] {
        &self.positions[c * self.nelec..(c + 1) * self.nelec]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[Vector3<f64>]> + '_ {
        (0..self.nconf).map(move |c| self.configuration(c))
    }

    /// Move particle `e` of every configuration to the given positions.
    pub fn move_particle(&mut self, e: usize, new_positions: &[Vector3<f64>]) -> Result<()> {
        if e >= self.nelec {
            return Err(EwaldError::ShapeMismatch {
                what: "particle index bound",
                expected: self.nelec,
                found: e,
            });
        }
        self.check_per_configuration(new_positions)?;
        for (c, pos) in new_positions.iter().enumerate() {
            self.positions[c * self.nelec + e] = *pos;
        }
        Ok(())
    }

    /// Same batch with every particle shifted by `shift`.
    pub fn translated(&self, shift: &Vector3<f64>) -> Self {
        Self {
            nconf: self.nconf,
            nelec: self.nelec,
            positions: self.positions.iter().map(|r| r + shift).collect(),
        }
    }

    /// Batch with one extra particle appended to each configuration.
    pub fn with_appended(&self, extra: &[Vector3<f64>]) -> Result<Self> {
        self.check_per_configuration(extra)?;
        let configs = self
            .iter()
            .zip(extra)
            .map(|(conf, e)| conf.iter().copied().chain(std::iter::once(*e)).collect())
            .collect();
        let mut batch = Self::new(configs)?;
        batch.nelec = self.nelec + 1;
        Ok(batch)
    }

    /// Split into `n` shards of nearly equal size, the first ones taking the
    /// remainder. Shards may be empty when `n > nconf`.
    pub fn split(&self, n: usize) -> Result<Vec<Self>> {
        if n == 0 {
            return Err(EwaldError::InvalidParameter {
                name: "shards",
                reason: "at least one shard is required".to_string(),
            });
        }
        let base = self.nconf / n;
        let extra = self.nconf % n;
        let mut shards = Vec::with_capacity(n);
        let mut start = 0;
        for i in 0..n {
            let size = base + usize::from(i < extra);
            let positions =
                self.positions[start * self.nelec..(start + size) * self.nelec].to_vec();
            shards.push(Self {
                nconf: size,
                nelec: self.nelec,
                positions,
            });
            start += size;
        }
        Ok(shards)
    }

    /// Concatenate shards back into one batch, in order.
    pub fn join(shards: &[Self]) -> Result<Self> {
        let nelec = shards.first().map_or(0, |s| s.nelec);
        if let Some(bad) = shards.iter().find(|s| s.nelec != nelec) {
            return Err(EwaldError::ShapeMismatch {
                what: "particles per configuration",
                expected: nelec,
                found: bad.nelec,
            });
        }
        Ok(Self {
            nconf: shards.iter().map(|s| s.nconf).sum(),
            nelec,
            positions: shards
                .iter()
                .flat_map(|s| s.positions.iter().copied())
                .collect(),
        })
    }

    pub(crate) fn check_per_configuration(&self, values: &[Vector3<f64>]) -> Result<()> {
        if values.len() != self.nconf {
            return Err(EwaldError::ShapeMismatch {
                what: "positions per configuration",
                expected: self.nconf,
                found: values.len(),
            });
        }
        Ok(())
    }
}

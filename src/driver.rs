//! Sharded evaluation of large batches on an explicitly sized thread pool.
//!
//! Configurations are independent, so a batch is split into shards, each
//! shard is evaluated on its own, and the results are joined back in shard
//! order. The evaluator is only read, never written, during this.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::configs::ConfigurationBatch;
use crate::error::{EwaldError, Result};
use crate::ewald::{Ewald, EwaldEnergy};

/// Mean energies of one shard, weighted by its number of configurations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShardSummary {
    pub weight: f64,
    pub ee: f64,
    pub ei: f64,
    pub ii: f64,
}

impl ShardSummary {
    pub fn from_energy(energy: &EwaldEnergy) -> Self {
        let n = energy.nconf();
        let mean = |v: f64| if n == 0 { 0.0 } else { v / n as f64 };
        Self {
            weight: n as f64,
            ee: mean(energy.ee.sum()),
            ei: mean(energy.ei.sum()),
            ii: energy.ii,
        }
    }

    pub fn total(&self) -> f64 {
        self.ee + self.ei + self.ii
    }

    /// Weighted arithmetic mean of shard summaries.
    ///
    /// Returns `None` when the total weight is zero.
    pub fn merge(parts: &[ShardSummary]) -> Option<ShardSummary> {
        let weight: f64 = parts.iter().map(|p| p.weight).sum();
        if weight <= 0.0 {
            return None;
        }
        let avg = |f: fn(&ShardSummary) -> f64| {
            parts.iter().map(|p| p.weight * f(p)).sum::<f64>() / weight
        };
        Some(ShardSummary {
            weight,
            ee: avg(|p| p.ee),
            ei: avg(|p| p.ei),
            ii: avg(|p| p.ii),
        })
    }
}

pub struct ShardedEwald<'a> {
    ewald: &'a Ewald,
    pool: ThreadPool,
}

impl<'a> ShardedEwald<'a> {
    /// Driver with its own pool of `threads` worker threads.
    pub fn new(ewald: &'a Ewald, threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(EwaldError::InvalidParameter {
                name: "threads",
                reason: "at least one thread is required".to_string(),
            });
        }
        let pool = ThreadPoolBuilder::new().num_threads(threads).build()?;
        log::info!("Sharded Ewald driver using {} threads", threads);
        Ok(Self { ewald, pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Energies of each shard, in shard order.
    pub fn evaluate_shards(
        &self,
        configs: &ConfigurationBatch,
        nshards: usize,
    ) -> Result<Vec<EwaldEnergy>> {
        let shards = configs.split(nshards)?;
        log::debug!(
            "Evaluating {} configurations in {} shards",
            configs.nconf(),
            shards.len()
        );
        self.pool
            .install(|| shards.par_iter().map(|s| self.ewald.energy(s)).collect())
    }

    /// Energy of the whole batch, evaluated shard by shard.
    pub fn energy(&self, configs: &ConfigurationBatch, nshards: usize) -> Result<EwaldEnergy> {
        let parts = self.evaluate_shards(configs, nshards)?;
        EwaldEnergy::concat(&parts)
    }

    /// Per-shard mean energies.
    pub fn summaries(
        &self,
        configs: &ConfigurationBatch,
        nshards: usize,
    ) -> Result<Vec<ShardSummary>> {
        let parts = self.evaluate_shards(configs, nshards)?;
        Ok(parts.iter().map(ShardSummary::from_energy).collect())
    }
}

//! Energy of one additional electron against an existing batch, used to
//! accept or reject single-particle moves without a full re-evaluation.

use nalgebra::{DMatrix, Vector3};

use super::{check_separation, plane_wave, Ewald};
use crate::configs::ConfigurationBatch;
use crate::error::Result;

impl Ewald {
    /// Coulomb energy between a test electron and each configuration.
    ///
    /// `epos` holds one test position per configuration. The result has shape
    /// (nconf, nelec + 1): column j < nelec is the full (not halved) pair
    /// energy between the test electron and electron j; the last column is
    /// the interaction with all ions plus the test particle's self and
    /// background constant. A row sums to E(configs + test) - E(configs).
    pub fn energy_with_test_pos(
        &self,
        configs: &ConfigurationBatch,
        epos: &[Vector3<f64>],
    ) -> Result<DMatrix<f64>> {
        configs.check_per_configuration(epos)?;
        let nconf = configs.nconf();
        let nelec = configs.nelec();

        let ion_coords = self.cell.ion_coords();
        let ion_charges = self.cell.ion_charges();
        let gpoints = self.params.gpoints();
        let gweights = self.params.gweights();

        let mut vtest = DMatrix::from_element(nconf, nelec + 1, self.constants.c_pair);
        for (c, (conf, t)) in configs.iter().zip(epos).enumerate() {
            vtest[(c, nelec)] = self.constants.test_particle();

            // Real space, electron-ion
            let to_ions = self.dist.dist_i(ion_coords, t);
            for (big_i, (d, z)) in to_ions.iter().zip(ion_charges).enumerate() {
                check_separation(
                    d,
                    || format!("test electron of configuration {}", c),
                    || format!("ion {}", big_i),
                )?;
                vtest[(c, nelec)] -= z * self.params.screened_image_sum(d);
            }

            // Real space, electron-electron
            for (j, d) in self.dist.dist_i(conf, t).iter().enumerate() {
                check_separation(
                    d,
                    || format!("test electron of configuration {}", c),
                    || format!("electron {}", j),
                )?;
                vtest[(c, j)] += self.params.screened_image_sum(d);
            }

            // Reciprocal space. The new particle's own |e_t|² = 1 term goes
            // into the ion column as the +½ inside the doubled sum.
            for ((g, &w), s_ion) in gpoints.iter().zip(gweights).zip(&self.ion.structure_factor) {
                let e_t = plane_wave(g, t);
                for (j, x) in conf.iter().enumerate() {
                    vtest[(c, j)] += 2.0 * w * (e_t.conj() * plane_wave(g, x)).re;
                }
                vtest[(c, nelec)] += 2.0 * w * ((-s_ion.conj() * e_t).re + 0.5);
            }
        }
        Ok(vtest)
    }
}

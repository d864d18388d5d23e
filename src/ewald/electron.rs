//! Electron-electron and electron-ion sums for a batch of configurations.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

use super::{check_separation, plane_wave, Ewald};
use crate::configs::ConfigurationBatch;
use crate::error::{EwaldError, Result};

/// Raw electron sums of one batch, before the constant terms are added.
///
/// Vectors have one entry per configuration. `separated` holds each
/// particle's share of the real and reciprocal sums; its reciprocal ee part
/// carries the -½ W(G) bookkeeping described on [`Ewald::ewald_electron`].
#[derive(Debug, Clone)]
pub struct ElectronEwald {
    pub ee_real: DVector<f64>,
    pub ee_reciprocal: DVector<f64>,
    pub ei_real: DVector<f64>,
    pub ei_reciprocal: DVector<f64>,
    pub separated: DMatrix<f64>,
}

/// Coulomb energy of a batch, split into its three contributions.
#[derive(Debug, Clone)]
pub struct EwaldEnergy {
    /// Electron-electron energy per configuration
    pub ee: DVector<f64>,
    /// Electron-ion energy per configuration
    pub ei: DVector<f64>,
    /// Ion-ion energy (the same for every configuration)
    pub ii: f64,
    separated: DMatrix<f64>,
    particle_offset: f64,
}

impl EwaldEnergy {
    pub fn nconf(&self) -> usize {
        self.ee.len()
    }

    /// ee + ei + ii per configuration.
    pub fn total(&self) -> DVector<f64> {
        (&self.ee + &self.ei).add_scalar(self.ii)
    }

    /// Per-particle Coulomb energies, (nconf, nelec).
    ///
    /// Each pair interaction is shared equally by its two particles and each
    /// electron-ion interaction is assigned to the electron, so every row sums
    /// to the ee + ei energy of its configuration.
    pub fn energy_separated(&self) -> DMatrix<f64> {
        self.separated.add_scalar(self.particle_offset)
    }

    /// Concatenate results of consecutive shards of one batch.
    pub fn concat(parts: &[EwaldEnergy]) -> Result<Self> {
        let first = parts.first().ok_or(EwaldError::ShapeMismatch {
            what: "energy shards",
            expected: 1,
            found: 0,
        })?;
        let ncols = first.separated.ncols();
        if let Some(bad) = parts.iter().find(|p| p.separated.ncols() != ncols) {
            return Err(EwaldError::ShapeMismatch {
                what: "particles per configuration",
                expected: ncols,
                found: bad.separated.ncols(),
            });
        }

        let nconf: usize = parts.iter().map(EwaldEnergy::nconf).sum();
        let mut separated = DMatrix::zeros(nconf, ncols);
        let mut row = 0;
        for part in parts.iter().filter(|p| p.nconf() > 0) {
            separated
                .rows_mut(row, part.nconf())
                .copy_from(&part.separated);
            row += part.nconf();
        }

        Ok(Self {
            ee: DVector::from_iterator(nconf, parts.iter().flat_map(|p| p.ee.iter().copied())),
            ei: DVector::from_iterator(nconf, parts.iter().flat_map(|p| p.ei.iter().copied())),
            ii: first.ii,
            separated,
            particle_offset: first.particle_offset,
        })
    }
}

impl Ewald {
    /// Real and reciprocal electron sums for every configuration of a batch.
    ///
    /// Real space, with r the image-shifted minimum image distance:
    /// - ei: Σ_I Σₙ -Z_I erfc(αr)/r, assigned to the electron
    /// - ee: Σ_{i<j} Σₙ erfc(αr)/r, half to each particle of the pair
    ///
    /// Reciprocal space, with eᵢ = exp(-iG·xᵢ) and S_e = Σᵢ eᵢ:
    /// - ee: particle i gets Σ_G W(G) [Re(S_e* eᵢ) - ½]. Summed over i this is
    ///   Σ_G W |S_e|² minus Ne/2 Σ_G W; the missing half of every particle's
    ///   self term is added back to the total.
    /// - ei: particle i gets 2 Σ_G W(G) Re(-S_ion* eᵢ), the factor 2 accounting
    ///   for the -G half of the sum.
    pub fn ewald_electron(&self, configs: &ConfigurationBatch) -> Result<ElectronEwald> {
        let nconf = configs.nconf();
        let nelec = configs.nelec();
        log::debug!("Ewald electron sums for {} configurations of {} electrons", nconf, nelec);

        let ion_coords = self.cell.ion_coords();
        let ion_charges = self.cell.ion_charges();
        let gpoints = self.params.gpoints();
        let gweights = self.params.gweights();

        let mut out = ElectronEwald {
            ee_real: DVector::zeros(nconf),
            ee_reciprocal: DVector::zeros(nconf),
            ei_real: DVector::zeros(nconf),
            ei_reciprocal: DVector::zeros(nconf),
            separated: DMatrix::zeros(nconf, nelec),
        };
        let mut phases = vec![Complex64::new(0.0, 0.0); nelec];

        for (c, conf) in configs.iter().enumerate() {
            // === Real space, electron-ion ===
            for (i, x) in conf.iter().enumerate() {
                let to_ions = self.dist.dist_i(ion_coords, x);
                for (big_i, (d, z)) in to_ions.iter().zip(ion_charges).enumerate() {
                    check_separation(
                        d,
                        || format!("electron {} of configuration {}", i, c),
                        || format!("ion {}", big_i),
                    )?;
                    let v = -z * self.params.screened_image_sum(d);
                    out.separated[(c, i)] += v;
                    out.ei_real[c] += v;
                }
            }

            // === Real space, electron-electron ===
            if nelec > 1 {
                for ((i, j), d) in self.dist.dist_matrix(conf) {
                    check_separation(
                        &d,
                        || format!("electron {} of configuration {}", i, c),
                        || format!("electron {}", j),
                    )?;
                    let v = self.params.screened_image_sum(&d);
                    out.separated[(c, i)] += 0.5 * v;
                    out.separated[(c, j)] += 0.5 * v;
                    out.ee_real[c] += v;
                }
            }

            // === Reciprocal space ===
            for ((g, &w), s_ion) in gpoints.iter().zip(gweights).zip(&self.ion.structure_factor) {
                for (p, x) in phases.iter_mut().zip(conf) {
                    *p = plane_wave(g, x);
                }
                let s_e: Complex64 = phases.iter().sum();
                for (i, p) in phases.iter().enumerate() {
                    let ee = w * ((s_e.conj() * p).re - 0.5);
                    let ei = 2.0 * w * (-s_ion.conj() * p).re;
                    out.separated[(c, i)] += ee + ei;
                    out.ee_reciprocal[c] += ee;
                    out.ei_reciprocal[c] += ei;
                }
            }
            out.ee_reciprocal[c] += nelec as f64 / 2.0 * self.params.weight_sum();
        }
        Ok(out)
    }

    /// Coulomb energy of a batch: ee and ei per configuration plus ii.
    pub fn energy(&self, configs: &ConfigurationBatch) -> Result<EwaldEnergy> {
        let nelec = configs.nelec();
        let sums = self.ewald_electron(configs)?;
        let ee = (&sums.ee_real + &sums.ee_reciprocal)
            .add_scalar(self.constants.electron_electron(nelec));
        let ei = (&sums.ei_real + &sums.ei_reciprocal)
            .add_scalar(self.constants.electron_ion(nelec));
        Ok(EwaldEnergy {
            ee,
            ei,
            ii: self.ion_ion(),
            separated: sums.separated,
            particle_offset: self.constants.single_particle_share(nelec)
                + 0.5 * self.params.weight_sum(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ewald::EwaldSettings;
    use crate::lattice::Cell;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix3, Vector3};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const SC_MADELUNG: f64 = 2.837297479;

    fn hydrogen_pair() -> Ewald {
        let cell = Cell::cubic(
            6.0,
            vec![Vector3::new(1.0, 1.0, 1.0), Vector3::new(3.5, 2.0, 4.0)],
            vec![1.0, 1.0],
        )
        .unwrap();
        Ewald::new(cell, EwaldSettings::default()).unwrap()
    }

    fn random_batch(ewald: &Ewald, nconf: usize, nelec: usize, seed: u64) -> ConfigurationBatch {
        let mut rng = StdRng::seed_from_u64(seed);
        ConfigurationBatch::random(ewald.cell(), nconf, nelec, &mut rng)
    }

    #[test]
    fn test_per_particle_rows_sum_to_total() {
        let ewald = hydrogen_pair();
        for nelec in 0..4 {
            let configs = random_batch(&ewald, 3, nelec, 42 + nelec as u64);
            let energy = ewald.energy(&configs).unwrap();
            let separated = energy.energy_separated();
            assert_eq!(separated.shape(), (3, nelec));
            for c in 0..3 {
                let row_sum: f64 = separated.row(c).iter().sum();
                assert_relative_eq!(row_sum, energy.ee[c] + energy.ei[c], epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_single_electron_has_no_pair_term() {
        let a = 4.0;
        let cell = Cell::cubic(a, vec![], vec![]).unwrap();
        let ewald = Ewald::new(cell, EwaldSettings::default()).unwrap();
        let configs = ConfigurationBatch::new(vec![
            vec![Vector3::new(0.3, 1.2, 2.2)],
            vec![Vector3::new(3.9, 0.1, 1.0)],
        ])
        .unwrap();

        let sums = ewald.ewald_electron(&configs).unwrap();
        let energy = ewald.energy(&configs).unwrap();
        for c in 0..2 {
            assert_eq!(sums.ee_real[c], 0.0);
            // Only the particle's interaction with its own images remains
            assert_relative_eq!(
                sums.ee_reciprocal[c],
                ewald.params().weight_sum(),
                epsilon = 1e-12
            );
            assert_relative_eq!(energy.ee[c], -SC_MADELUNG / (2.0 * a), epsilon = 1e-7);
        }
    }

    #[test]
    fn test_electron_ion_pair_matches_ion_ion() {
        // An electron on the site of a removed ion sees the remaining ion as
        // the ion-ion sum sees the pair, with the sign of the charge flipped.
        let ion_a = Vector3::new(0.5, 0.5, 0.5);
        let ion_b = Vector3::new(2.0, 3.0, 1.0);
        let both = Cell::cubic(5.0, vec![ion_a, ion_b], vec![1.0, 1.0]).unwrap();
        let one = Cell::cubic(5.0, vec![ion_b], vec![1.0]).unwrap();

        let ii = Ewald::new(both, EwaldSettings::default()).unwrap();
        let ei = Ewald::new(one, EwaldSettings::default()).unwrap();
        let configs = ConfigurationBatch::new(vec![vec![ion_a]]).unwrap();
        let sums = ei.ewald_electron(&configs).unwrap();

        assert_relative_eq!(sums.ei_real[0], -ii.ion().real, epsilon = 1e-12);
        let pair_reciprocal = ii.ion().reciprocal - 2.0 * ii.params().weight_sum();
        assert_relative_eq!(sums.ei_reciprocal[0], -pair_reciprocal, epsilon = 1e-10);
    }

    #[test]
    fn test_translation_invariance() {
        let ewald = hydrogen_pair();
        let configs = random_batch(&ewald, 4, 3, 7);
        let base = ewald.energy(&configs).unwrap();

        // Arbitrary shift: only the electron-electron part is invariant
        let shifted = ewald
            .energy(&configs.translated(&Vector3::new(0.37, -1.1, 2.9)))
            .unwrap();
        // Lattice vector shift: everything is invariant
        let lattice_shift = ewald.cell().lattice_vector(1) * 2.0 - ewald.cell().lattice_vector(2);
        let periodic = ewald.energy(&configs.translated(&lattice_shift)).unwrap();

        for c in 0..4 {
            assert_relative_eq!(shifted.ee[c], base.ee[c], epsilon = 1e-9);
            assert_relative_eq!(
                periodic.ee[c] + periodic.ei[c],
                base.ee[c] + base.ei[c],
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn test_skewed_cell_translation_invariance() {
        #[rustfmt::skip]
        let lattice = Matrix3::new(
            4.0, 0.0, 0.0,
            1.0, 4.0, 0.0,
            0.5, 0.5, 4.0,
        );
        let cell = Cell::new(lattice, vec![Vector3::new(1.0, 1.0, 1.0)], vec![2.0]).unwrap();
        let ewald = Ewald::new(cell, EwaldSettings::default()).unwrap();
        let configs = random_batch(&ewald, 2, 2, 3);
        let base = ewald.energy(&configs).unwrap();
        let periodic = ewald
            .energy(&configs.translated(&ewald.cell().lattice_vector(0)))
            .unwrap();
        for c in 0..2 {
            assert_relative_eq!(periodic.total()[c], base.total()[c], epsilon = 1e-9);
        }
    }

    #[test]
    fn test_electron_on_ion_is_an_error() {
        let ewald = hydrogen_pair();
        let configs = ConfigurationBatch::new(vec![vec![Vector3::new(7.0, 1.0, 1.0)]]).unwrap();
        let err = ewald.energy(&configs).unwrap_err();
        assert!(matches!(err, EwaldError::CoincidentParticles { .. }));
    }

    #[test]
    fn test_coincident_electrons_are_an_error() {
        let ewald = hydrogen_pair();
        let x = Vector3::new(2.0, 4.0, 5.0);
        // Second electron sits on a periodic image of the first
        let configs = ConfigurationBatch::new(vec![
            vec![Vector3::new(0.5, 0.5, 3.0), Vector3::new(5.0, 5.0, 5.0)],
            vec![x, x + Vector3::new(0.0, -6.0, 0.0)],
        ])
        .unwrap();
        let err = ewald.energy(&configs).unwrap_err();
        assert!(matches!(
            err,
            EwaldError::CoincidentParticles { ref first, ref second }
                if first == "electron 0 of configuration 1" && second == "electron 1"
        ));
    }

    #[test]
    fn test_concat_matches_whole_batch() {
        let ewald = hydrogen_pair();
        let configs = random_batch(&ewald, 5, 2, 99);
        let whole = ewald.energy(&configs).unwrap();
        let parts: Vec<EwaldEnergy> = configs
            .split(2)
            .unwrap()
            .iter()
            .map(|s| ewald.energy(s).unwrap())
            .collect();
        let joined = EwaldEnergy::concat(&parts).unwrap();
        assert_eq!(joined.ee, whole.ee);
        assert_eq!(joined.ei, whole.ei);
        assert_eq!(joined.energy_separated(), whole.energy_separated());
        assert!(EwaldEnergy::concat(&[]).is_err());
    }
}

//! Ion-ion lattice sum. Ions never move, so this runs once per cell.

use num_complex::Complex64;

use super::params::EwaldParams;
use super::{check_separation, plane_wave};
use crate::error::Result;
use crate::lattice::{Cell, MinimalImageDistance};

/// Fixed-charge part of the Ewald sum, without the constant terms.
#[derive(Debug, Clone)]
pub struct IonEwald {
    /// Σ_{I<J} Σₙ Z_I Z_J erfc(α r) / r
    pub real: f64,
    /// Σ_G W(G) |S(G)|²
    pub reciprocal: f64,
    /// S(G) = Σ_I Z_I exp(-i G·x_I), one entry per reciprocal vector
    pub structure_factor: Vec<Complex64>,
}

impl IonEwald {
    pub fn new(cell: &Cell, dist: &MinimalImageDistance, params: &EwaldParams) -> Result<Self> {
        let coords = cell.ion_coords();
        let charges = cell.ion_charges();

        // A single ion has no partner; its own images are a constant that is
        // left out, as it is for the electrons.
        let mut real = 0.0;
        if coords.len() > 1 {
            for ((i, j), d) in dist.dist_matrix(coords) {
                check_separation(&d, || format!("ion {}", i), || format!("ion {}", j))?;
                real += charges[i] * charges[j] * params.screened_image_sum(&d);
            }
        }

        let structure_factor: Vec<Complex64> = params
            .gpoints()
            .iter()
            .map(|g| {
                coords
                    .iter()
                    .zip(charges)
                    .map(|(x, &z)| z * plane_wave(g, x))
                    .sum::<Complex64>()
            })
            .collect();

        // |S|² is real by construction, so no imaginary residue survives here
        let reciprocal: f64 = params
            .gweights()
            .iter()
            .zip(&structure_factor)
            .map(|(w, s)| w * s.norm_sqr())
            .sum();

        Ok(Self {
            real,
            reciprocal,
            structure_factor,
        })
    }

    pub fn total(&self) -> f64 {
        self.real + self.reciprocal
    }
}

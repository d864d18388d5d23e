//! Ewald summation for a periodic cell of fixed ions and mobile electrons.
//!
//! The Coulomb energy of a periodic system is split into a short-ranged real
//! space sum, a long-ranged reciprocal space sum, the self energy and the
//! energy of the neutralizing background:
//!
//! E = E_real + E_recip + E_self + E_charged
//!
//! Each part is further separated into electron-electron (ee),
//! electron-ion (ei) and ion-ion (ii) contributions. Ions do not move, so the
//! ion-ion part is computed once when the evaluator is built.
//!
//! Reciprocal sums run over one half-space of G vectors; the weight
//! W(G) = 4π/(V|G|²) exp(-|G|²/4α²) absorbs the factor ½ of the full sum.

mod constants;
mod electron;
mod ion;
mod params;
mod test_pos;

pub use constants::EwaldConstants;
pub use electron::{ElectronEwald, EwaldEnergy};
pub use ion::IonEwald;
pub use params::{
    ConvergenceReport, ConvergenceWarning, EwaldParams, EwaldSettings, ALPHA_HEIGHT_FACTOR,
    DEFAULT_GMAX, DEFAULT_NLATVEC, HALF_SPACE_EPS, WEIGHT_THRESHOLD,
};

use nalgebra::Vector3;
use num_complex::Complex64;

use crate::error::{EwaldError, Result};
use crate::lattice::{Cell, MinimalImageDistance};

/// Separations below this are treated as coincident particles.
pub const MIN_SEPARATION: f64 = 1e-12;

/// Ewald evaluator for one cell.
///
/// Everything stored here is built once and never mutated, so one evaluator
/// can be shared by reference between threads evaluating different batches.
#[derive(Debug, Clone)]
pub struct Ewald {
    cell: Cell,
    dist: MinimalImageDistance,
    params: EwaldParams,
    constants: EwaldConstants,
    ion: IonEwald,
}

impl Ewald {
    pub fn new(cell: Cell, settings: EwaldSettings) -> Result<Self> {
        let params = EwaldParams::new(&cell, settings)?;
        Self::from_params(cell, params)
    }

    /// Evaluator with an explicit splitting parameter.
    pub fn with_alpha(cell: Cell, settings: EwaldSettings, alpha: f64) -> Result<Self> {
        let params = EwaldParams::with_alpha(&cell, settings, alpha)?;
        Self::from_params(cell, params)
    }

    fn from_params(cell: Cell, params: EwaldParams) -> Result<Self> {
        let dist = MinimalImageDistance::new(&cell);
        let constants = EwaldConstants::new(params.alpha, params.volume, cell.ion_charges());
        let ion = IonEwald::new(&cell, &dist, &params)?;
        log::info!(
            "Ion-ion Ewald energy: {:.10} (real {:.10}, reciprocal {:.10}, constant {:.10})",
            ion.total() + constants.ion_ion(),
            ion.real,
            ion.reciprocal,
            constants.ion_ion()
        );
        Ok(Self {
            cell,
            dist,
            params,
            constants,
            ion,
        })
    }

    pub fn cell(&self) -> &Cell {
        &self.cell
    }

    pub fn params(&self) -> &EwaldParams {
        &self.params
    }

    pub fn constants(&self) -> &EwaldConstants {
        &self.constants
    }

    pub fn ion(&self) -> &IonEwald {
        &self.ion
    }

    pub fn alpha(&self) -> f64 {
        self.params.alpha
    }

    /// Total ion-ion energy: lattice sum plus the fixed-fixed constant.
    pub fn ion_ion(&self) -> f64 {
        self.ion.total() + self.constants.ion_ion()
    }

    pub fn convergence_report(&self) -> ConvergenceReport {
        self.params.convergence_report()
    }
}

/// exp(-i G·x)
#[inline]
pub(crate) fn plane_wave(g: &Vector3<f64>, x: &Vector3<f64>) -> Complex64 {
    let phase = g.dot(x);
    Complex64::new(phase.cos(), -phase.sin())
}

/// Reject a zero-length minimum image displacement before dividing by it.
pub(crate) fn check_separation<F, S>(d: &Vector3<f64>, first: F, second: S) -> Result<()>
where
    F: FnOnce() -> String,
    S: FnOnce() -> String,
{
    if d.norm() < MIN_SEPARATION {
        return Err(EwaldError::CoincidentParticles {
            first: first(),
            second: second(),
        });
    }
    Ok(())
}

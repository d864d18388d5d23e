//! Position independent parts of the Ewald sum: self energy plus the
//! neutralizing background of a charged cell.
//!
//! With the pair coefficient and the square coefficient
//!
//! C_pair = -π / (V α²)
//! C_self = -α / √π + C_pair / 2
//!
//! every constant is a polynomial in the charges. Mobile particles carry
//! charge -1, so their constants are written as functions of their number Ne.

use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EwaldConstants {
    pub alpha: f64,
    /// Coefficient of each charge pair
    pub c_pair: f64,
    /// Coefficient of each squared charge
    pub c_self: f64,
    /// Σ Z over fixed charges
    charge_sum: f64,
    /// Σ Z² over fixed charges
    charge_sq_sum: f64,
}

impl EwaldConstants {
    pub fn new(alpha: f64, volume: f64, charges: &[f64]) -> Self {
        let c_pair = -PI / (volume * alpha * alpha);
        let c_self = -alpha / PI.sqrt() + c_pair / 2.0;
        Self {
            alpha,
            c_pair,
            c_self,
            charge_sum: charges.iter().sum(),
            charge_sq_sum: charges.iter().map(|z| z * z).sum(),
        }
    }

    /// Fixed-fixed constant: Σ_{I<J} Z_I Z_J C_pair + Σ Z_I² C_self.
    pub fn ion_ion(&self) -> f64 {
        let pair_sum = (self.charge_sum * self.charge_sum - self.charge_sq_sum) / 2.0;
        pair_sum * self.c_pair + self.charge_sq_sum * self.c_self
    }

    /// Mobile-mobile constant for `ne` particles.
    pub fn electron_electron(&self, ne: usize) -> f64 {
        let ne = ne as f64;
        ne * (ne - 1.0) / 2.0 * self.c_pair + ne * self.c_self
    }

    /// Mobile-fixed constant for `ne` particles.
    pub fn electron_ion(&self, ne: usize) -> f64 {
        -(ne as f64) * self.charge_sum * self.c_pair
    }

    /// Constant part of the energy of one particle against the other `ne - 1`
    /// particles and the fixed charges, counting its pairs in full.
    ///
    /// This is the constant that changes when that particle is removed.
    pub fn single_particle(&self, ne: usize) -> f64 {
        (ne as f64 - 1.0) * self.c_pair - self.charge_sum * self.c_pair + self.c_self
    }

    /// Constant share of one particle when the total is split evenly, so that
    /// `ne * single_particle_share(ne) == electron_electron(ne) + electron_ion(ne)`.
    pub fn single_particle_share(&self, ne: usize) -> f64 {
        (ne as f64 - 1.0) / 2.0 * self.c_pair - self.charge_sum * self.c_pair + self.c_self
    }

    /// Constant part for a particle that is not yet in the configuration.
    pub fn test_particle(&self) -> f64 {
        -self.charge_sum * self.c_pair + self.c_self
    }

    pub fn charge_sum(&self) -> f64 {
        self.charge_sum
    }
}

//! Ewald convergence parameters: splitting parameter α, real-space image
//! displacements and the weighted reciprocal lattice vectors.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use statrs::function::erf::erfc;
use std::f64::consts::PI;
use std::fmt;

use crate::error::{EwaldError, Result};
use crate::lattice::{Cell, MinimalImageDistance};

/// Reciprocal vectors whose weight W(G) does not exceed this are dropped.
///
/// This is a convergence knob: the discarded tail of the reciprocal sum is
/// bounded by the number of dropped vectors times this threshold.
pub const WEIGHT_THRESHOLD: f64 = 1e-10;

/// α is chosen as this factor over the smallest cell height.
pub const ALPHA_HEIGHT_FACTOR: f64 = 5.0;

/// Tie breaker for the half-space test x + ε y + ε² z > 0.
/// Valid as long as the reciprocal search radius stays below 1/ε.
pub const HALF_SPACE_EPS: f64 = 1e-6;

pub const DEFAULT_GMAX: usize = 200;
pub const DEFAULT_NLATVEC: usize = 2;

/// Search radii for the two halves of the Ewald sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EwaldSettings {
    /// Largest integer index searched in reciprocal space
    pub gmax: usize,
    /// Largest integer lattice translation in the real-space sum
    pub nlatvec: usize,
}

impl Default for EwaldSettings {
    fn default() -> Self {
        Self {
            gmax: DEFAULT_GMAX,
            nlatvec: DEFAULT_NLATVEC,
        }
    }
}

/// Non-fatal notice that a cutoff is too small for the weight threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConvergenceWarning {
    /// Reciprocal vectors with W(G) above the threshold lie outside `gmax`.
    ReciprocalTruncated { gmax: usize, required: usize },
    /// The first excluded real-space image still contributes more than the
    /// threshold to a single pair.
    RealSpaceTruncated { nlatvec: usize, residual: f64 },
}

impl fmt::Display for ConvergenceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvergenceWarning::ReciprocalTruncated { gmax, required } => write!(
                f,
                "reciprocal sum truncated: gmax = {} but weights above {:.0e} extend to index {}",
                gmax, WEIGHT_THRESHOLD, required
            ),
            ConvergenceWarning::RealSpaceTruncated { nlatvec, residual } => write!(
                f,
                "real-space sum truncated: nlatvec = {} leaves pair terms up to {:.3e}",
                nlatvec, residual
            ),
        }
    }
}

/// Audit record of the truncation actually used.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceReport {
    pub alpha: f64,
    pub num_displacements: usize,
    pub num_gpoints: usize,
    pub weight_sum: f64,
    pub warnings: Vec<ConvergenceWarning>,
}

/// Setup artifacts of an Ewald sum that depend only on the lattice.
#[derive(Debug, Clone)]
pub struct EwaldParams {
    /// Splitting parameter between real and reciprocal space
    pub alpha: f64,
    /// Cell volume
    pub volume: f64,
    settings: EwaldSettings,
    lattice_displacements: Vec<Vector3<f64>>,
    gpoints: Vec<Vector3<f64>>,
    gweights: Vec<f64>,
    weight_sum: f64,
    warnings: Vec<ConvergenceWarning>,
}

impl EwaldParams {
    /// Set up the Ewald sum with α = 5 / (smallest cell height).
    pub fn new(cell: &Cell, settings: EwaldSettings) -> Result<Self> {
        let smallest_height = cell.smallest_height();
        if !smallest_height.is_finite() || smallest_height <= 0.0 {
            return Err(EwaldError::DegenerateLattice { smallest_height });
        }
        let alpha = ALPHA_HEIGHT_FACTOR / smallest_height;
        log::info!("Setting Ewald alpha to {}", alpha);
        Self::build(cell, settings, alpha)
    }

    /// Set up the Ewald sum with an explicit splitting parameter.
    ///
    /// The total energy does not depend on α; this exists to check exactly
    /// that and to reproduce other codes.
    pub fn with_alpha(cell: &Cell, settings: EwaldSettings, alpha: f64) -> Result<Self> {
        if !alpha.is_finite() || alpha <= 0.0 {
            return Err(EwaldError::InvalidParameter {
                name: "alpha",
                reason: format!("must be positive and finite, got {}", alpha),
            });
        }
        Self::build(cell, settings, alpha)
    }

    fn build(cell: &Cell, settings: EwaldSettings, alpha: f64) -> Result<Self> {
        let volume = cell.volume();
        let lattice_displacements = lattice_displacements(cell.lattice(), settings.nlatvec);
        let (gpoints, gweights, required) = reciprocal_vectors(cell, settings.gmax, alpha, volume);
        let weight_sum: f64 = gweights.iter().sum();

        let mut warnings = Vec::new();
        if required > settings.gmax {
            warnings.push(ConvergenceWarning::ReciprocalTruncated {
                gmax: settings.gmax,
                required,
            });
        }
        let residual = real_space_residual(cell, settings.nlatvec, alpha);
        if residual > WEIGHT_THRESHOLD {
            warnings.push(ConvergenceWarning::RealSpaceTruncated {
                nlatvec: settings.nlatvec,
                residual,
            });
        }
        for warning in &warnings {
            log::warn!("{}", warning);
        }
        log::debug!(
            "Ewald setup: {} lattice displacements, {} reciprocal vectors",
            lattice_displacements.len(),
            gpoints.len()
        );

        Ok(Self {
            alpha,
            volume,
            settings,
            lattice_displacements,
            gpoints,
            gweights,
            weight_sum,
            warnings,
        })
    }

    pub fn settings(&self) -> EwaldSettings {
        self.settings
    }

    pub fn lattice_displacements(&self) -> &[Vector3<f64>] {
        &self.lattice_displacements
    }

    pub fn gpoints(&self) -> &[Vector3<f64>] {
        &self.gpoints
    }

    pub fn gweights(&self) -> &[f64] {
        &self.gweights
    }

    /// Σ_G W(G) over the retained half-space vectors.
    pub fn weight_sum(&self) -> f64 {
        self.weight_sum
    }

    /// Σₙ erfc(α|d + n|) / |d + n| over the real-space image displacements.
    pub fn screened_image_sum(&self, d: &Vector3<f64>) -> f64 {
        self.lattice_displacements
            .iter()
            .map(|n| {
                let r = (d + n).norm();
                erfc(self.alpha * r) / r
            })
            .sum()
    }

    pub fn convergence_report(&self) -> ConvergenceReport {
        ConvergenceReport {
            alpha: self.alpha,
            num_displacements: self.lattice_displacements.len(),
            num_gpoints: self.gpoints.len(),
            weight_sum: self.weight_sum,
            warnings: self.warnings.clone(),
        }
    }
}

/// W(G) = 4π / (V |G|²) · exp(-|G|² / 4α²)
#[inline]
fn gweight(g2: f64, alpha: f64, volume: f64) -> f64 {
    4.0 * PI * (-g2 / (4.0 * alpha * alpha)).exp() / (volume * g2)
}

/// All integer combinations of lattice vectors with indices in
/// [-nlatvec, nlatvec], first index slowest.
fn lattice_displacements(lattice: &Matrix3<f64>, nlatvec: usize) -> Vec<Vector3<f64>> {
    let n = nlatvec as i64;
    let side = 2 * nlatvec + 1;
    let mut displacements = Vec::with_capacity(side * side * side);
    for i in -n..=n {
        for j in -n..=n {
            for k in -n..=n {
                let coeffs = Vector3::new(i as f64, j as f64, k as f64);
                displacements.push(lattice.transpose() * coeffs);
            }
        }
    }
    displacements
}

/// Half-space reciprocal vectors with W(G) above the threshold.
///
/// Returns the vectors, their weights, and the index radius that would be
/// needed to include every vector above the threshold. The loops only visit
/// the index box that can hold such vectors (clipped to `gmax`), which gives
/// the same vectors in the same order as scanning the full [-gmax, gmax]³ box.
fn reciprocal_vectors(
    cell: &Cell,
    gmax: usize,
    alpha: f64,
    volume: f64,
) -> (Vec<Vector3<f64>>, Vec<f64>, usize) {
    // W(G) decreases monotonically in |G|², so beyond g2_cut every weight is
    // below the threshold.
    let mut g2_cut = 4.0 * alpha * alpha;
    while gweight(g2_cut, alpha, volume) > WEIGHT_THRESHOLD {
        g2_cut *= 2.0;
    }
    let g_cut = g2_cut.sqrt();

    // The integer index along bₖ is G·aₖ / 2π, bounded by |G||aₖ| / 2π.
    let needed: Vec<usize> = (0..3)
        .map(|k| (g_cut * cell.lattice_vector(k).norm() / (2.0 * PI)).ceil() as usize)
        .collect();
    let required = needed.iter().copied().max().unwrap_or(0);
    let bound: Vec<i64> = needed.iter().map(|&n| n.min(gmax) as i64).collect();

    let inverse = cell.inverse();
    let mut gpoints = Vec::new();
    let mut gweights = Vec::new();
    for x in -bound[0]..=bound[0] {
        for y in -bound[1]..=bound[1] {
            for z in -bound[2]..=bound[2] {
                let (xf, yf, zf) = (x as f64, y as f64, z as f64);
                if xf + HALF_SPACE_EPS * yf + HALF_SPACE_EPS * HALF_SPACE_EPS * zf <= 0.0 {
                    continue;
                }
                let g = 2.0 * PI * (inverse * Vector3::new(xf, yf, zf));
                let w = gweight(g.norm_squared(), alpha, volume);
                if w > WEIGHT_THRESHOLD {
                    gpoints.push(g);
                    gweights.push(w);
                }
            }
        }
    }
    (gpoints, gweights, required)
}

/// Upper bound on erfc(αr)/r for the closest image left out of the
/// real-space sum.
///
/// An excluded image d + n has |nₖ| ≥ nlatvec + 1 along some direction k, so
/// its distance along the plane normal νₖ is at least
/// (nlatvec + 1) hₖ - |d·νₖ|. The closest excluded image is bounded by the
/// smallest of these over k.
fn real_space_residual(cell: &Cell, nlatvec: usize, alpha: f64) -> f64 {
    let heights = cell.heights();
    let extent = MinimalImageDistance::new(cell).max_normal_extent(&heights);
    let r = (0..3)
        .map(|k| (nlatvec as f64 + 1.0) * heights[k] - extent[k])
        .fold(f64::INFINITY, f64::min);
    if r <= 0.0 {
        f64::INFINITY
    } else {
        erfc(alpha * r) / r
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cubic(a: f64) -> Cell {
        Cell::cubic(a, vec![Vector3::zeros()], vec![1.0]).unwrap()
    }

    #[test]
    fn test_alpha_from_smallest_height() {
        let cell = cubic(10.0);
        let params = EwaldParams::new(&cell, EwaldSettings::default()).unwrap();
        assert_relative_eq!(params.alpha, 0.5, epsilon = 1e-14);

        #[rustfmt::skip]
        let lattice = Matrix3::new(
            4.0, 0.0, 0.0,
            3.0, 2.0, 0.0,
            0.0, 0.0, 5.0,
        );
        let skewed = Cell::new(lattice, vec![], vec![]).unwrap();
        let params = EwaldParams::new(&skewed, EwaldSettings::default()).unwrap();
        assert_relative_eq!(params.alpha, 2.5, epsilon = 1e-12);
    }

    #[test]
    fn test_alpha_is_reproducible() {
        let cell = cubic(7.3);
        let a = EwaldParams::new(&cell, EwaldSettings::default()).unwrap();
        let b = EwaldParams::new(&cell, EwaldSettings::default()).unwrap();
        assert_eq!(a.alpha.to_bits(), b.alpha.to_bits());
        assert_eq!(a.gpoints(), b.gpoints());
        assert_eq!(a.gweights(), b.gweights());
    }

    #[test]
    fn test_lattice_displacements_symmetric() {
        let cell = cubic(3.0);
        let settings = EwaldSettings { gmax: 10, nlatvec: 2 };
        let params = EwaldParams::new(&cell, settings).unwrap();
        let disp = params.lattice_displacements();
        assert_eq!(disp.len(), 125);
        // Index order is symmetric about the centre entry, which is the origin
        assert_relative_eq!(disp[62].norm(), 0.0);
        for (d, m) in disp.iter().zip(disp.iter().rev()) {
            assert_relative_eq!((d + m).norm(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_reciprocal_half_space_and_weights() {
        let cell = cubic(5.0);
        let params = EwaldParams::new(&cell, EwaldSettings::default()).unwrap();
        assert!(!params.gpoints().is_empty());

        for (g, &w) in params.gpoints().iter().zip(params.gweights()) {
            assert!(g.norm() > 0.0);
            assert!(w > WEIGHT_THRESHOLD && w.is_finite());
            // No conjugate partner is retained
            assert!(!params.gpoints().iter().any(|h| (g + h).norm() < 1e-9));
        }
        let sum: f64 = params.gweights().iter().sum();
        assert_relative_eq!(params.weight_sum(), sum);
    }

    #[test]
    fn test_clipped_search_matches_full_box() {
        let cell = cubic(4.0);
        let alpha = 5.0 / 4.0;
        let (clipped, weights, required) = reciprocal_vectors(&cell, DEFAULT_GMAX, alpha, 64.0);
        assert!(required < DEFAULT_GMAX);

        // Brute-force scan of a box comfortably larger than the clip
        let big = (required + 3) as i64;
        let mut full = Vec::new();
        for x in -big..=big {
            for y in -big..=big {
                for z in -big..=big {
                    let (xf, yf, zf) = (x as f64, y as f64, z as f64);
                    if xf + 1e-6 * yf + 1e-12 * zf <= 0.0 {
                        continue;
                    }
                    let g = 2.0 * PI * (cell.inverse() * Vector3::new(xf, yf, zf));
                    if gweight(g.norm_squared(), alpha, 64.0) > WEIGHT_THRESHOLD {
                        full.push(g);
                    }
                }
            }
        }
        assert_eq!(clipped, full);
        assert_eq!(clipped.len(), weights.len());
    }

    #[test]
    fn test_small_cutoffs_are_reported() {
        let cell = cubic(10.0);
        let params = EwaldParams::new(&cell, EwaldSettings { gmax: 2, nlatvec: 0 }).unwrap();
        let report = params.convergence_report();
        assert_eq!(report.num_displacements, 1);
        assert!(report.warnings.iter().any(|w| matches!(
            w,
            ConvergenceWarning::ReciprocalTruncated { gmax: 2, .. }
        )));
        assert!(report.warnings.iter().any(|w| matches!(
            w,
            ConvergenceWarning::RealSpaceTruncated { nlatvec: 0, .. }
        )));

        let params = EwaldParams::new(&cell, EwaldSettings::default()).unwrap();
        assert!(params.convergence_report().warnings.is_empty());
    }

    #[test]
    fn test_elongated_cell_converged_at_defaults() {
        // Long, slightly tilted third axis: the sum of the lattice vector
        // lengths is far larger than (nlatvec + 1) times the smallest height.
        #[rustfmt::skip]
        #[rustfmt::skip]
        let lattice = Matrix3::new(
            2.0, 0.0, 0.0,
            0.0, 2.0, 0.0,
            0.3, 0.0, 12.0,
        );
        let cell = Cell::new(lattice, vec![Vector3::new(0.5, 0.5, 1.0)], vec![1.0]).unwrap();
        let params = EwaldParams::new(&cell, EwaldSettings::default()).unwrap();
        assert!(params.convergence_report().warnings.is_empty());

        let residual = real_space_residual(&cell, DEFAULT_NLATVEC, params.alpha);
        assert!(residual.is_finite() && residual < WEIGHT_THRESHOLD);

        // Too few images is still reported
        let params = EwaldParams::new(&cell, EwaldSettings { gmax: 200, nlatvec: 0 }).unwrap();
        assert!(params.convergence_report().warnings.iter().any(|w| matches!(
            w,
            ConvergenceWarning::RealSpaceTruncated { nlatvec: 0, .. }
        )));
    }

    #[test]
    fn test_invalid_alpha_rejected() {
        let cell = cubic(10.0);
        let err = EwaldParams::with_alpha(&cell, EwaldSettings::default(), 0.0).unwrap_err();
        assert!(matches!(err, EwaldError::InvalidParameter { name: "alpha", .. }));
    }

    #[test]
    fn test_screened_image_sum_single_image() {
        let cell = cubic(10.0);
        let params = EwaldParams::new(&cell, EwaldSettings { gmax: 10, nlatvec: 0 }).unwrap();
        let d = Vector3::new(1.5, 0.0, 0.0);
        assert_relative_eq!(
            params.screened_image_sum(&d),
            erfc(0.5 * 1.5) / 1.5,
            epsilon = 1e-15
        );
    }
}

//! Simulation cell: lattice vectors plus the fixed (ionic) charges.

use nalgebra::{Matrix3, Vector3};
use std::f64::consts::PI;

use crate::error::{EwaldError, Result};

/// Cell heights below this are treated as a collapsed lattice direction.
pub const MIN_CELL_HEIGHT: f64 = 1e-8;

/// Periodic simulation cell.
///
/// Rows of `lattice` are the basis vectors a₁, a₂, a₃. The cell is immutable
/// once built; everything derived from it (volume, reciprocal lattice,
/// heights) is computed from the stored matrices.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    lattice: Matrix3<f64>,
    inverse: Matrix3<f64>,
    ion_coords: Vec<Vector3<f64>>,
    ion_charges: Vec<f64>,
}

impl Cell {
    /// Build a cell from lattice rows, ion positions (Bohr) and ion charges.
    ///
    /// Fails with a geometry error when the lattice is singular or one of the
    /// cell heights collapses, since no Ewald splitting parameter can be
    /// derived for such a cell.
    pub fn new(
        lattice: Matrix3<f64>,
        ion_coords: Vec<Vector3<f64>>,
        ion_charges: Vec<f64>,
    ) -> Result<Self> {
        if ion_coords.len() != ion_charges.len() {
            return Err(EwaldError::ShapeMismatch {
                what: "ion charges",
                expected: ion_coords.len(),
                found: ion_charges.len(),
            });
        }

        let determinant = lattice.determinant();
        if !determinant.is_finite() || determinant == 0.0 {
            return Err(EwaldError::SingularLattice { determinant });
        }
        let inverse = lattice
            .try_inverse()
            .ok_or(EwaldError::SingularLattice { determinant })?;

        let cell = Self {
            lattice,
            inverse,
            ion_coords,
            ion_charges,
        };

        let smallest_height = cell.smallest_height();
        if !smallest_height.is_finite() || smallest_height < MIN_CELL_HEIGHT {
            return Err(EwaldError::DegenerateLattice { smallest_height });
        }
        Ok(cell)
    }

    /// Cubic cell of side `a`.
    pub fn cubic(a: f64, ion_coords: Vec<Vector3<f64>>, ion_charges: Vec<f64>) -> Result<Self> {
        Self::new(Matrix3::from_diagonal_element(a), ion_coords, ion_charges)
    }

    pub fn lattice(&self) -> &Matrix3<f64> {
        &self.lattice
    }

    /// Inverse of the lattice matrix; its columns are bₖ / 2π.
    pub fn inverse(&self) -> &Matrix3<f64> {
        &self.inverse
    }

    pub fn ion_coords(&self) -> &[Vector3<f64>] {
        &self.ion_coords
    }

    pub fn ion_charges(&self) -> &[f64] {
        &self.ion_charges
    }

    pub fn num_ions(&self) -> usize {
        self.ion_coords.len()
    }

    /// Cell volume |det(lattice)|.
    pub fn volume(&self) -> f64 {
        self.lattice.determinant().abs()
    }

    /// Reciprocal lattice vectors as rows: bₖ · aⱼ = 2π δₖⱼ.
    pub fn reciprocal_lattice(&self) -> Matrix3<f64> {
        2.0 * PI * self.inverse.transpose()
    }

    /// Lattice vector k as a column vector.
    pub fn lattice_vector(&self, k: usize) -> Vector3<f64> {
        self.lattice.row(k).transpose()
    }

    /// Height of the cell along each lattice direction.
    ///
    /// The height for direction k is the projection of aₖ onto the normal of
    /// the plane spanned by the other two vectors, i.e. V·(column k of the
    /// inverse lattice) scaled to unit length.
    pub fn heights(&self) -> Vector3<f64> {
        let volume = self.lattice.determinant();
        Vector3::from_fn(|k, _| {
            let normal: Vector3<f64> = self.inverse.column(k) * volume;
            normal.dot(&self.lattice_vector(k)).abs() / normal.norm()
        })
    }

    pub fn smallest_height(&self) -> f64 {
        self.heights().min()
    }

    /// Fractional coordinates of a Cartesian position.
    pub fn to_fractional(&self, r: &Vector3<f64>) -> Vector3<f64> {
        self.inverse.transpose() * r
    }

    /// Cartesian position of fractional coordinates.
    pub fn to_cartesian(&self, f: &Vector3<f64>) -> Vector3<f64> {
        self.lattice.transpose() * f
    }

    /// Wrap a position back into the home cell.
    pub fn wrap(&self, r: &Vector3<f64>) -> Vector3<f64> {
        let f = self.to_fractional(r).map(|x| x.rem_euclid(1.0));
        self.to_cartesian(&f)
    }
}

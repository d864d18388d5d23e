//! Minimum image displacements under periodic boundary conditions.

use nalgebra::{Matrix3, Vector3};

use super::cell::Cell;

/// Minimum image convention for an arbitrary (possibly skewed) lattice.
///
/// Displacements are first reduced to fractional coordinates in [-½, ½].
/// For orthogonal cells this is already the shortest image; for skewed cells
/// the 26 neighbouring images of the reduced vector are searched as well.
#[derive(Debug, Clone)]
pub struct MinimalImageDistance {
    lattice: Matrix3<f64>,
    inverse: Matrix3<f64>,
    neighbors: Vec<Vector3<f64>>,
}

impl MinimalImageDistance {
    pub fn new(cell: &Cell) -> Self {
        let lattice = *cell.lattice();
        let metric = lattice * lattice.transpose();
        let scale = metric.diagonal().max();
        let orthogonal = (0..3)
            .flat_map(|i| (0..3).map(move |j| (i, j)))
            .filter(|(i, j)| i != j)
            .all(|(i, j)| metric[(i, j)].abs() <= 1e-12 * scale);

        let mut neighbors = Vec::new();
        if !orthogonal {
            for i in -1..=1 {
                for j in -1..=1 {
                    for k in -1..=1 {
                        if i == 0 && j == 0 && k == 0 {
                            continue;
                        }
                        let n = Vector3::new(i as f64, j as f64, k as f64);
                        neighbors.push(lattice.transpose() * n);
                    }
                }
            }
        }

        Self {
            lattice,
            inverse: *cell.inverse(),
            neighbors,
        }
    }

    pub fn is_orthogonal(&self) -> bool {
        self.neighbors.is_empty()
    }

    /// Shortest periodic image of the displacement `dr`.
    pub fn minimum_image(&self, dr: &Vector3<f64>) -> Vector3<f64> {
        let frac = (self.inverse.transpose() * dr).map(|f| f - f.round());
        let reduced = self.lattice.transpose() * frac;
        let mut best = reduced;
        let mut best_norm = reduced.norm_squared();
        for shift in &self.neighbors {
            let candidate = reduced + shift;
            let norm = candidate.norm_squared();
            if norm < best_norm {
                best = candidate;
                best_norm = norm;
            }
        }
        best
    }

    /// Upper bound on |d·νₖ| for any minimum image displacement d, where νₖ
    /// is the unit normal of the lattice planes k and `heights` holds their
    /// spacings hₖ.
    ///
    /// The fractional component of a reduced displacement lies in [-½, ½];
    /// the neighbour search can add one more lattice vector, giving [-3/2, 3/2].
    /// The shortest image is never longer than the reduced one, which caps
    /// every component at ½ Σₖ |aₖ|.
    pub fn max_normal_extent(&self, heights: &Vector3<f64>) -> Vector3<f64> {
        let frac_bound = if self.is_orthogonal() { 0.5 } else { 1.5 };
        let longest = 0.5 * (0..3).map(|k| self.lattice.row(k).norm()).sum::<f64>();
        heights.map(|h| (frac_bound * h).min(longest))
    }

    /// Minimum image displacements `x - p` from each point `p` to `x`.
    pub fn dist_i(&self, points: &[Vector3<f64>], x: &Vector3<f64>) -> Vec<Vector3<f64>> {
        points.iter().map(|p| self.minimum_image(&(x - p))).collect()
    }

    /// Minimum image displacements `r[j] - r[i]` for every pair i < j.
    pub fn dist_matrix(&self, r: &[Vector3<f64>]) -> Vec<((usize, usize), Vector3<f64>)> {
        let n = r.len();
        let mut pairs = Vec::with_capacity(n * n.saturating_sub(1) / 2);
        for i in 0..n {
            for j in (i + 1)..n {
                pairs.push(((i, j), self.minimum_image(&(r[j] - r[i]))));
            }
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_minimum_image_distance() {
        let a = 3.51;
        let cell = Cell::cubic(a, vec![], vec![]).unwrap();
        let dist = MinimalImageDistance::new(&cell);
        assert!(dist.is_orthogonal());

        // Points inside the same cell
        let r1 = Vector3::new(0.1, 0.2, 0.3);
        let r2 = Vector3::new(0.4, 0.5, 0.6);
        let dr = dist.minimum_image(&(r1 - r2));
        assert_relative_eq!(dr.x, r1.x - r2.x, epsilon = 1e-10);
        assert_relative_eq!(dr.y, r1.y - r2.y, epsilon = 1e-10);
        assert_relative_eq!(dr.z, r1.z - r2.z, epsilon = 1e-10);

        // Same point shifted by one lattice vector
        let r3 = Vector3::new(a + 0.1, 0.2, 0.3);
        let dr2 = dist.minimum_image(&(r1 - r3));
        assert_relative_eq!(dr2.norm(), 0.0, epsilon = 1e-10);

        // Across the boundary
        let r4 = Vector3::new(a - 0.1, 0.2, 0.3);
        let dr3 = dist.minimum_image(&(r4 - r1));
        assert_relative_eq!(dr3.x, -0.2, epsilon = 1e-10);
    }

    #[test]
    fn test_skewed_minimum_image_is_shortest() {
        #[rustfmt::skip]
        let lattice = Matrix3::new(
            4.0, 0.0, 0.0,
            3.5, 1.0, 0.0,
            0.0, 0.0, 4.0,
        );
        let cell = Cell::new(lattice, vec![], vec![]).unwrap();
        let dist = MinimalImageDistance::new(&cell);
        assert!(!dist.is_orthogonal());

        let dr = Vector3::new(0.3, 0.8, 0.1);
        let mi = dist.minimum_image(&dr);

        // Brute force over a generous image range
        let mut shortest = f64::INFINITY;
        for i in -4..=4 {
            for j in -4..=4 {
                for k in -4..=4 {
                    let n = Vector3::new(i as f64, j as f64, k as f64);
                    shortest = shortest.min((dr + lattice.transpose() * n).norm());
                }
            }
        }
        assert_relative_eq!(mi.norm(), shortest, epsilon = 1e-12);
    }

    #[test]
    fn test_normal_extent_bounds_minimum_images() {
        let cubic = Cell::cubic(6.0, vec![], vec![]).unwrap();
        let dist = MinimalImageDistance::new(&cubic);
        let extent = dist.max_normal_extent(&cubic.heights());
        assert_relative_eq!(extent, Vector3::new(3.0, 3.0, 3.0), epsilon = 1e-12);

        #[rustfmt::skip]
        let lattice = Matrix3::new(
            2.0, 0.0, 0.0,
            0.0, 2.0, 0.0,
            0.3, 0.0, 12.0,
        );
        let cell = Cell::new(lattice, vec![], vec![]).unwrap();
        let dist = MinimalImageDistance::new(&cell);
        let heights = cell.heights();
        let extent = dist.max_normal_extent(&heights);

        // Sample displacements and check their projections on the normals
        let normals: Vec<Vector3<f64>> =
            (0..3).map(|k| cell.inverse().column(k).normalize()).collect();
        for i in 0..7 {
            for j in 0..7 {
                let dr = Vector3::new(0.9 * i as f64 - 2.7, 1.3 * j as f64 - 3.9, 5.1 * i as f64);
                let d = dist.minimum_image(&dr);
                for k in 0..3 {
                    assert!(d.dot(&normals[k]).abs() <= extent[k] + 1e-12);
                }
            }
        }
        // The long axis is capped by the reduced displacement length
        assert!(extent.z < 1.5 * heights.z);
    }

    #[test]
    fn test_dist_matrix_pairs() {
        let cell = Cell::cubic(10.0, vec![], vec![]).unwrap();
        let dist = MinimalImageDistance::new(&cell);
        let r = vec![
            Vector3::new(0.5, 0.0, 0.0),
            Vector3::new(9.5, 0.0, 0.0),
            Vector3::new(0.5, 2.0, 0.0),
        ];
        let pairs = dist.dist_matrix(&r);
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0].0, (0, 1));
        assert_relative_eq!(pairs[0].1.norm(), 1.0, epsilon = 1e-12);
        assert_eq!(pairs[2].0, (1, 2));
        assert_relative_eq!(pairs[2].1.norm(), 5.0_f64.sqrt(), epsilon = 1e-12);
    }
}

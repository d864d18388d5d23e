//! Lattice module - periodic cell geometry and minimum image distances.

mod cell;
mod distance;

pub use cell::{Cell, MIN_CELL_HEIGHT};
pub use distance::MinimalImageDistance;

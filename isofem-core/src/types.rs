//! Core geometric types shared by the formulation engine and its callers.

use nalgebra::Vector3;

/// A node position in 3D space. Lower-dimensional elements read only the
/// leading components.
pub type Point3 = Vector3<f64>;

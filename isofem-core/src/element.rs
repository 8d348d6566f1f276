//! Element formulation.
//!
//! Element implementations build their stiffness and mass contributions from
//! the per-integration-point data computed here: shape-function values,
//! physical derivatives, Jacobians and quadrature weights.
//!
//! # Submodules
//!
//! - [`gauss`] - Gauss quadrature rules for numerical integration
//! - [`lagrange`] - Isoparametric formulation of the linear Lagrange family

pub mod gauss;
pub mod lagrange;

pub use gauss::{gauss_1d, gauss_tensor, GaussPoint};
pub use lagrange::{
    local_shape_derivatives, shape_functions, LagrangeFamily, LagrangeFormulation,
    ShapeFunctionRegistry, ShapeTable,
};

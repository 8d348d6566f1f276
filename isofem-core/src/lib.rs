//! isofem core - numerical kernel of a finite element package
//!
//! - Isoparametric formulation of the linear Lagrange elements (line,
//!   quadrilateral, hexahedron): shape functions, Jacobians, physical
//!   derivatives and Gauss quadrature weights
//! - Direct linear solvers for the assembled symmetric system
//!
//! # Architecture
//!
//! The two halves never call each other; they meet in the assembly layer:
//!
//! - [`LagrangeFormulation`]: evaluated once per element per step, with shape
//!   tables shared through a [`ShapeFunctionRegistry`]
//! - [`EquationSolver`] trait: solves `A x = b` once per step, either with
//!   [`GaussDenseSolver`] or the faer-backed sparse direct solver
//! - [`CsrMatrix`]: the sparse matrix handed over by the assembly layer

pub mod types;
pub mod element;
pub mod sparse;
pub mod solver;
pub mod error;

#[cfg(test)]
pub(crate) mod test_utils;

pub use types::Point3;
pub use element::{LagrangeFamily, LagrangeFormulation, ShapeFunctionRegistry};
pub use sparse::{CsrMatrix, TripletMatrix};
pub use solver::{
    select_solver, EquationSolver, GaussDenseSolver, SolveStats, SolverConfig, SolverKind, SolverMode,
};
#[cfg(feature = "sparse-direct")]
pub use solver::SparseDirectSolver;
pub use error::{Error, Result};

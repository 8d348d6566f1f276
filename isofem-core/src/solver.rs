//! Linear system solvers.
//!
//! Solves the assembled global system `A x = b` for one right-hand side, where
//! `A` is symmetric (optionally positive definite).
//!
//! # Solver Backends
//!
//! - [`GaussDenseSolver`]: Gaussian elimination with partial pivoting on a dense
//!   copy of the matrix. O(n³) time, O(n²) memory; meant for small and
//!   verification problems. Always available.
//! - [`SparseDirectSolver`]: Sparse direct factorization using the faer library,
//!   with the symbolic analysis cached across solves. The production choice;
//!   built with the `sparse-direct` feature.
//!
//! # Failure policy
//!
//! [`EquationSolver::try_solve`] reports failures as [`crate::Error`] values.
//! [`EquationSolver::solve`] treats them as fatal: a singular or unfactorizable
//! global matrix means the model is ill-posed (usually missing boundary
//! constraints), so it logs the cause and panics instead of returning a
//! fabricated solution.

pub mod dense;
#[cfg(feature = "sparse-direct")]
pub mod sparse_direct;

pub use dense::GaussDenseSolver;
#[cfg(feature = "sparse-direct")]
pub use sparse_direct::SparseDirectSolver;

use crate::error::Result;
use crate::sparse::CsrMatrix;

/// Smallest pivot magnitude the dense solver accepts.
pub const DEFAULT_PIVOT_TOLERANCE: f64 = 1e-20;

/// Matrix properties declared by the caller before the first solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolverMode {
    /// Matrix is symmetric; only its upper triangle is read.
    pub symmetric: bool,
    /// Matrix is positive definite.
    pub positive_definite: bool,
}

impl Default for SolverMode {
    fn default() -> Self {
        Self {
            symmetric: true,
            positive_definite: true,
        }
    }
}

/// Statistics of the last successful solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveStats {
    /// Solver name used.
    pub solver: String,
    /// Number of equations solved.
    pub n_equations: usize,
    /// Iterative refinement sweeps applied (sparse direct only).
    pub refinement_steps: Option<usize>,
    /// Final relative residual, when the solver measured it.
    pub residual: Option<f64>,
    /// Wall-clock time in seconds.
    pub time_seconds: f64,
}

impl SolveStats {
    pub(crate) fn log(&self) {
        log::info!(
            "{}: solved {} equations in {:.6} s",
            self.solver,
            self.n_equations,
            self.time_seconds
        );
    }
}

/// Linear solver interface.
///
/// Implementations keep state across calls (equation count, factorization
/// workspace), so solving takes `&mut self`. One solve at a time per instance.
pub trait EquationSolver: Send {
    /// Solve the linear system `A x = b`.
    ///
    /// # Arguments
    ///
    /// * `matrix` - System matrix (A)
    /// * `rhs` - Right-hand side vector (b)
    ///
    /// # Returns
    ///
    /// Solution vector (x)
    fn try_solve(&mut self, matrix: &CsrMatrix, rhs: &[f64]) -> Result<Vec<f64>>;

    /// Solve `A x = b`, treating any failure as fatal.
    ///
    /// # Panics
    ///
    /// Panics with the underlying error message when the solve fails.
    fn solve(&mut self, matrix: &CsrMatrix, rhs: &[f64]) -> Vec<f64> {
        match self.try_solve(matrix, rhs) {
            Ok(solution) => solution,
            Err(e) => {
                log::error!("{} failed on {} equations: {}", self.name(), rhs.len(), e);
                panic!("{}: {}", self.name(), e);
            }
        }
    }

    /// Current matrix-property flags.
    fn mode(&self) -> SolverMode;

    /// Declare whether the matrix is symmetric.
    fn set_symmetric(&mut self, symmetric: bool) -> Result<()>;

    /// Declare whether the matrix is positive definite.
    fn set_positive(&mut self, positive: bool) -> Result<()>;

    /// Dimension of the last system solved (0 before the first solve).
    fn n_equations(&self) -> usize;

    /// Timing and accuracy of the last successful solve.
    fn last_stats(&self) -> Option<&SolveStats>;

    /// Solver name for diagnostics.
    fn name(&self) -> &str;
}

/// Solver selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverKind {
    /// Dense Gaussian elimination with partial pivoting.
    #[default]
    DenseGauss,
    /// Sparse direct factorization (faer).
    SparseDirect,
}

impl SolverKind {
    /// Strategies compiled into this build.
    pub fn available() -> Vec<SolverKind> {
        let mut kinds = vec![SolverKind::DenseGauss];
        if cfg!(feature = "sparse-direct") {
            kinds.push(SolverKind::SparseDirect);
        }
        kinds
    }

    /// Whether this strategy is compiled into this build.
    pub fn is_available(self) -> bool {
        Self::available().contains(&self)
    }
}

/// Solver configuration.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Solver strategy to use.
    pub kind: SolverKind,
    /// Matrix is symmetric.
    pub symmetric: bool,
    /// Matrix is positive definite.
    pub positive_definite: bool,
    /// Pivot magnitude below which the dense solver reports a singular matrix.
    pub pivot_tolerance: f64,
    /// Maximum iterative refinement sweeps after a sparse solve.
    pub refinement_steps: usize,
    /// Relative residual at which refinement stops early.
    pub refinement_tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            kind: SolverKind::default(),
            symmetric: true,
            positive_definite: true,
            pivot_tolerance: DEFAULT_PIVOT_TOLERANCE,
            refinement_steps: 2,
            refinement_tolerance: 1e-14,
        }
    }
}

impl SolverConfig {
    /// Matrix-property flags carried by this configuration.
    pub fn mode(&self) -> SolverMode {
        SolverMode {
            symmetric: self.symmetric,
            positive_definite: self.positive_definite,
        }
    }
}

/// Build the solver described by `config`, with its mode flags already set.
///
/// The returned instance is meant to be held by the analysis for the whole run.
pub fn select_solver(config: &SolverConfig) -> Result<Box<dyn EquationSolver>> {
    match config.kind {
        SolverKind::DenseGauss => Ok(Box::new(
            GaussDenseSolver::with_pivot_tolerance(config.pivot_tolerance)
                .with_mode(config.mode()),
        )),
        SolverKind::SparseDirect => build_sparse_direct(config),
    }
}

#[cfg(feature = "sparse-direct")]
fn build_sparse_direct(config: &SolverConfig) -> Result<Box<dyn EquationSolver>> {
    Ok(Box::new(
        SparseDirectSolver::new()
            .with_mode(config.mode())?
            .with_refinement(config.refinement_steps, config.refinement_tolerance),
    ))
}

#[cfg(not(feature = "sparse-direct"))]
fn build_sparse_direct(_config: &SolverConfig) -> Result<Box<dyn EquationSolver>> {
    Err(crate::error::Error::Unavailable(
        "sparse direct solver requires the `sparse-direct` feature".into(),
    ))
}

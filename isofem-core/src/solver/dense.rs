//! Dense Gaussian elimination with partial pivoting.

use crate::error::{Error, Result};
use crate::solver::{EquationSolver, SolveStats, SolverMode, DEFAULT_PIVOT_TOLERANCE};
use crate::sparse::{check_system, to_dense, CsrMatrix};
use nalgebra::DMatrix;
use std::time::Instant;

/// Direct solver that expands the matrix to dense storage and runs Gaussian
/// elimination with partial pivoting.
///
/// Memory grows as n², so keep it to small systems and cross-checks.
#[derive(Debug, Clone)]
pub struct GaussDenseSolver {
    mode: SolverMode,
    pivot_tolerance: f64,
    n_equations: usize,
    stats: Option<SolveStats>,
}

impl GaussDenseSolver {
    /// Create a solver with the default pivot tolerance (`1e-20`).
    pub fn new() -> Self {
        Self::with_pivot_tolerance(DEFAULT_PIVOT_TOLERANCE)
    }

    /// Create a solver that rejects pivots smaller than `pivot_tolerance`.
    pub fn with_pivot_tolerance(pivot_tolerance: f64) -> Self {
        Self {
            mode: SolverMode::default(),
            pivot_tolerance,
            n_equations: 0,
            stats: None,
        }
    }

    /// Set the matrix-property flags.
    pub fn with_mode(mut self, mode: SolverMode) -> Self {
        self.mode = mode;
        self
    }

    /// Pivot magnitude below which the matrix is reported singular.
    pub fn pivot_tolerance(&self) -> f64 {
        self.pivot_tolerance
    }
}

impl Default for GaussDenseSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl EquationSolver for GaussDenseSolver {
    fn try_solve(&mut self, matrix: &CsrMatrix, rhs: &[f64]) -> Result<Vec<f64>> {
        let n = check_system(matrix, rhs)?;
        self.n_equations = n;
        if n == 0 {
            return Ok(vec![]);
        }

        log::debug!("dense Gauss solve of {} equations", n);
        let start = Instant::now();
        let dense = to_dense(matrix, self.mode.symmetric);
        let x = gauss_eliminate(dense, rhs.to_vec(), self.pivot_tolerance)?;

        let stats = SolveStats {
            solver: self.name().to_string(),
            n_equations: n,
            refinement_steps: None,
            residual: None,
            time_seconds: start.elapsed().as_secs_f64(),
        };
        stats.log();
        self.stats = Some(stats);
        Ok(x)
    }

    fn mode(&self) -> SolverMode {
        self.mode
    }

    fn set_symmetric(&mut self, symmetric: bool) -> Result<()> {
        self.mode.symmetric = symmetric;
        Ok(())
    }

    fn set_positive(&mut self, positive: bool) -> Result<()> {
        self.mode.positive_definite = positive;
        Ok(())
    }

    fn n_equations(&self) -> usize {
        self.n_equations
    }

    fn last_stats(&self) -> Option<&SolveStats> {
        self.stats.as_ref()
    }

    fn name(&self) -> &str {
        "Gauss dense (partial pivoting)"
    }
}

/// Solve `a x = b` by Gaussian elimination with partial pivoting, consuming `a` and `b`.
///
/// Fails with [`Error::SingularMatrix`] when the largest candidate pivot of a
/// column, or a diagonal entry during back substitution, is below `tolerance`.
pub fn gauss_eliminate(mut a: DMatrix<f64>, mut b: Vec<f64>, tolerance: f64) -> Result<Vec<f64>> {
    let n = b.len();
    debug_assert_eq!(a.nrows(), n);
    debug_assert_eq!(a.ncols(), n);

    for i in 0..n {
        // Largest magnitude in column i among rows i..n.
        let mut pivot_row = i;
        let mut max = 0.0;
        for row in i..n {
            let value = a[(row, i)].abs();
            if value > max {
                pivot_row = row;
                max = value;
            }
        }
        if max < tolerance {
            return Err(Error::SingularMatrix(format!(
                "largest pivot candidate {:e} in column {} is below {:e}",
                max, i, tolerance
            )));
        }

        if pivot_row != i {
            a.swap_rows(i, pivot_row);
            b.swap(i, pivot_row);
        }

        let pivot = a[(i, i)];
        for row in i + 1..n {
            let factor = a[(row, i)] / pivot;
            if factor == 0.0 {
                continue;
            }
            for col in i..n {
                let upper = a[(i, col)];
                a[(row, col)] -= factor * upper;
            }
            b[row] -= factor * b[i];
        }
    }

    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let diagonal = a[(i, i)];
        if diagonal.abs() < tolerance {
            return Err(Error::SingularMatrix(format!(
                "diagonal {:e} at row {} is below {:e}",
                diagonal, i, tolerance
            )));
        }
        let mut sum = b[i];
        for j in i + 1..n {
            sum -= x[j] * a[(i, j)];
        }
        x[i] = sum / diagonal;
    }

    Ok(x)
}

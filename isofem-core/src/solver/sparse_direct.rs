//! Sparse direct factorization using the faer library.
//!
//! The first solve fixes the solver mode, records the sparsity pattern and runs
//! the symbolic analysis (fill-reducing ordering and elimination structure).
//! Later solves against matrices with the same pattern only redo the numeric
//! factorization:
//!
//! - positive definite: sparse LLᵀ (Cholesky)
//! - indefinite symmetric: sparse LU on the expanded symmetric matrix
//!
//! Each solve is followed by a few sweeps of iterative refinement.

use crate::error::{Error, Result};
use crate::solver::{EquationSolver, SolveStats, SolverMode};
use crate::sparse::{check_system, mul_vec, CsrMatrix};
use faer::linalg::cholesky::llt::factor::LltError;
use faer::linalg::solvers::Solve;
use faer::sparse::linalg::cholesky::factorize_symbolic_cholesky;
use faer::sparse::linalg::solvers::{Llt, Lu, SymbolicLlt, SymbolicLu};
use faer::sparse::linalg::LltError as SparseLltError;
use faer::sparse::{SparseColMat, SparseColMatRef, SymbolicSparseColMat, SymbolicSparseColMatRef};
use faer::Side;
use nalgebra::DVectorView;
use std::time::Instant;

/// Compressed-column pattern of the full symmetric matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SymmetricPattern {
    col_offsets: Vec<usize>,
    row_indices: Vec<usize>,
}

/// Expand the upper triangle of `matrix` into the full symmetric matrix in
/// compressed-column form, with sorted row indices in every column.
fn expand_symmetric(matrix: &CsrMatrix) -> (SymmetricPattern, Vec<f64>) {
    let n = matrix.nrows();
    let mut columns: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
    for (row, col, &value) in matrix.triplet_iter() {
        if row <= col {
            columns[col].push((row, value));
            if row != col {
                columns[row].push((col, value));
            }
        }
    }

    let nnz = columns.iter().map(Vec::len).sum();
    let mut col_offsets = Vec::with_capacity(n + 1);
    let mut row_indices = Vec::with_capacity(nnz);
    let mut values = Vec::with_capacity(nnz);
    col_offsets.push(0);
    for column in &mut columns {
        column.sort_unstable_by_key(|&(row, _)| row);
        for &(row, value) in column.iter() {
            row_indices.push(row);
            values.push(value);
        }
        col_offsets.push(row_indices.len());
    }

    (
        SymmetricPattern {
            col_offsets,
            row_indices,
        },
        values,
    )
}

/// Place `values`, laid out on `pattern`, into the slots of `cached`.
///
/// Positions of `cached` that `pattern` lacks are zero. Returns `None` if
/// `pattern` has an entry that `cached` does not. Both patterns must have the
/// same dimension.
fn scatter_values(cached: &SymmetricPattern, pattern: &SymmetricPattern, values: &[f64]) -> Option<Vec<f64>> {
    let mut scattered = vec![0.0; cached.row_indices.len()];
    for col in 0..cached.col_offsets.len() - 1 {
        let end = cached.col_offsets[col + 1];
        let mut slot = cached.col_offsets[col];
        for k in pattern.col_offsets[col]..pattern.col_offsets[col + 1] {
            let row = pattern.row_indices[k];
            while slot < end && cached.row_indices[slot] < row {
                slot += 1;
            }
            if slot == end || cached.row_indices[slot] != row {
                return None;
            }
            scattered[slot] = values[k];
        }
    }
    Some(scattered)
}

fn symbolic_ref(n: usize, pattern: &SymmetricPattern) -> SymbolicSparseColMatRef<'_, usize> {
    // SAFETY: offsets are non-decreasing, start at 0 and end at nnz; row indices
    // are sorted, unique and below n within each column.
    unsafe {
        SymbolicSparseColMatRef::new_unchecked(n, n, &pattern.col_offsets, None, &pattern.row_indices)
    }
}

fn to_faer(n: usize, pattern: &SymmetricPattern, values: Vec<f64>) -> SparseColMat<usize, f64> {
    // SAFETY: same invariants as `symbolic_ref`.
    let symbolic = unsafe {
        SymbolicSparseColMat::new_unchecked(
            n,
            n,
            pattern.col_offsets.clone(),
            None,
            pattern.row_indices.clone(),
        )
    };
    SparseColMat::new(symbolic, values)
}

fn norm(v: &[f64]) -> f64 {
    DVectorView::from_slice(v, v.len()).norm()
}

/// Cached symbolic factorization, selected by the positive-definite flag.
enum Symbolic {
    Llt(SymbolicLlt<usize>),
    Lu(SymbolicLu<usize>),
}

/// Numeric factorization for one matrix.
enum Factor {
    Llt(Llt<usize, f64>),
    Lu(Lu<usize, f64>),
}

impl Factor {
    fn solve(&self, rhs: &[f64]) -> Vec<f64> {
        let n = rhs.len();
        let mut x = faer::Mat::from_fn(n, 1, |i, _| rhs[i]);
        match self {
            Factor::Llt(llt) => llt.solve_in_place(x.as_mut()),
            Factor::Lu(lu) => lu.solve_in_place(x.as_mut()),
        }
        (0..n).map(|i| x[(i, 0)]).collect()
    }
}

/// Sparse direct solver with cached symbolic factorization.
///
/// For repeated solves with the same sparsity pattern (load steps, multiple
/// load cases), the symbolic analysis runs once and is reused. Later matrices
/// may leave positions of the analyzed pattern empty (a coupling that became
/// exactly zero); those positions are factorized as zeros. Only symmetric
/// systems are supported; the mode flags are frozen by the first solve.
///
/// # Example
///
/// ```ignore
/// let mut solver = SparseDirectSolver::new();
/// solver.set_positive(true)?;
/// let u = solver.try_solve(&stiffness, &forces)?;
/// ```
pub struct SparseDirectSolver {
    mode: SolverMode,
    refinement_steps: usize,
    refinement_tolerance: f64,
    n_equations: usize,
    pattern: Option<SymmetricPattern>,
    symbolic: Option<Symbolic>,
    symbolic_analyses: usize,
    stats: Option<SolveStats>,
}

impl SparseDirectSolver {
    /// Create a solver for symmetric positive definite systems with two
    /// refinement sweeps.
    pub fn new() -> Self {
        Self {
            mode: SolverMode::default(),
            refinement_steps: 2,
            refinement_tolerance: 1e-14,
            n_equations: 0,
            pattern: None,
            symbolic: None,
            symbolic_analyses: 0,
            stats: None,
        }
    }

    /// Set the matrix-property flags.
    ///
    /// Fails with [`Error::Usage`] if this changes a flag after the first solve.
    pub fn with_mode(mut self, mode: SolverMode) -> Result<Self> {
        self.set_symmetric(mode.symmetric)?;
        self.set_positive(mode.positive_definite)?;
        Ok(self)
    }

    /// Set the maximum refinement sweeps and the relative residual that ends
    /// refinement early.
    pub fn with_refinement(mut self, steps: usize, tolerance: f64) -> Self {
        self.refinement_steps = steps;
        self.refinement_tolerance = tolerance;
        self
    }

    /// Number of symbolic analyses performed so far.
    pub fn symbolic_analyses(&self) -> usize {
        self.symbolic_analyses
    }

    /// Whether the symbolic factorization has been computed.
    pub fn is_analyzed(&self) -> bool {
        self.symbolic.is_some()
    }

    fn check_mode_change(&self, what: &str, current: bool, requested: bool) -> Result<()> {
        if self.is_analyzed() && current != requested {
            return Err(Error::Usage(format!(
                "cannot change the {} flag after the first solve",
                what
            )));
        }
        Ok(())
    }

    /// Run the symbolic analysis on `pattern` and keep both.
    fn analyze(&mut self, n: usize, pattern: SymmetricPattern) -> Result<()> {
        if !self.mode.symmetric {
            return Err(Error::Usage(
                "sparse direct solver supports only symmetric matrices".into(),
            ));
        }

        let structure = symbolic_ref(n, &pattern);
        let symbolic = if self.mode.positive_definite {
            log::info!("sparse direct solver will use the positive definite symmetric factorization");
            let symbolic = SymbolicLlt::try_new(structure, Side::Lower)
                .map_err(|e| Error::Factorization(format!("symbolic analysis failed: {:?}", e)))?;
            Symbolic::Llt(symbolic)
        } else {
            log::info!("sparse direct solver will use the indefinite symmetric factorization");
            let symbolic = SymbolicLu::try_new(structure)
                .map_err(|e| Error::Factorization(format!("symbolic analysis failed: {:?}", e)))?;
            Symbolic::Lu(symbolic)
        };

        log::info!(
            "symbolic analysis of {} equations with {} stored non-zeros",
            n,
            pattern.row_indices.len()
        );
        if log::log_enabled!(log::Level::Info) {
            log_factor_fill(structure);
        }

        self.symbolic = Some(symbolic);
        self.symbolic_analyses += 1;
        self.n_equations = n;
        self.pattern = Some(pattern);
        Ok(())
    }

    fn factorize(&self, matrix: SparseColMatRef<'_, usize, f64>) -> Result<Factor> {
        match &self.symbolic {
            Some(Symbolic::Llt(symbolic)) => {
                Llt::try_new_with_symbolic(symbolic.clone(), matrix, Side::Lower)
                    .map(Factor::Llt)
                    .map_err(|e| match e {
                        SparseLltError::Generic(err) => Error::Factorization(format!(
                            "sparse Cholesky error: {:?}",
                            err
                        )),
                        SparseLltError::Numeric(LltError::NonPositivePivot { index }) => {
                            Error::SingularMatrix(format!(
                                "matrix is not positive definite at pivot {}",
                                index
                            ))
                        }
                    })
            }
            Some(Symbolic::Lu(symbolic)) => Lu::try_new_with_symbolic(symbolic.clone(), matrix)
                .map(Factor::Lu)
                .map_err(|e| Error::Factorization(format!("sparse LU error: {:?}", e))),
            None => Err(Error::Usage("symbolic factorization is missing".into())),
        }
    }

    /// Iterative refinement: `r = b - A x`, solve `A d = r`, `x += d`.
    ///
    /// Returns the refined solution, the corrections applied and the final
    /// relative residual.
    fn refine(&self, matrix: &CsrMatrix, rhs: &[f64], factor: &Factor, mut x: Vec<f64>) -> (Vec<f64>, usize, f64) {
        let b_norm = norm(rhs);
        let mut sweeps = 0;
        loop {
            let ax = mul_vec(matrix, &x, true);
            let residual: Vec<f64> = rhs.iter().zip(&ax).map(|(b, a)| b - a).collect();
            let r_norm = norm(&residual);
            let relative = if b_norm > 0.0 { r_norm / b_norm } else { r_norm };
            log::debug!("refinement step {}: relative residual {:e}", sweeps, relative);
            if sweeps == self.refinement_steps || relative <= self.refinement_tolerance {
                return (x, sweeps, relative);
            }

            let correction = factor.solve(&residual);
            for (xi, di) in x.iter_mut().zip(correction) {
                *xi += di;
            }
            sweeps += 1;
        }
    }
}

/// Log the number of non-zeros in the Cholesky factor of `structure` under the
/// default fill-reducing ordering. For the indefinite factorization this is an
/// estimate of the fill of L.
fn log_factor_fill(structure: SymbolicSparseColMatRef<'_, usize>) {
    match factorize_symbolic_cholesky(structure, Side::Lower, Default::default(), Default::default()) {
        Ok(cholesky) => log::info!("number of non-zeros in factors: {}", cholesky.len_val()),
        Err(e) => log::warn!("could not estimate factor fill: {:?}", e),
    }
}

impl Default for SparseDirectSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl EquationSolver for SparseDirectSolver {
    fn try_solve(&mut self, matrix: &CsrMatrix, rhs: &[f64]) -> Result<Vec<f64>> {
        let n = check_system(matrix, rhs)?;
        if n == 0 {
            return Ok(vec![]);
        }

        let start = Instant::now();
        let (pattern, values) = expand_symmetric(matrix);
        let values = if let Some(cached) = &self.pattern {
            if n != self.n_equations {
                return Err(Error::Usage(format!(
                    "factorization was set up for {} equations, got {}",
                    self.n_equations, n
                )));
            }
            scatter_values(cached, &pattern, &values).ok_or_else(|| {
                Error::Usage("matrix has entries outside the analyzed sparsity pattern".into())
            })?
        } else {
            self.analyze(n, pattern)?;
            values
        };

        let cached = self
            .pattern
            .as_ref()
            .ok_or_else(|| Error::Usage("sparsity pattern is missing".into()))?;
        let csc = to_faer(n, cached, values);
        let factor = self.factorize(csc.as_ref())?;
        let (x, sweeps, residual) = self.refine(matrix, rhs, &factor, factor.solve(rhs));

        if x.iter().any(|v| !v.is_finite()) {
            return Err(Error::SingularMatrix(
                "factorization produced a non-finite solution".into(),
            ));
        }

        let stats = SolveStats {
            solver: self.name().to_string(),
            n_equations: n,
            refinement_steps: Some(sweeps),
            residual: Some(residual),
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
        self.check_mode_change("symmetric", self.mode.symmetric, symmetric)?;
        self.mode.symmetric = symmetric;
        Ok(())
    }

    fn set_positive(&mut self, positive: bool) -> Result<()> {
        self.check_mode_change("positive definite", self.mode.positive_definite, positive)?;
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
        "faer sparse direct"
    }
}

impl Drop for SparseDirectSolver {
    fn drop(&mut self) {
        if self.symbolic.take().is_some() {
            log::debug!(
                "released symbolic factorization for {} equations",
                self.n_equations
            );
        }
    }
}

//! Sparse matrix boundary.
//!
//! The global matrix is owned by the assembly layer and handed to the solvers in
//! CSR (Compressed Sparse Row) format. Symmetric systems may be stored either in
//! full or as their upper triangle only: when a caller declares a matrix
//! symmetric, only entries with `row <= col` are read and the lower triangle is
//! implied.

use crate::error::{Error, Result};
use nalgebra::{DMatrix, DVectorView};
use nalgebra_sparse::coo::CooMatrix;
use nalgebra_sparse::csr::CsrMatrix as NalgebraCsr;

/// Compressed Sparse Row matrix.
pub type CsrMatrix = NalgebraCsr<f64>;

/// Element-by-element accumulator for a global matrix.
///
/// Entries landing on the same position are summed when the matrix is frozen
/// into CSR. Exact zeros are skipped; any other value is kept however small, so
/// the solver thresholds alone decide what counts as negligible.
#[derive(Debug, Clone)]
pub struct TripletMatrix {
    shape: (usize, usize),
    entries: Vec<(usize, usize, f64)>,
}

impl TripletMatrix {
    /// Empty `n_rows × n_cols` accumulator.
    pub fn new(n_rows: usize, n_cols: usize) -> Self {
        Self::with_capacity(n_rows, n_cols, 0)
    }

    /// Empty accumulator with room for `capacity` entries.
    pub fn with_capacity(n_rows: usize, n_cols: usize, capacity: usize) -> Self {
        Self {
            shape: (n_rows, n_cols),
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Accumulate `value` at `(row, col)`.
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        if value != 0.0 {
            self.entries.push((row, col, value));
        }
    }

    /// Add both `(row, col)` and its mirror `(col, row)`.
    pub fn add_symmetric(&mut self, row: usize, col: usize, value: f64) {
        self.add(row, col, value);
        if row != col {
            self.add(col, row, value);
        }
    }

    /// Scatter a square element block onto the global positions `indices`.
    pub fn add_submatrix(&mut self, indices: &[usize], block: &DMatrix<f64>) {
        debug_assert_eq!(block.shape(), (indices.len(), indices.len()));

        for (j, &col) in indices.iter().enumerate() {
            for (i, &row) in indices.iter().enumerate() {
                self.add(row, col, block[(i, j)]);
            }
        }
    }

    /// Freeze the accumulated entries into CSR.
    ///
    /// Fails when an entry lies outside the declared shape.
    pub fn to_csr(&self) -> Result<CsrMatrix> {
        let (n_rows, n_cols) = self.shape;
        let mut coo = CooMatrix::new(n_rows, n_cols);
        for &(row, col, value) in &self.entries {
            if row >= n_rows || col >= n_cols {
                return Err(Error::Solver(format!(
                    "entry ({}, {}) lies outside a {}x{} matrix",
                    row, col, n_rows, n_cols
                )));
            }
            coo.push(row, col, value);
        }
        Ok(CsrMatrix::from(&coo))
    }
}

/// Check that `matrix` is square and `rhs` matches its dimension.
pub(crate) fn check_system(matrix: &CsrMatrix, rhs: &[f64]) -> Result<usize> {
    let n = matrix.nrows();
    if n != matrix.ncols() {
        return Err(Error::Solver(format!(
            "Matrix must be square, got {}x{}",
            n,
            matrix.ncols()
        )));
    }
    if n != rhs.len() {
        return Err(Error::Solver(format!(
            "RHS size mismatch: matrix has {} rows, rhs has {} entries",
            n,
            rhs.len()
        )));
    }
    Ok(n)
}

/// Expand a sparse matrix into a dense one.
///
/// With `symmetric` set, the upper triangle is mirrored into the lower one and
/// any stored lower entries are ignored. Memory is O(n²).
pub fn to_dense(matrix: &CsrMatrix, symmetric: bool) -> DMatrix<f64> {
    let mut dense = DMatrix::zeros(matrix.nrows(), matrix.ncols());
    for (row, col, &value) in matrix.triplet_iter() {
        if !symmetric {
            dense[(row, col)] += value;
        } else if row <= col {
            dense[(row, col)] += value;
            if row != col {
                dense[(col, row)] += value;
            }
        }
    }
    dense
}

/// Compute `y = A x`, reading `A` the same way [`to_dense`] does.
pub fn mul_vec(matrix: &CsrMatrix, x: &[f64], symmetric: bool) -> Vec<f64> {
    debug_assert_eq!(matrix.ncols(), x.len());

    let mut y = vec![0.0; matrix.nrows()];
    for (row, col, &value) in matrix.triplet_iter() {
        if !symmetric {
            y[row] += value * x[col];
        } else if row <= col {
            y[row] += value * x[col];
            if row != col {
                y[col] += value * x[row];
            }
        }
    }
    y
}

/// Relative residual `‖A x − b‖ / ‖b‖`.
///
/// Falls back to the absolute residual when `b` is zero.
pub fn relative_residual(matrix: &CsrMatrix, x: &[f64], b: &[f64], symmetric: bool) -> f64 {
    let ax = mul_vec(matrix, x, symmetric);
    let b = DVectorView::from_slice(b, b.len());
    let r_norm = (DVectorView::from_slice(&ax, ax.len()) - &b).norm();
    let b_norm = b.norm();
    if b_norm > 0.0 {
        r_norm / b_norm
    } else {
        r_norm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_triplet_to_csr() {
        let mut triplet = TripletMatrix::new(3, 3);
        triplet.add(0, 0, 1.0);
        triplet.add(1, 1, 2.0);
        triplet.add(2, 2, 3.0);
        triplet.add_symmetric(0, 1, 0.5);

        let csr = triplet.to_csr().unwrap();
        assert_eq!(csr.nrows(), 3);
        assert_eq!(csr.ncols(), 3);
        assert_eq!(csr.nnz(), 5);
    }

    #[test]
    fn test_duplicate_summation() {
        let mut triplet = TripletMatrix::new(2, 2);
        triplet.add(0, 0, 1.0);
        triplet.add(0, 0, 2.0);
        triplet.add(0, 0, 3.0);

        let csr = triplet.to_csr().unwrap();
        let dense = to_dense(&csr, false);
        assert_relative_eq!(dense[(0, 0)], 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_submatrix_assembly() {
        let mut triplet = TripletMatrix::new(6, 6);
        let indices = vec![0, 1, 3, 4];
        let block = DMatrix::from_row_slice(4, 4, &[
            1.0, 0.5, 0.1, 0.0,
            0.5, 2.0, 0.0, 0.2,
            0.1, 0.0, 1.5, 0.3,
            0.0, 0.2, 0.3, 2.5,
        ]);

        triplet.add_submatrix(&indices, &block);

        let dense = to_dense(&triplet.to_csr().unwrap(), false);
        assert_relative_eq!(dense[(0, 0)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(dense[(0, 3)], 0.1, epsilon = 1e-12);
        assert_relative_eq!(dense[(3, 4)], 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_upper_storage_matches_full_storage() {
        let mut full = TripletMatrix::new(3, 3);
        let mut upper = TripletMatrix::new(3, 3);
        for i in 0..3 {
            full.add(i, i, 4.0);
            upper.add(i, i, 4.0);
        }
        full.add_symmetric(0, 2, -1.0);
        full.add_symmetric(1, 2, 2.0);
        upper.add(0, 2, -1.0);
        upper.add(1, 2, 2.0);

        let full = full.to_csr().unwrap();
        let upper = upper.to_csr().unwrap();
        assert_eq!(to_dense(&full, true), to_dense(&upper, true));
        assert_eq!(to_dense(&full, true), to_dense(&full, false));

        let x = [1.0, -2.0, 0.5];
        let y_full = mul_vec(&full, &x, false);
        let y_upper = mul_vec(&upper, &x, true);
        for (a, b) in y_full.iter().zip(&y_upper) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_relative_residual_of_exact_solution() {
        let mut triplet = TripletMatrix::new(2, 2);
        triplet.add(0, 0, 2.0);
        triplet.add(1, 1, 4.0);
        let csr = triplet.to_csr().unwrap();

        assert_relative_eq!(relative_residual(&csr, &[1.0, 0.5], &[2.0, 2.0], true), 0.0);
        assert!(relative_residual(&csr, &[0.0, 0.0], &[2.0, 2.0], true) > 0.9);
    }

    #[test]
    fn test_tiny_entries_survive_assembly() {
        let mut triplet = TripletMatrix::new(2, 2);
        triplet.add(0, 0, 1e-17);
        triplet.add(1, 1, 1e-17);
        triplet.add(0, 1, 0.0);

        let csr = triplet.to_csr().unwrap();
        assert_eq!(csr.nnz(), 2);
        assert_eq!(to_dense(&csr, true)[(1, 1)], 1e-17);
    }

    #[test]
    fn test_out_of_range_entry_rejected() {
        let mut triplet = TripletMatrix::new(2, 2);
        triplet.add(2, 0, 1.0);
        assert!(matches!(triplet.to_csr(), Err(Error::Solver(_))));
    }

    #[test]
    fn test_check_system_rejects_bad_shapes() {
        let csr = TripletMatrix::new(2, 3).to_csr().unwrap();
        assert!(matches!(check_system(&csr, &[0.0, 0.0]), Err(Error::Solver(_))));

        let csr = TripletMatrix::new(2, 2).to_csr().unwrap();
        assert!(matches!(check_system(&csr, &[0.0]), Err(Error::Solver(_))));
        assert_eq!(check_system(&csr, &[0.0, 0.0]).unwrap(), 2);
    }
}

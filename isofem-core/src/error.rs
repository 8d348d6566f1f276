//! Error types for solver and element-formulation operations.

use thiserror::Error;

/// Result type alias using the crate [`enum@Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while solving systems or evaluating element geometry.
#[derive(Error, Debug)]
pub enum Error {
    /// Element-family or geometry input errors.
    #[error("element error: {0}")]
    Element(String),

    /// Malformed solver input (non-square matrix, size mismatch).
    #[error("solver error: {0}")]
    Solver(String),

    /// Matrix singularity or a pivot below the solver tolerance.
    #[error("singular matrix: {0}")]
    SingularMatrix(String),

    /// Symbolic or numeric factorization reported failure.
    #[error("factorization failed: {0}")]
    Factorization(String),

    /// Solver used against its contract (mode changed after first solve, pattern changed).
    #[error("invalid solver usage: {0}")]
    Usage(String),

    /// Requested strategy is not compiled into this build.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

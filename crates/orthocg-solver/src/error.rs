//! Error types for the solver.

use thiserror::Error;

/// Errors raised before the CG engine runs.
///
/// Numeric breakdown during the iteration is not an error: it is reported
/// through [`CgFlag::NumericFailure`](crate::cg::CgFlag::NumericFailure) on the
/// returned result.
#[derive(Debug, Error)]
pub enum Error {
    /// The coefficient matrix is not square.
    #[error("matrix must be square, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    /// The coefficient matrix is not exactly symmetric.
    #[error("matrix must be symmetric, A[{row}][{col}] != A[{col}][{row}]")]
    NotSymmetric { row: usize, col: usize },

    /// The right-hand side does not match the matrix dimension.
    #[error("right-hand side has length {actual}, expected {expected}")]
    RhsSizeMismatch { expected: usize, actual: usize },

    /// The initial guess does not match the matrix dimension.
    #[error("initial guess has length {actual}, expected {expected}")]
    GuessSizeMismatch { expected: usize, actual: usize },

    /// The tolerance is not a positive finite number.
    #[error("tolerance must be positive and finite, got {0}")]
    InvalidTolerance(f64),

    /// Sparse matrix construction failed.
    #[error("invalid sparse matrix: {0}")]
    InvalidSparseMatrix(String),

    /// Writing the status report failed.
    #[error("failed to write status report: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true for the input validation kinds.
    pub fn is_input_error(&self) -> bool {
        !matches!(self, Error::Io(_))
    }
}

/// Result type for solver operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_square_reports_dimensions() {
        let err = Error::NotSquare { rows: 2, cols: 3 };
        assert_eq!(err.to_string(), "matrix must be square, got 2x3");
        assert!(err.is_input_error());
    }

    #[test]
    fn io_error_is_not_input_error() {
        let err: Error = std::io::Error::other("closed").into();
        assert!(!err.is_input_error());
    }
}

//! Input validation performed before the CG engine runs.
//!
//! A [`ValidatedSystem`] can only be obtained through the functions in this
//! module, so the engine never sees a non-square operator, an asymmetric
//! matrix or mismatched vector lengths.

use nalgebra::{DMatrix, DVector};

use crate::error::{Error, Result};
use crate::operator::{DenseRealOperator, RealOperator};
use crate::sparse_operator::SparseRealOperator;

/// A linear system that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedSystem<'a, A: RealOperator> {
    operator: A,
    rhs: &'a [f64],
    initial_guess: Vec<f64>,
}

impl<'a, A: RealOperator> ValidatedSystem<'a, A> {
    /// The coefficient operator.
    pub fn operator(&self) -> &A {
        &self.operator
    }

    /// The right-hand side.
    pub fn rhs(&self) -> &'a [f64] {
        self.rhs
    }

    /// The initial guess (zero when none was supplied).
    pub fn initial_guess(&self) -> &[f64] {
        &self.initial_guess
    }

    /// System dimension.
    pub fn dim(&self) -> usize {
        self.operator.dim()
    }
}

/// Validate a dense system.
///
/// Checks, in order: A is square, A is exactly symmetric, `b` and `x0` have
/// length n. A missing `x0` becomes the zero vector.
pub fn validate_dense<'a>(
    a: &'a DMatrix<f64>,
    b: &'a DVector<f64>,
    x0: Option<&DVector<f64>>,
) -> Result<ValidatedSystem<'a, DenseRealOperator<'a>>> {
    let (rows, cols) = a.shape();
    if rows != cols {
        return Err(Error::NotSquare { rows, cols });
    }

    if let Some((row, col)) = first_dense_asymmetry(a) {
        return Err(Error::NotSymmetric { row, col });
    }

    let initial_guess = check_vectors(rows, b.as_slice(), x0.map(|v| v.as_slice()))?;
    Ok(ValidatedSystem {
        operator: DenseRealOperator::new(a),
        rhs: b.as_slice(),
        initial_guess,
    })
}

/// Validate a sparse system.
///
/// Same checks as [`validate_dense`]; symmetry is checked on the stored
/// entries with missing entries treated as zero.
pub fn validate_sparse<'a>(
    a: &'a SparseRealOperator,
    b: &'a [f64],
    x0: Option<&[f64]>,
) -> Result<ValidatedSystem<'a, &'a SparseRealOperator>> {
    let (rows, cols) = (a.nrows(), a.ncols());
    if rows != cols {
        return Err(Error::NotSquare { rows, cols });
    }

    if let Some((row, col)) = a.first_asymmetry() {
        return Err(Error::NotSymmetric { row, col });
    }

    let initial_guess = check_vectors(rows, b, x0)?;
    Ok(ValidatedSystem {
        operator: a,
        rhs: b,
        initial_guess,
    })
}

fn check_vectors(n: usize, b: &[f64], x0: Option<&[f64]>) -> Result<Vec<f64>> {
    if b.len() != n {
        return Err(Error::RhsSizeMismatch {
            expected: n,
            actual: b.len(),
        });
    }

    match x0 {
        Some(x0) if x0.len() != n => Err(Error::GuessSizeMismatch {
            expected: n,
            actual: x0.len(),
        }),
        Some(x0) => Ok(x0.to_vec()),
        None => Ok(vec![0.0; n]),
    }
}

/// First `(row, col)` below the diagonal with `A[row][col] != A[col][row]`.
fn first_dense_asymmetry(a: &DMatrix<f64>) -> Option<(usize, usize)> {
    let n = a.nrows();
    for col in 0..n {
        for row in (col + 1)..n {
            if a[(row, col)] != a[(col, row)] {
                return Some((row, col));
            }
        }
    }
    None
}

//! Linear operator abstraction for iterative solvers.
//!
//! The CG engine never looks at matrix entries directly. It only needs
//! `y = A * x`, so anything implementing [`RealOperator`] can be solved.

use nalgebra::{DMatrix, DVectorView, DVectorViewMut};

/// A real-valued linear operator `y = A * x`.
pub trait RealOperator: Send + Sync {
    /// Dimension n of the (square) operator.
    fn dim(&self) -> usize;

    /// Apply the operator: y = A * x.
    ///
    /// `y` is fully overwritten.
    fn apply(&self, x: &[f64], y: &mut [f64]);
}

impl<T: RealOperator + ?Sized> RealOperator for &T {
    fn dim(&self) -> usize {
        (**self).dim()
    }

    fn apply(&self, x: &[f64], y: &mut [f64]) {
        (**self).apply(x, y)
    }
}

/// Dense operator borrowing a caller-owned nalgebra matrix.
///
/// The matrix is assumed square; use
/// [`validate_dense`](crate::validate::validate_dense) to check it first.
#[derive(Debug, Clone, Copy)]
pub struct DenseRealOperator<'a> {
    matrix: &'a DMatrix<f64>,
}

impl<'a> DenseRealOperator<'a> {
    /// Wrap a matrix.
    pub fn new(matrix: &'a DMatrix<f64>) -> Self {
        Self { matrix }
    }

    /// Get a reference to the underlying matrix.
    pub fn matrix(&self) -> &'a DMatrix<f64> {
        self.matrix
    }
}

impl RealOperator for DenseRealOperator<'_> {
    fn dim(&self) -> usize {
        self.matrix.nrows()
    }

    fn apply(&self, x: &[f64], y: &mut [f64]) {
        let n = self.matrix.nrows();
        assert_eq!(x.len(), self.matrix.ncols());
        assert_eq!(y.len(), n);

        let xv = DVectorView::from_slice(x, x.len());
        let mut yv = DVectorViewMut::from_slice(y, n);
        yv.gemv(1.0, self.matrix, &xv, 0.0);
    }
}

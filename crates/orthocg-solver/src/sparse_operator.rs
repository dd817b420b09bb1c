//! Sparse matrix operator for the CG engine.
//!
//! Wraps faer's sparse column matrices so a system assembled from
//! `(row, col, value)` triplets can be solved without densifying it.

use std::collections::HashMap;

use faer::sparse::{SparseColMat, Triplet};

use crate::error::{Error, Result};
use crate::operator::RealOperator;

/// Sparse real-valued operator.
///
/// Wraps a faer `SparseColMat<usize, f64>` in CSC layout.
pub struct SparseRealOperator {
    matrix: SparseColMat<usize, f64>,
}

impl SparseRealOperator {
    /// Create from an existing sparse matrix.
    pub fn from_matrix(matrix: SparseColMat<usize, f64>) -> Self {
        Self { matrix }
    }

    /// Create a square `size x size` operator from triplets (row, col, value).
    ///
    /// Duplicate entries at the same position are summed.
    pub fn from_triplets(size: usize, triplets: &[(usize, usize, f64)]) -> Result<Self> {
        if let Some(&(r, c, _)) = triplets.iter().find(|&&(r, c, _)| r >= size || c >= size) {
            return Err(Error::InvalidSparseMatrix(format!(
                "entry ({}, {}) is outside a {}x{} matrix",
                r, c, size, size
            )));
        }

        let faer_triplets: Vec<_> = triplets
            .iter()
            .map(|&(r, c, v)| Triplet::new(r, c, v))
            .collect();

        SparseColMat::<usize, f64>::try_new_from_triplets(size, size, &faer_triplets)
            .map(|matrix| Self { matrix })
            .map_err(|e| Error::InvalidSparseMatrix(format!("{:?}", e)))
    }

    /// Get a reference to the underlying matrix.
    pub fn matrix(&self) -> &SparseColMat<usize, f64> {
        &self.matrix
    }

    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.matrix.nrows()
    }

    /// Number of columns.
    pub fn ncols(&self) -> usize {
        self.matrix.ncols()
    }

    /// Find the first stored entry whose transpose differs from it.
    ///
    /// Comparison is exact. Missing entries count as zero, so an explicitly
    /// stored zero matches an absent transpose. Entries are scanned in
    /// column-major order and the position is returned as `(row, col)`.
    pub fn first_asymmetry(&self) -> Option<(usize, usize)> {
        let mat_ref = self.matrix.as_ref();
        let col_ptrs = mat_ref.col_ptr();
        let row_indices = mat_ref.row_idx();
        let values = mat_ref.val();

        let mut entries: HashMap<(usize, usize), f64> = HashMap::with_capacity(values.len());
        for j in 0..self.matrix.ncols() {
            for idx in col_ptrs[j]..col_ptrs[j + 1] {
                *entries.entry((row_indices[idx], j)).or_insert(0.0) += values[idx];
            }
        }

        for j in 0..self.matrix.ncols() {
            for idx in col_ptrs[j]..col_ptrs[j + 1] {
                let i = row_indices[idx];
                let aij = entries[&(i, j)];
                let aji = entries.get(&(j, i)).copied().unwrap_or(0.0);
                if aij != aji {
                    return Some((i, j));
                }
            }
        }
        None
    }
}

impl std::fmt::Debug for SparseRealOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparseRealOperator")
            .field("nrows", &self.matrix.nrows())
            .field("ncols", &self.matrix.ncols())
            .field("nnz", &self.matrix.as_ref().val().len())
            .finish()
    }
}

impl RealOperator for SparseRealOperator {
    fn dim(&self) -> usize {
        self.matrix.nrows()
    }

    fn apply(&self, x: &[f64], y: &mut [f64]) {
        let n = self.matrix.nrows();
        assert_eq!(x.len(), self.matrix.ncols());
        assert_eq!(y.len(), n);

        y.iter_mut().for_each(|yi| *yi = 0.0);

        // CSC: add A[:, j] * x[j] to y for each column j
        let mat_ref = self.matrix.as_ref();
        let col_ptrs = mat_ref.col_ptr();
        let row_indices = mat_ref.row_idx();
        let values = mat_ref.val();

        for (j, &xj) in x.iter().enumerate() {
            for idx in col_ptrs[j]..col_ptrs[j + 1] {
                y[row_indices[idx]] += values[idx] * xj;
            }
        }
    }
}

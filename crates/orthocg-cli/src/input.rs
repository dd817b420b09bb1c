//! Loading linear systems from JSON files.
//!
//! ```json
//! { "matrix": [[4.0, 1.0], [1.0, 3.0]], "rhs": [1.0, 2.0], "x0": [0.0, 0.0] }
//! ```
//!
//! The matrix may also be given as triplets:
//! `{ "size": 2, "triplets": [[0, 0, 4.0], [0, 1, 1.0], [1, 0, 1.0], [1, 1, 3.0]] }`.

use std::path::Path;

use anyhow::{Context, Result, bail};
use nalgebra::{DMatrix, DVector};
use orthocg_solver::SparseRealOperator;
use serde::Deserialize;

/// Raw contents of a system file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SystemFile {
    matrix: MatrixInput,
    rhs: Vec<f64>,
    #[serde(default)]
    x0: Option<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MatrixInput {
    /// Row-major dense rows.
    Dense(Vec<Vec<f64>>),
    /// `(row, col, value)` entries of a `size x size` matrix.
    Sparse {
        size: usize,
        triplets: Vec<(usize, usize, f64)>,
    },
}

/// A system ready for validation.
#[derive(Debug)]
pub enum LoadedSystem {
    Dense {
        a: DMatrix<f64>,
        b: DVector<f64>,
        x0: Option<DVector<f64>>,
    },
    Sparse {
        a: SparseRealOperator,
        b: Vec<f64>,
        x0: Option<Vec<f64>>,
    },
}

impl LoadedSystem {
    /// Short description for log messages.
    pub fn describe(&self) -> String {
        match self {
            LoadedSystem::Dense { a, .. } => format!("dense {}x{}", a.nrows(), a.ncols()),
            LoadedSystem::Sparse { a, .. } => format!("sparse {}x{}", a.nrows(), a.ncols()),
        }
    }
}

/// Read and parse a system file.
pub fn load_system(path: &Path) -> Result<LoadedSystem> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_system(&text).with_context(|| format!("failed to parse {}", path.display()))
}

/// Parse a system from JSON text.
pub fn parse_system(text: &str) -> Result<LoadedSystem> {
    let file: SystemFile = serde_json::from_str(text)?;

    match file.matrix {
        MatrixInput::Dense(rows) => Ok(LoadedSystem::Dense {
            a: dense_from_rows(&rows)?,
            b: DVector::from_vec(file.rhs),
            x0: file.x0.map(DVector::from_vec),
        }),
        MatrixInput::Sparse { size, triplets } => Ok(LoadedSystem::Sparse {
            a: SparseRealOperator::from_triplets(size, &triplets)?,
            b: file.rhs,
            x0: file.x0,
        }),
    }
}

fn dense_from_rows(rows: &[Vec<f64>]) -> Result<DMatrix<f64>> {
    let ncols = rows.first().map_or(0, |r| r.len());
    if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != ncols) {
        bail!("matrix row {} has {} entries, expected {}", i, row.len(), ncols);
    }
    Ok(DMatrix::from_fn(rows.len(), ncols, |i, j| rows[i][j]))
}

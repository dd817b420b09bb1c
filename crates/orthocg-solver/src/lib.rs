//! Conjugate gradient solver for symmetric positive-definite systems.
//!
//! The solver keeps every residual it produces and re-orthogonalizes each new
//! residual against all of them, so its iterates follow exact-arithmetic CG
//! closely even after many iterations.
//!
//! Control flow is validator → engine → optional reporter:
//!
//! ```
//! use nalgebra::{DMatrix, DVector};
//! use orthocg_solver::{CgConfig, CgFlag, solve_cg, validate_dense};
//!
//! let a = DMatrix::from_row_slice(3, 3, &[4.0, 1.0, 0.0, 1.0, 3.0, 1.0, 0.0, 1.0, 2.0]);
//! let b = DVector::from_vec(vec![1.0, 2.0, 3.0]);
//!
//! let system = validate_dense(&a, &b, None)?;
//! let result = solve_cg(&system, &CgConfig::default())?;
//!
//! assert_eq!(result.flag, CgFlag::Converged);
//! assert_eq!(result.residual_norms.len(), result.iterations + 2);
//! # Ok::<(), orthocg_solver::Error>(())
//! ```

pub mod cg;
pub mod error;
pub mod operator;
pub mod report;
pub mod sparse_operator;
pub mod validate;

pub use cg::{
    CgConfig, CgFlag, CgResult, NumericFault, ResidualHistory, solve_cg, solve_cg_operator,
};
pub use error::{Error, Result};
pub use operator::{DenseRealOperator, RealOperator};
pub use report::{StatusLine, solve_primary, solve_primary_to, write_status};
pub use sparse_operator::SparseRealOperator;
pub use validate::{ValidatedSystem, validate_dense, validate_sparse};

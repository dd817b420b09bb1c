//! Conjugate gradient solver with residual re-orthogonalization.
//!
//! Plain CG loses orthogonality between successive residuals in floating
//! point, which slows convergence and breaks the n-step termination bound.
//! This solver stores every residual and projects the new residual against
//! all of them twice per iteration (classical Gram-Schmidt, repeated), which
//! keeps the residuals orthogonal to near machine precision at a cost of
//! O(i·n) extra work per iteration.
//!
//! # Usage
//!
//! ```
//! use nalgebra::{DMatrix, DVector};
//! use orthocg_solver::cg::{CgConfig, CgFlag, solve_cg};
//! use orthocg_solver::validate::validate_dense;
//!
//! let a = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
//! let b = DVector::from_vec(vec![1.0, 2.0]);
//!
//! let system = validate_dense(&a, &b, None).unwrap();
//! let result = solve_cg(&system, &CgConfig::default().with_tol(1e-10)).unwrap();
//! assert_eq!(result.flag, CgFlag::Converged);
//! ```
//!
//! # Module Structure
//!
//! - [`engine`] - Iteration state and the solve entry points
//! - [`history`] - Stored residuals and the double-pass projection

pub mod engine;
pub mod history;

pub use engine::{solve_cg, solve_cg_operator};
pub use history::ResidualHistory;

use crate::error::{Error, Result};

/// Default relative tolerance.
pub const DEFAULT_TOL: f64 = 1e-6;

/// Upper bound for the default iteration limit (`min(n, 20)`).
pub const DEFAULT_MAX_ITER_CAP: usize = 20;

/// CG solver configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CgConfig {
    /// Relative tolerance on `‖b - A·x‖ / ‖b‖`.
    pub tol: f64,
    /// Maximum number of iterations. `None` means `min(n, 20)`.
    pub max_iter: Option<usize>,
}

impl Default for CgConfig {
    fn default() -> Self {
        Self {
            tol: DEFAULT_TOL,
            max_iter: None,
        }
    }
}

impl CgConfig {
    /// Set the relative tolerance.
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Set an explicit iteration limit.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = Some(max_iter);
        self
    }

    /// Iteration limit for a system of dimension `n`.
    pub fn max_iter_for(&self, n: usize) -> usize {
        self.max_iter.unwrap_or(n.min(DEFAULT_MAX_ITER_CAP))
    }

    /// Check that the tolerance is positive and finite.
    pub fn validate(&self) -> Result<()> {
        if self.tol.is_finite() && self.tol > 0.0 {
            Ok(())
        } else {
            Err(Error::InvalidTolerance(self.tol))
        }
    }
}

/// Terminal state of a CG solve.
///
/// The discriminants are the legacy integer flag codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgFlag {
    /// The residual dropped below `tol · ‖b‖`.
    Converged = 0,
    /// The iteration limit was reached first.
    MaxIterationsReached = 1,
    /// A scalar in the recurrence became zero, subnormal or non-finite.
    NumericFailure = 4,
}

impl CgFlag {
    /// Legacy integer code.
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Returns true if the solve converged.
    pub fn is_converged(&self) -> bool {
        matches!(self, CgFlag::Converged)
    }
}

impl std::fmt::Display for CgFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CgFlag::Converged => write!(f, "converged"),
            CgFlag::MaxIterationsReached => write!(f, "max iterations reached"),
            CgFlag::NumericFailure => write!(f, "numeric failure"),
        }
    }
}

/// Which scalar of the recurrence broke down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericFault {
    /// `p·Ap` was zero, subnormal or non-finite.
    Curvature,
    /// `alpha = r2 / p·Ap` was non-finite.
    StepLength,
    /// `r2 = r·r` was non-finite.
    ResidualNorm,
    /// `beta` had a zero divisor or was non-finite.
    DirectionUpdate,
}

impl std::fmt::Display for NumericFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NumericFault::Curvature => write!(f, "curvature p'Ap"),
            NumericFault::StepLength => write!(f, "step length alpha"),
            NumericFault::ResidualNorm => write!(f, "residual norm"),
            NumericFault::DirectionUpdate => write!(f, "direction update beta"),
        }
    }
}

/// Result of a CG solve.
#[derive(Debug, Clone)]
pub struct CgResult {
    /// Solution vector.
    pub x: Vec<f64>,
    /// Terminal state.
    pub flag: CgFlag,
    /// Final relative residual `‖r‖ / ‖b‖` (0 on numeric failure).
    ///
    /// When `b` is the zero vector this is the absolute norm `‖r‖`, not
    /// infinity.
    pub relative_residual: f64,
    /// Reported iteration index (see [`solve_cg_operator`] for the numbering).
    pub iterations: usize,
    /// Residual norm after every completed iteration, starting with the
    /// initial residual.
    ///
    /// A residual is stored only once its squared norm is finite, so a
    /// [`NumericFault::ResidualNorm`] failure leaves the failing iteration
    /// out.
    pub residual_norms: Vec<f64>,
    /// The scalar that broke down, when `flag` is `NumericFailure`.
    pub fault: Option<NumericFault>,
}

impl CgResult {
    /// Returns true if the solve converged.
    pub fn converged(&self) -> bool {
        self.flag.is_converged()
    }
}

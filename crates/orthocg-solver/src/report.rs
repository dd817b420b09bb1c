//! Human-readable status reporting.
//!
//! Callers that inspect [`CgResult::flag`] get no narration. The
//! solution-only entry points ([`solve_primary`], [`solve_primary_to`]) return
//! just `x`, so they describe the outcome with a status line instead.

use std::fmt;
use std::io::{self, Write};

use nalgebra::{DMatrix, DVector};

use crate::cg::{CgConfig, CgFlag, CgResult, solve_cg};
use crate::error::Result;
use crate::validate::validate_dense;

/// Diagnostic printed when the recurrence breaks down.
pub const NUMERIC_FAILURE_MESSAGE: &str =
    "stopped because a scalar quantity became too small or too large to continue";

/// One-line description of a solve outcome.
#[derive(Debug, Clone, Copy)]
pub struct StatusLine<'a> {
    result: &'a CgResult,
    tol: f64,
}

impl<'a> StatusLine<'a> {
    /// Describe `result`, obtained with tolerance `tol`.
    pub fn new(result: &'a CgResult, tol: f64) -> Self {
        Self { result, tol }
    }
}

impl fmt::Display for StatusLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.result.flag {
            CgFlag::Converged => write!(
                f,
                "converged at iteration {} to a solution with relative residual {:e}",
                self.result.iterations, self.result.relative_residual
            ),
            CgFlag::MaxIterationsReached => write!(
                f,
                "stopped at iteration {} without converging to the desired tolerance {:e} \
                 because the maximum number of iterations was reached; \
                 the iterate returned has relative residual {:e}",
                self.result.iterations, self.tol, self.result.relative_residual
            ),
            CgFlag::NumericFailure => f.write_str(NUMERIC_FAILURE_MESSAGE),
        }
    }
}

/// Write the status line for `result` followed by a newline.
pub fn write_status<W: Write>(out: &mut W, result: &CgResult, tol: f64) -> io::Result<()> {
    writeln!(out, "{}", StatusLine::new(result, tol))
}

/// Validate and solve a dense system, print the status line to stdout and
/// return only the solution.
pub fn solve_primary(
    a: &DMatrix<f64>,
    b: &DVector<f64>,
    x0: Option<&DVector<f64>>,
    config: &CgConfig,
) -> Result<DVector<f64>> {
    let stdout = io::stdout();
    solve_primary_to(&mut stdout.lock(), a, b, x0, config)
}

/// Same as [`solve_primary`], writing the status line to `out`.
pub fn solve_primary_to<W: Write>(
    out: &mut W,
    a: &DMatrix<f64>,
    b: &DVector<f64>,
    x0: Option<&DVector<f64>>,
    config: &CgConfig,
) -> Result<DVector<f64>> {
    let system = validate_dense(a, b, x0)?;
    let result = solve_cg(&system, config)?;
    write_status(out, &result, config.tol)?;
    Ok(DVector::from_vec(result.x))
}

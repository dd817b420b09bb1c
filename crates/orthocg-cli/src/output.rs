//! Output formatting for solve results.

use std::io::{self, Write};

use orthocg_solver::{CgResult, write_status};
use serde::Serialize;

/// Print only the solution followed by the status line.
pub fn write_primary<W: Write>(out: &mut W, result: &CgResult, tol: f64) -> io::Result<()> {
    write_solution(out, &result.x)?;
    write_status(out, result, tol)
}

/// Print every field of the result, without status narration.
pub fn write_full<W: Write>(out: &mut W, result: &CgResult) -> io::Result<()> {
    write_solution(out, &result.x)?;
    writeln!(out)?;
    writeln!(out, "flag    = {} ({})", result.flag.code(), result.flag)?;
    writeln!(out, "relres  = {:.6e}", result.relative_residual)?;
    writeln!(out, "iter    = {}", result.iterations)?;
    if let Some(fault) = result.fault {
        writeln!(out, "fault   = {}", fault)?;
    }
    writeln!(out, "resvec:")?;
    for (i, norm) in result.residual_norms.iter().enumerate() {
        writeln!(out, "  [{}] {:.6e}", i, norm)?;
    }
    Ok(())
}

/// Print the result as pretty JSON.
pub fn write_json<W: Write>(out: &mut W, result: &CgResult) -> io::Result<()> {
    let report = JsonReport::from(result);
    serde_json::to_writer_pretty(&mut *out, &report)?;
    writeln!(out)
}

fn write_solution<W: Write>(out: &mut W, x: &[f64]) -> io::Result<()> {
    writeln!(out, "Solution:")?;
    for (i, xi) in x.iter().enumerate() {
        writeln!(out, "  x[{}] = {:.12e}", i, xi)?;
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    x: &'a [f64],
    flag: u8,
    status: String,
    relres: f64,
    iter: usize,
    resvec: &'a [f64],
    #[serde(skip_serializing_if = "Option::is_none")]
    fault: Option<String>,
}

impl<'a> From<&'a CgResult> for JsonReport<'a> {
    fn from(result: &'a CgResult) -> Self {
        Self {
            x: &result.x,
            flag: result.flag.code(),
            status: result.flag.to_string(),
            relres: result.relative_residual,
            iter: result.iterations,
            resvec: &result.residual_norms,
            fault: result.fault.map(|f| f.to_string()),
        }
    }
}

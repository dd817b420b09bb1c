//! orthocg command-line interface.
//!
//! Loads a symmetric positive-definite system from a JSON file, solves it with
//! re-orthogonalized conjugate gradient and prints the result.

mod input;
mod output;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use orthocg_solver::{CgConfig, CgResult, solve_cg, validate_dense, validate_sparse};
use tracing_subscriber::EnvFilter;

use crate::input::{LoadedSystem, load_system};
use crate::output::{write_full, write_json, write_primary};

#[derive(Parser)]
#[command(name = "orthocg")]
#[command(about = "Solve symmetric positive-definite systems with re-orthogonalized CG")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a system; the exit code is the solver flag (0, 1 or 4)
    Solve {
        /// Path to the system JSON file
        system: PathBuf,

        /// Relative residual tolerance
        #[arg(long, default_value = "1e-6")]
        tol: f64,

        /// Maximum number of iterations [default: min(n, 20)]
        #[arg(long)]
        maxit: Option<usize>,

        /// Print flag, relative residual, iteration and residual history
        #[arg(long, conflicts_with = "json")]
        full: bool,

        /// Output the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a system without solving it
    Check {
        /// Path to the system JSON file
        system: PathBuf,
    },
}

/// How much of the result to print.
#[derive(Debug, Clone, Copy)]
enum OutputMode {
    Primary,
    Full,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let outcome = match cli.command {
        Commands::Solve {
            system,
            tol,
            maxit,
            full,
            json,
        } => {
            let mut config = CgConfig::default().with_tol(tol);
            config.max_iter = maxit;
            let mode = if json {
                OutputMode::Json
            } else if full {
                OutputMode::Full
            } else {
                OutputMode::Primary
            };
            run_solve(&system, &config, mode).map(|result| ExitCode::from(result.flag.code()))
        }
        Commands::Check { system } => run_check(&system).map(|()| ExitCode::SUCCESS),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run_solve(path: &Path, config: &CgConfig, mode: OutputMode) -> Result<CgResult> {
    let loaded = load_system(path)?;
    log::info!("Solving {} system from {}", loaded.describe(), path.display());

    let result = match &loaded {
        LoadedSystem::Dense { a, b, x0 } => {
            let system = validate_dense(a, b, x0.as_ref()).context("invalid system")?;
            solve_cg(&system, config)?
        }
        LoadedSystem::Sparse { a, b, x0 } => {
            let system = validate_sparse(a, b, x0.as_deref()).context("invalid system")?;
            solve_cg(&system, config)?
        }
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Primary => write_primary(&mut out, &result, config.tol)?,
        OutputMode::Full => write_full(&mut out, &result)?,
        OutputMode::Json => write_json(&mut out, &result)?,
    }
    out.flush()?;

    Ok(result)
}

fn run_check(path: &Path) -> Result<()> {
    let loaded = load_system(path)?;

    let n = match &loaded {
        LoadedSystem::Dense { a, b, x0 } => validate_dense(a, b, x0.as_ref())?.dim(),
        LoadedSystem::Sparse { a, b, x0 } => validate_sparse(a, b, x0.as_deref())?.dim(),
    };

    println!("{}: valid symmetric system of dimension {}", path.display(), n);
    Ok(())
}

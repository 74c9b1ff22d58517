//! Command line argument parsing
//!
//! Subcommands:
//! - `run`: Execute a batch file (TOML or JSON)
//! - `validate`: Check a batch file without executing anything
//! - `show-config`: Show configuration discovery information

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "foreman")]
#[command(author = "Foreman Engine Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Priority-and-dependency batch execution engine")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Execute a batch file (TOML or JSON)
    Run {
        /// Path to the batch file
        file: PathBuf,
        /// Configuration file path
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
        /// Write the final report as JSON to this path
        #[arg(long = "report-json")]
        report_json: Option<PathBuf>,
    },
    /// Validate a batch file without executing anything
    Validate {
        /// Path to the batch file
        file: PathBuf,
        /// Configuration file path
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
    },
    /// Show configuration discovery information
    ShowConfig,
}

//! CLI definitions using `clap` (spec AMBIENT: CLI Driver).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// QFOS — Query Fan-Out Session detection and window-optimization engine.
#[derive(Parser, Debug)]
#[command(name = "qfos", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a JSON configuration file; defaults are used for any
    /// field it omits.
    #[arg(long, global = true, env = "QFOS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output as JSON (for piping into other tools).
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors).
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full pipeline: sweep candidate windows, cross-validate,
    /// and emit a ranked `OptScoreReport` plus the winning window's
    /// sessions.
    Run {
        /// Input NDJSON file of normalized requests. Reads stdin if omitted.
        #[arg(long)]
        input: Option<PathBuf>,

        /// Output NDJSON file for sessions + report. Writes stdout if omitted.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Bundle (and optionally refine) a single window, for debugging one
    /// candidate in isolation.
    Bundle {
        /// Input NDJSON file of normalized requests. Reads stdin if omitted.
        #[arg(long)]
        input: Option<PathBuf>,

        /// Gap threshold in milliseconds.
        #[arg(long)]
        window_ms: u64,

        /// Skip the session refiner (collision splitting).
        #[arg(long)]
        no_refine: bool,
    },

    /// Load and validate a configuration file, printing diagnostics
    /// without running the pipeline.
    ValidateConfig,
}

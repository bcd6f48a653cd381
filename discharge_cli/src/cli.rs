//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(
    name = "discharge",
    version,
    about = "Battery discharge modeler for Keithley SourceMeters"
)]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/discharge.toml")]
    pub config: PathBuf,

    /// Log as JSON lines and print JSON summaries
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Probe the open-circuit voltage, discharge to cutoff and write the model
    Run {
        /// Model CSV destination (overrides output.model_file)
        #[arg(long, value_name = "FILE")]
        model_out: Option<PathBuf>,
        /// Setup + raw data + model dump (overrides output.raw_file)
        #[arg(long, value_name = "FILE")]
        raw_out: Option<PathBuf>,
        /// Beep the instrument when the session ends
        #[arg(long, action = ArgAction::SetTrue)]
        beep: bool,
    },
    /// Rebuild a model from a raw-data CSV
    Extract {
        /// Raw-data CSV or a full dump written by `run --raw-out`
        #[arg(long, value_name = "FILE")]
        raw: PathBuf,
        /// Average discharge current of the recorded session (A)
        #[arg(long = "current-a", value_name = "AMPS")]
        current_a: f64,
        /// Model CSV destination (overrides output.model_file)
        #[arg(long, value_name = "FILE")]
        model_out: Option<PathBuf>,
    },
    /// Connect, identify and read the open-circuit voltage
    SelfCheck,
}

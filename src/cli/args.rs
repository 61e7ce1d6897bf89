//! Command-line argument definitions

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::commands::baseline::BaselineArgs;
use crate::cli::commands::diff::{DiffArgs, IntakeArgs, MergeArgs};
use crate::cli::commands::incident::IncidentCommands;
use crate::cli::commands::rules::RulesCommands;
use crate::cli::commands::validate::ValidateArgs;

#[derive(Parser, Debug)]
#[command(name = "chemrec")]
#[command(version, about = "Baseline reconciliation and deviation detection for product attribute data")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command
#[derive(clap::Args, Debug, Clone)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "auto")]
    pub format: OutputFormat,

    /// Engine configuration file (thresholds, justification length, ...)
    #[arg(long, short = 'c', global = true, env = "CHEMREC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    Auto,
    Yaml,
    Json,
    /// Entity id only
    Id,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Recalculate a product baseline from submissions and reference data
    Baseline(BaselineArgs),

    /// Diff two composition records
    Diff(DiffArgs),

    /// Merge two or more composition records
    Merge(MergeArgs),

    /// Convert an extraction batch into a composition record
    Intake(IntakeArgs),

    /// Validate a submission against a baseline
    Validate(ValidateArgs),

    /// Incident lifecycle
    #[command(subcommand)]
    Incident(IncidentCommands),

    /// Attribute rule sets
    #[command(subcommand)]
    Rules(RulesCommands),
}

//! CLI argument parsing using clap derive API
//!
//! Purely declarative; no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Trailpost -- CloudTrail to Slack/SNS notifier.
///
/// Use `trailpost <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "trailpost", version, about, long_about = None)]
pub struct Cli {
    /// Path to the trailpost.toml configuration file.
    #[arg(short, long, default_value = "trailpost.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Classify every record of a local CloudTrail log file.
    Check(CheckArgs),

    /// Inspect the effective rule lists.
    Rules(RulesArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- check ----

/// Classify a CloudTrail log file (`.json` or `.json.gz`) offline.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Log file to classify.
    pub file: PathBuf,

    /// Also run matched records through the dispatcher with recording
    /// channels and show where they would be delivered.
    #[arg(long)]
    pub dispatch_preview: bool,

    /// Only list matched records.
    #[arg(long)]
    pub matched_only: bool,
}

// ---- rules ----

#[derive(Args, Debug)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub action: RulesAction,
}

#[derive(Subcommand, Debug)]
pub enum RulesAction {
    /// List the effective match and ignore rules.
    List,
    /// Compile every rule and report syntax errors.
    Validate,
}

// ---- config ----

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, rules, slack, sns, dedup, features, runtime).
        #[arg(long)]
        section: Option<String>,
    },
}

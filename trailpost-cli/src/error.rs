//! CLI-specific error types and exit code mapping

use trailpost_core::error::TrailpostError;
use trailpost_rule_engine::RuleEngineError;

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from trailpost-core.
    #[error("{0}")]
    Core(#[from] TrailpostError),

    /// One or more rules failed validation.
    #[error("rule error: {0}")]
    Rule(String),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                    |
    /// |------|----------------------------|
    /// | 0    | Success                    |
    /// | 1    | General / command error    |
    /// | 2    | Configuration error        |
    /// | 10   | IO error                   |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Core(TrailpostError::Config(_)) => 2,
            Self::Io(_) | Self::Core(TrailpostError::Io(_)) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) | Self::Rule(_) => 1,
        }
    }
}

impl From<RuleEngineError> for CliError {
    fn from(e: RuleEngineError) -> Self {
        match e {
            // an empty rule set is a configuration problem
            RuleEngineError::NoRules => Self::Config(e.to_string()),
            RuleEngineError::InvalidRule { .. } => Self::Rule(e.to_string()),
        }
    }
}

//! Rule engine errors.
//!
//! [`EvalError`] is the cause attached to a failed rule; it is carried as a
//! value and never aborts classification. [`RuleEngineError`] covers rule set
//! assembly and converts into [`TrailpostError`] for callers using `?`.

use trailpost_core::error::{RuleError, TrailpostError};

/// Why a single rule failed to produce a value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    /// The rule text is not a valid expression.
    #[error("invalid syntax at offset {offset}: {reason}")]
    Syntax {
        /// Byte offset into the rule text
        offset: usize,
        reason: String,
    },

    /// The rule refers to a name other than `event`.
    #[error("name '{name}' is not defined")]
    UndefinedName { name: String },

    /// `event["path"]` on a path the record does not have.
    #[error("key not found: '{key}'")]
    KeyNotFound { key: String },

    /// An operator or method was applied to a value that does not support it.
    #[error("type error: {reason}")]
    Type { reason: String },

    /// The expression exceeds the nesting limit.
    #[error("expression nests deeper than {limit} levels")]
    TooDeep { limit: usize },
}

/// Rule set assembly errors.
#[derive(Debug, thiserror::Error)]
pub enum RuleEngineError {
    /// No match rules after assembling defaults, user rules and tracked events.
    #[error("Have no rules to apply! Add some rules or enable default rules")]
    NoRules,

    /// A rule failed to compile.
    #[error("invalid rule '{rule}': {source}")]
    InvalidRule {
        rule: String,
        #[source]
        source: EvalError,
    },
}

impl From<RuleEngineError> for TrailpostError {
    fn from(err: RuleEngineError) -> Self {
        match err {
            RuleEngineError::NoRules => TrailpostError::Rule(RuleError::NoRules),
            RuleEngineError::InvalidRule { rule, source } => {
                TrailpostError::Rule(RuleError::Invalid {
                    rule,
                    reason: source.to_string(),
                })
            }
        }
    }
}

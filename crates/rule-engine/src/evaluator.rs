//! Single-rule evaluation.
//!
//! A [`Rule`] is compiled once when it is loaded. A rule that fails to
//! compile is kept, and reports its compile error every time it is
//! evaluated, so one bad rule surfaces per record like any runtime failure.

use std::fmt;

use crate::error::EvalError;
use crate::expr::Expression;
use crate::flatten::FlatRecord;

/// Rule text plus its compiled form.
#[derive(Clone)]
pub struct Rule {
    source: String,
    compiled: Result<Expression, EvalError>,
}

impl Rule {
    pub fn compile(source: impl Into<String>) -> Self {
        let source = source.into();
        let compiled = Expression::parse(&source);
        Self { source, compiled }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_valid(&self) -> bool {
        self.compiled.is_ok()
    }

    pub fn compile_error(&self) -> Option<&EvalError> {
        self.compiled.as_ref().err()
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("source", &self.source)
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// A rule that could not be evaluated against a record.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("rule '{rule}' failed: {cause}")]
pub struct RuleEvaluationError {
    /// The failing rule's text.
    pub rule: String,
    pub cause: EvalError,
}

/// Evaluates `rule` against a flattened record.
///
/// # Errors
///
/// Returns the compile error of an invalid rule, or the runtime failure
/// (missing key, undefined name, type mismatch) of a valid one.
pub fn evaluate(rule: &Rule, flat: &FlatRecord) -> Result<bool, RuleEvaluationError> {
    let failed = |cause: EvalError| RuleEvaluationError {
        rule: rule.source.clone(),
        cause,
    };
    match &rule.compiled {
        Ok(expression) => expression.eval(flat).map_err(failed),
        Err(cause) => Err(failed(cause.clone())),
    }
}

//! Rule expression language.
//!
//! A small, side-effect free boolean language over one binding, `event`:
//!
//! ```text
//! event["eventName"] == "ConsoleLogin" and event.get("additionalEventData.MFAUsed") != "Yes"
//! (event.get("errorCode") or "").endswith("UnauthorizedOperation")
//! event["eventName"] in ["StopLogging", "DeleteTrail"]
//! ```
//!
//! Supported: string/number/`True`/`False`/`None` literals, list and tuple
//! literals, `event[...]` (fails on a missing key), `event.get(key[, default])`,
//! `and`/`or`/`not`, chained comparisons, `in`/`not in`, `is`/`is not`, and
//! the string methods `startswith`, `endswith`, `lower`, `upper`, `strip`.

mod ast;
mod interp;
mod lexer;
mod parser;

pub use interp::EVENT_BINDING;
pub use parser::MAX_DEPTH;

use crate::error::EvalError;
use crate::flatten::FlatRecord;

/// A parsed rule expression, reusable across records.
#[derive(Debug, Clone)]
pub struct Expression {
    ast: ast::Expr,
}

impl Expression {
    /// Parses `src`.
    ///
    /// # Errors
    ///
    /// [`EvalError::Syntax`] or [`EvalError::TooDeep`].
    pub fn parse(src: &str) -> Result<Self, EvalError> {
        parser::parse(src).map(|ast| Self { ast })
    }

    /// Evaluates against `record`. Only a result that is exactly `True`
    /// counts as a match; truthy non-boolean results do not.
    pub fn eval(&self, record: &FlatRecord) -> Result<bool, EvalError> {
        let value = interp::eval(&self.ast, record)?;
        Ok(matches!(value, interp::Val::Bool(true)))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::flatten::flatten;

    #[test]
    fn truthy_string_is_not_a_match() {
        let expr = Expression::parse(r#"event.get("eventName")"#).unwrap();
        let flat = flatten(&json!({"eventName": "X"}));
        assert!(!expr.eval(&flat).unwrap());
    }

    #[test]
    fn parsed_expression_is_reusable() {
        let expr = Expression::parse(r#"event["eventName"] == "A""#).unwrap();
        assert!(expr.eval(&flatten(&json!({"eventName": "A"}))).unwrap());
        assert!(!expr.eval(&flatten(&json!({"eventName": "B"}))).unwrap());
    }
}

//! Record classification for trailpost.
//!
//! # Modules
//!
//! - [`flatten`]: nested record to dotted-path [`FlatRecord`]
//! - [`expr`]: the sandboxed rule expression language
//! - [`evaluator`]: compiled [`Rule`]s and per-rule error capture
//! - [`classifier`]: ignore-then-match, first-match classification
//! - [`defaults`]: built-in match rules
//! - [`ruleset`]: rule list assembly from configuration
//! - [`error`]: domain errors
//!
//! # Flow
//!
//! ```text
//! record -> flatten -> ignore rules --(true)--> Ignored
//!                          | (none)
//!                          v
//!                      match rules --(true)--> Matched
//!                          | (none)
//!                          v
//!                      Unmatched          (rule errors collected throughout)
//! ```

pub mod classifier;
pub mod defaults;
pub mod error;
pub mod evaluator;
pub mod expr;
pub mod flatten;
pub mod ruleset;

pub use classifier::{ClassificationResult, Outcome, classify, classify_flat};
pub use defaults::DEFAULT_RULES;
pub use error::{EvalError, RuleEngineError};
pub use evaluator::{Rule, RuleEvaluationError, evaluate};
pub use expr::Expression;
pub use flatten::{FlatRecord, flatten};
pub use ruleset::RuleSet;

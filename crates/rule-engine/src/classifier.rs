//! Record classification.
//!
//! Ignore rules run first and act as a veto; match rules run only when no
//! ignore rule fired. Both lists are first-match: evaluation stops at the
//! first rule returning `True`. Rule failures are collected along the way
//! and never stop the remaining rules from running.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use trailpost_core::metrics::{
    LABEL_OUTCOME, RECORDS_PROCESSED_TOTAL, RULE_EVALUATION_ERRORS_TOTAL,
};

use crate::evaluator::{Rule, RuleEvaluationError, evaluate};
use crate::flatten::{FlatRecord, flatten};

/// Final decision for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// A match rule fired.
    Matched,
    /// An ignore rule fired.
    Ignored,
    /// Nothing fired.
    Unmatched,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Matched => "matched",
            Self::Ignored => "ignored",
            Self::Unmatched => "unmatched",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of [`classify`].
///
/// `should_process` and `is_ignored` are never both true.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassificationResult {
    pub should_process: bool,
    pub is_ignored: bool,
    /// Every rule that failed, in evaluation order.
    pub errors: Vec<RuleEvaluationError>,
    /// Text of the rule that decided the outcome, if any.
    pub matched_rule: Option<String>,
}

impl ClassificationResult {
    pub fn outcome(&self) -> Outcome {
        if self.is_ignored {
            Outcome::Ignored
        } else if self.should_process {
            Outcome::Matched
        } else {
            Outcome::Unmatched
        }
    }
}

/// Classifies a raw record. The record is flattened exactly once.
pub fn classify(record: &Value, rules: &[Rule], ignore_rules: &[Rule]) -> ClassificationResult {
    classify_flat(&flatten(record), rules, ignore_rules)
}

/// Classifies an already flattened record.
pub fn classify_flat(
    flat: &FlatRecord,
    rules: &[Rule],
    ignore_rules: &[Rule],
) -> ClassificationResult {
    let mut result = ClassificationResult::default();

    if let Some(rule) = first_match(flat, ignore_rules, &mut result.errors) {
        result.is_ignored = true;
        result.matched_rule = Some(rule.to_owned());
    } else if let Some(rule) = first_match(flat, rules, &mut result.errors) {
        result.should_process = true;
        result.matched_rule = Some(rule.to_owned());
    }

    let outcome = result.outcome();
    debug!(
        outcome = %outcome,
        rule = result.matched_rule.as_deref().unwrap_or(""),
        errors = result.errors.len(),
        "record classified"
    );
    metrics::counter!(RECORDS_PROCESSED_TOTAL, LABEL_OUTCOME => outcome.as_str()).increment(1);
    result
}

fn first_match<'r>(
    flat: &FlatRecord,
    rules: &'r [Rule],
    errors: &mut Vec<RuleEvaluationError>,
) -> Option<&'r str> {
    for rule in rules {
        match evaluate(rule, flat) {
            Ok(true) => return Some(rule.source()),
            Ok(false) => {}
            Err(err) => {
                warn!(rule = %err.rule, error = %err.cause, "rule evaluation failed");
                metrics::counter!(RULE_EVALUATION_ERRORS_TOTAL).increment(1);
                errors.push(err);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::EvalError;

    fn rules(sources: &[&str]) -> Vec<Rule> {
        sources.iter().map(|s| Rule::compile(*s)).collect()
    }

    #[test]
    fn ignore_rule_vetoes_matching_rule() {
        let record = json!({"eventName": "X"});
        let matching = rules(&[r#"event["eventName"] == "X""#]);
        let ignoring = rules(&[r#"event["eventName"] == "X""#]);
        let result = classify(&record, &matching, &ignoring);
        assert!(!result.should_process);
        assert!(result.is_ignored);
        assert_eq!(result.outcome(), Outcome::Ignored);
    }

    #[test]
    fn first_match_stops_before_bad_rule() {
        let record = json!({"eventName": "X"});
        let matching = rules(&[r#"event["eventName"] == "X""#, "bad_syntax_rule ((("]);
        let result = classify(&record, &matching, &[]);
        assert!(result.should_process);
        assert!(result.errors.is_empty());
        assert_eq!(
            result.matched_rule.as_deref(),
            Some(r#"event["eventName"] == "X""#)
        );
    }

    #[test]
    fn bad_rule_before_good_rule_is_collected() {
        let record = json!({"eventName": "X"});
        let matching = rules(&["bad_syntax_rule (((", r#"event["eventName"] == "X""#]);
        let result = classify(&record, &matching, &[]);
        assert!(result.should_process);
        assert_eq!(result.errors.len(), 1);
        assert!(matches!(result.errors[0].cause, EvalError::Syntax { .. }));
    }

    #[test]
    fn undefined_name_error_is_isolated() {
        let record = json!({"eventName": "X"});
        let matching = rules(&["undefined_name == 1", r#"event["eventName"] == "X""#]);
        let result = classify(&record, &matching, &[]);
        assert!(result.should_process);
        assert!(!result.is_ignored);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].rule, "undefined_name == 1");
    }

    #[test]
    fn ignore_rule_errors_do_not_stop_ignore_list() {
        let record = json!({"eventName": "X"});
        let ignoring = rules(&[r#"event["missing"] == 1"#, r#"event["eventName"] == "X""#]);
        let result = classify(&record, &rules(&["True"]), &ignoring);
        assert!(result.is_ignored);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn errors_accumulate_across_both_lists() {
        let record = json!({"eventName": "X"});
        let ignoring = rules(&["nope_a == 1"]);
        let matching = rules(&["nope_b == 1", r#"event["eventName"] == "Y""#]);
        let result = classify(&record, &matching, &ignoring);
        assert_eq!(result.outcome(), Outcome::Unmatched);
        let failed: Vec<&str> = result.errors.iter().map(|e| e.rule.as_str()).collect();
        assert_eq!(failed, ["nope_a == 1", "nope_b == 1"]);
    }

    #[test]
    fn no_rules_is_unmatched() {
        let result = classify(&json!({"eventName": "X"}), &[], &[]);
        assert_eq!(result, ClassificationResult::default());
        assert_eq!(result.outcome(), Outcome::Unmatched);
    }

    #[test]
    fn non_boolean_result_does_not_match() {
        let result = classify(
            &json!({"eventName": "X"}),
            &rules(&[r#"event["eventName"]"#]),
            &[],
        );
        assert!(!result.should_process);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn outcome_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(Outcome::Matched).unwrap(),
            json!("matched")
        );
    }
}

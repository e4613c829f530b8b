//! Rule set assembly.
//!
//! Match rules are the defaults (when enabled), then the user rules, then a
//! generated rule for `events_to_track`. Ignore rules are taken as given.
//! Every rule is compiled once here and the set stays read-only afterwards.

use serde_json::Value;
use tracing::{info, warn};

use trailpost_core::config::RulesConfig;

use crate::classifier::{ClassificationResult, classify};
use crate::defaults::DEFAULT_RULES;
use crate::error::RuleEngineError;
use crate::evaluator::Rule;

/// Compiled match and ignore rules for one invocation.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
    ignore_rules: Vec<Rule>,
}

impl RuleSet {
    /// Builds a rule set from rule texts.
    ///
    /// # Errors
    ///
    /// [`RuleEngineError::NoRules`] when `rules` is empty. Rules that fail
    /// to compile are kept and reported per record.
    pub fn new<R, I>(rules: R, ignore_rules: I) -> Result<Self, RuleEngineError>
    where
        R: IntoIterator,
        R::Item: Into<String>,
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let rules: Vec<Rule> = rules.into_iter().map(Rule::compile).collect();
        if rules.is_empty() {
            return Err(RuleEngineError::NoRules);
        }
        let ignore_rules = ignore_rules.into_iter().map(Rule::compile).collect();
        let set = Self {
            rules,
            ignore_rules,
        };
        for rule in set.invalid_rules() {
            if let Some(err) = rule.compile_error() {
                warn!(rule = %rule.source(), error = %err, "rule does not compile");
            }
        }
        info!(
            rules = set.rules.len(),
            ignore_rules = set.ignore_rules.len(),
            "rule set loaded"
        );
        Ok(set)
    }

    /// Assembles the rule lists from configuration.
    pub fn from_config(config: &RulesConfig) -> Result<Self, RuleEngineError> {
        let mut rules: Vec<String> = Vec::new();
        if config.use_default_rules {
            rules.extend(DEFAULT_RULES.iter().map(|r| (*r).to_owned()));
        }
        rules.extend(config.rules.iter().cloned());
        if let Some(rule) = events_to_track_rule(&config.events_to_track) {
            rules.push(rule);
        }
        Self::new(rules, config.ignore_rules.iter().cloned())
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn ignore_rules(&self) -> &[Rule] {
        &self.ignore_rules
    }

    pub fn classify(&self, record: &Value) -> ClassificationResult {
        classify(record, &self.rules, &self.ignore_rules)
    }

    /// Rules from both lists that failed to compile.
    pub fn invalid_rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules
            .iter()
            .chain(&self.ignore_rules)
            .filter(|rule| !rule.is_valid())
    }

    /// Strict check for callers that must refuse a partly broken set.
    ///
    /// # Errors
    ///
    /// [`RuleEngineError::InvalidRule`] for the first rule, match list first,
    /// that failed to compile.
    pub fn ensure_valid(&self) -> Result<(), RuleEngineError> {
        let first = self
            .invalid_rules()
            .find_map(|rule| rule.compile_error().map(|err| (rule, err)));
        match first {
            Some((rule, err)) => Err(RuleEngineError::InvalidRule {
                rule: rule.source().to_owned(),
                source: err.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Rule matching any of `names`, or `None` for an empty list.
pub fn events_to_track_rule(names: &[String]) -> Option<String> {
    if names.is_empty() {
        return None;
    }
    let list = names
        .iter()
        .map(|name| Value::String(name.clone()).to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Some(format!(
        r#""eventName" in event and event["eventName"] in [{list}]"#
    ))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::EvalError;

    fn config(defaults: bool, rules: &[&str], events: &[&str]) -> RulesConfig {
        RulesConfig {
            use_default_rules: defaults,
            rules: rules.iter().map(|r| (*r).to_owned()).collect(),
            events_to_track: events.iter().map(|e| (*e).to_owned()).collect(),
            ..RulesConfig::default()
        }
    }

    #[test]
    fn no_rules_is_an_error() {
        let err = RuleSet::from_config(&config(false, &[], &[])).unwrap_err();
        assert!(matches!(err, RuleEngineError::NoRules));
    }

    #[test]
    fn ignore_rules_alone_are_not_enough() {
        let mut cfg = config(false, &[], &[]);
        cfg.ignore_rules = vec!["True".to_owned()];
        assert!(RuleSet::from_config(&cfg).is_err());
    }

    #[test]
    fn order_is_defaults_user_then_tracked_events() {
        let set = RuleSet::from_config(&config(true, &["True"], &["CreateUser"])).unwrap();
        let sources: Vec<&str> = set.rules().iter().map(Rule::source).collect();
        assert_eq!(sources.len(), DEFAULT_RULES.len() + 2);
        assert_eq!(&sources[..DEFAULT_RULES.len()], DEFAULT_RULES);
        assert_eq!(sources[DEFAULT_RULES.len()], "True");
        assert!(sources[DEFAULT_RULES.len() + 1].contains(r#"["CreateUser"]"#));
    }

    #[test]
    fn tracked_events_rule_matches_listed_names_only() {
        let set = RuleSet::from_config(&config(false, &[], &["CreateUser", "DeleteUser"])).unwrap();
        assert!(set.classify(&json!({"eventName": "DeleteUser"})).should_process);
        let other = set.classify(&json!({"eventName": "GetUser"}));
        assert!(!other.should_process);
        assert!(other.errors.is_empty());
        // missing eventName is guarded, not an error
        assert!(set.classify(&json!({})).errors.is_empty());
    }

    #[test]
    fn tracked_event_names_are_quoted() {
        let rule = events_to_track_rule(&[r#"Odd"Name"#.to_owned()]).unwrap();
        assert!(rule.ends_with(r#"["Odd\"Name"]"#));
        assert!(Rule::compile(rule).is_valid());
        assert_eq!(events_to_track_rule(&[]), None);
    }

    #[test]
    fn invalid_rules_are_kept_and_listed() {
        let set = RuleSet::new(["(((", "True"], ["event["]).unwrap();
        assert_eq!(set.rules().len(), 2);
        let invalid: Vec<&str> = set.invalid_rules().map(Rule::source).collect();
        assert_eq!(invalid, ["(((", "event["]);
    }

    #[test]
    fn ensure_valid_reports_first_broken_rule() {
        let set = RuleSet::new(["True", "((("], ["event["]).unwrap();
        let err = set.ensure_valid().unwrap_err();
        assert!(matches!(
            err,
            RuleEngineError::InvalidRule { ref rule, source: EvalError::Syntax { .. } }
                if rule == "((("
        ));

        let set = RuleSet::new(["True"], ["False"]).unwrap();
        assert!(set.ensure_valid().is_ok());
    }
}

//! Classification through the public API, configuration to outcome.

use serde_json::json;

use trailpost_core::config::{RulesConfig, TrailpostConfig, split_rules};
use trailpost_rule_engine::{Outcome, Rule, RuleSet, classify};

fn compile(sources: &[&str]) -> Vec<Rule> {
    sources.iter().map(|s| Rule::compile(*s)).collect()
}

// =============================================================================
// testable properties
// =============================================================================

#[test]
fn ignore_precedence_over_match() {
    let record = json!({"eventName": "DeleteBucket", "userIdentity": {"type": "Root"}});
    let rule = r#"event["userIdentity.type"] == "Root""#;
    let ignore = r#"event["eventName"].startswith("Delete")"#;
    let result = classify(&record, &compile(&[rule]), &compile(&[ignore]));
    assert!(!result.should_process);
    assert!(result.is_ignored);
}

#[test]
fn first_match_short_circuits_within_a_list() {
    let record = json!({"eventName": "X"});
    let good = r#"event["eventName"] == "X""#;
    let bad = "bad_syntax_rule_that_would_error_if_evaluated";

    let result = classify(&record, &compile(&[good, bad]), &[]);
    assert!(result.should_process);
    assert!(result.errors.is_empty());

    let result = classify(&record, &compile(&[bad, good]), &[]);
    assert!(result.should_process);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].rule, bad);
}

#[test]
fn error_isolation_keeps_later_match() {
    let result = classify(
        &json!({"eventName": "X"}),
        &compile(&["undefined_name == 1", r#"event["eventName"] == "X""#]),
        &[],
    );
    assert!(result.should_process);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].rule.contains("undefined_name == 1"));
}

// =============================================================================
// end-to-end with default rules
// =============================================================================

fn default_set() -> RuleSet {
    RuleSet::from_config(&RulesConfig {
        use_default_rules: true,
        ..RulesConfig::default()
    })
    .unwrap()
}

#[test]
fn scenario_console_login_without_mfa() {
    let record = json!({
        "eventName": "ConsoleLogin",
        "additionalEventData": {"MFAUsed": "No"},
        "userIdentity": {"arn": "arn:aws:iam::111:user/alice"}
    });
    assert!(default_set().classify(&record).should_process);
}

#[test]
fn scenario_console_login_with_mfa() {
    let record = json!({
        "eventName": "ConsoleLogin",
        "additionalEventData": {"MFAUsed": "Yes"},
        "userIdentity": {"arn": "arn:aws:iam::111:user/alice"}
    });
    assert!(!default_set().classify(&record).should_process);
}

#[test]
fn scenario_anonymous_access_denied() {
    let record = json!({
        "errorCode": "AccessDenied",
        "userIdentity": {"accountId": "ANONYMOUS_PRINCIPAL"}
    });
    assert!(!default_set().classify(&record).should_process);
}

// =============================================================================
// configuration driven
// =============================================================================

#[test]
fn env_style_rules_with_custom_separator() {
    let mut config = TrailpostConfig::from_lookup(|key| match key {
        "HOOK_URL" => Some("https://hooks.slack.com/services/T0/B0/x".to_owned()),
        "RULES_SEPARATOR" => Some(";".to_owned()),
        "RULES" => Some(r#"event["eventName"] == "A";event["eventName"] == "B""#.to_owned()),
        "IGNORE_RULES" => Some(r#"event.get("userIdentity.type") == "AWSService""#.to_owned()),
        _ => None,
    })
    .unwrap();
    assert_eq!(config.rules.rules.len(), 2);

    let set = RuleSet::from_config(&config.rules).unwrap();
    assert_eq!(
        set.classify(&json!({"eventName": "B"})).outcome(),
        Outcome::Matched
    );
    assert_eq!(
        set.classify(&json!({"eventName": "B", "userIdentity": {"type": "AWSService"}}))
            .outcome(),
        Outcome::Ignored
    );

    config.rules.rules = split_rules("", ";");
    assert!(RuleSet::from_config(&config.rules).is_err());
}

#[test]
fn invalid_user_rule_does_not_disable_pipeline() {
    let config = RulesConfig {
        use_default_rules: true,
        rules: vec!["this is not valid python code".to_owned()],
        ..RulesConfig::default()
    };
    let set = RuleSet::from_config(&config).unwrap();
    assert_eq!(set.invalid_rules().count(), 1);

    let result = set.classify(&json!({
        "eventName": "CreateUser",
        "userIdentity": {"type": "Root"}
    }));
    assert!(result.should_process);
    assert!(result.errors.is_empty());

    let result = set.classify(&json!({"eventName": "GetUser"}));
    assert!(!result.should_process);
    assert_eq!(result.errors.len(), 1);
}

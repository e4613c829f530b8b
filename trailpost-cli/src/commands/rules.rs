//! `trailpost rules` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use trailpost_rule_engine::{Rule, RuleSet};

use crate::cli::{RulesAction, RulesArgs};
use crate::commands::load_partial;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `rules` command.
pub async fn execute(
    args: RulesArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = load_partial(config_path).await?;
    let rules = RuleSet::from_config(&config.rules)?;
    info!(
        rules = rules.rules().len(),
        ignore_rules = rules.ignore_rules().len(),
        "rule set assembled"
    );
    match args.action {
        RulesAction::List => writer.render(&RuleListReport::from_rule_set(&rules)),
        RulesAction::Validate => execute_validate(&rules, writer),
    }
}

fn execute_validate(rules: &RuleSet, writer: &OutputWriter) -> Result<(), CliError> {
    let report = RuleValidationReport::from_rule_set(rules);
    writer.render(&report)?;
    rules.ensure_valid()?;
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct RuleListReport {
    pub rules: Vec<RuleEntry>,
    pub ignore_rules: Vec<RuleEntry>,
}

#[derive(Debug, Serialize)]
pub struct RuleEntry {
    pub index: usize,
    pub source: String,
    pub valid: bool,
}

fn entries(rules: &[Rule]) -> Vec<RuleEntry> {
    rules
        .iter()
        .enumerate()
        .map(|(i, rule)| RuleEntry {
            index: i + 1,
            source: rule.source().to_owned(),
            valid: rule.is_valid(),
        })
        .collect()
}

impl RuleListReport {
    pub fn from_rule_set(rules: &RuleSet) -> Self {
        Self {
            rules: entries(rules.rules()),
            ignore_rules: entries(rules.ignore_rules()),
        }
    }
}

impl Render for RuleListReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        for (title, list) in [
            ("Match rules", &self.rules),
            ("Ignore rules", &self.ignore_rules),
        ] {
            writeln!(w, "{} ({} total)", title.bold(), list.len())?;
            if list.is_empty() {
                writeln!(w, "  (none)")?;
            }
            for entry in list {
                let marker = if entry.valid {
                    " ".normal()
                } else {
                    "!".red().bold()
                };
                writeln!(w, "{marker} {:>3}. {}", entry.index, entry.source)?;
            }
            writeln!(w)?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct RuleValidationReport {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub errors: Vec<RuleValidationError>,
}

#[derive(Debug, Serialize)]
pub struct RuleValidationError {
    /// `match` or `ignore`.
    pub list: &'static str,
    pub index: usize,
    pub rule: String,
    pub error: String,
}

impl RuleValidationReport {
    pub fn from_rule_set(rules: &RuleSet) -> Self {
        let mut errors = Vec::new();
        for (list, set) in [("match", rules.rules()), ("ignore", rules.ignore_rules())] {
            for (i, rule) in set.iter().enumerate() {
                if let Some(err) = rule.compile_error() {
                    errors.push(RuleValidationError {
                        list,
                        index: i + 1,
                        rule: rule.source().to_owned(),
                        error: err.to_string(),
                    });
                }
            }
        }
        let total = rules.rules().len() + rules.ignore_rules().len();
        Self {
            total,
            valid: total - errors.len(),
            invalid: errors.len(),
            errors,
        }
    }
}

impl Render for RuleValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "Rule Validation: {} total, {} valid, {} invalid",
            self.total,
            self.valid.to_string().green(),
            if self.invalid > 0 {
                self.invalid.to_string().red()
            } else {
                self.invalid.to_string().normal()
            }
        )?;

        if !self.errors.is_empty() {
            writeln!(w)?;
            writeln!(w, "Errors:")?;
            for e in &self.errors {
                writeln!(w, "  {} #{}: {}", e.list, e.index, e.rule.red())?;
                writeln!(w, "      {}", e.error)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::OutputFormat;

    fn rule_set() -> RuleSet {
        RuleSet::new(
            [r#"event["eventName"] == "CreateUser""#, r#"event["eventName"] =="#],
            [r#""errorCode" in event"#],
        )
        .expect("non-empty rule set")
    }

    #[test]
    fn list_report_numbers_rules_and_flags_invalid() {
        let report = RuleListReport::from_rule_set(&rule_set());
        assert_eq!(report.rules.len(), 2);
        assert_eq!(report.rules[1].index, 2);
        assert!(!report.rules[1].valid);
        assert_eq!(report.ignore_rules.len(), 1);
    }

    #[test]
    fn validation_report_collects_syntax_errors() {
        let report = RuleValidationReport::from_rule_set(&rule_set());
        assert_eq!(report.total, 3);
        assert_eq!(report.invalid, 1);
        assert_eq!(report.errors[0].list, "match");
        assert!(report.errors[0].error.contains("invalid syntax"));
    }

    #[test]
    fn validation_text_lists_errors() {
        colored::control::set_override(false);
        let mut buffer = Vec::new();
        RuleValidationReport::from_rule_set(&rule_set())
            .render_text(&mut buffer)
            .expect("render");
        let text = String::from_utf8(buffer).expect("utf-8");
        assert!(text.contains("3 total, 2 valid, 1 invalid"));
        assert!(text.contains("match #2"));
    }

    #[test]
    fn validate_fails_with_first_invalid_rule() {
        let err = execute_validate(&rule_set(), &OutputWriter::new(OutputFormat::Json))
            .unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains(r#"invalid rule 'event["eventName"] =='"#));
    }

    #[test]
    fn list_text_marks_empty_ignore_list() {
        colored::control::set_override(false);
        let rules = RuleSet::new(["True"], Vec::<String>::new()).expect("rule set");
        let mut buffer = Vec::new();
        RuleListReport::from_rule_set(&rules)
            .render_text(&mut buffer)
            .expect("render");
        let text = String::from_utf8(buffer).expect("utf-8");
        assert!(text.contains("Ignore rules (0 total)"));
        assert!(text.contains("(none)"));
    }
}

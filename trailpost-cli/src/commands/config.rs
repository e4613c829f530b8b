//! `trailpost config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use trailpost_core::config::TrailpostConfig;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

const SECTIONS: &[&str] = &[
    "general", "rules", "slack", "sns", "dedup", "features", "runtime",
];

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(config_path, writer).await,
        ConfigAction::Show { section } => execute_show(config_path, section, writer).await,
    }
}

/// Loads file + environment, validates, and reports the resolved delivery
/// setup.
///
/// # Errors
///
/// `CliError::Config` when validation fails.
async fn execute_validate(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %config_path.display(), "validating configuration");

    let report = match TrailpostConfig::load(config_path).await {
        Ok(config) => ConfigValidationReport::valid(config_path, &config),
        Err(e) => ConfigValidationReport {
            source: config_path.display().to_string(),
            valid: false,
            slack_mode: None,
            sns_enabled: false,
            threading_enabled: false,
            errors: vec![e.to_string()],
        },
    };

    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }
    Ok(())
}

/// Shows the effective configuration with credentials masked.
async fn execute_show(
    config_path: &Path,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = TrailpostConfig::load(config_path).await?.redacted();
    let report = ConfigReport::build(config_path, &config, section)?;
    writer.render(&report)
}

/// Configuration display report.
#[derive(Debug, Serialize)]
pub struct ConfigReport {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Redacted configuration, whole or one section.
    pub config: serde_json::Value,
    /// Text rendering only.
    #[serde(skip)]
    pub config_toml: String,
}

impl ConfigReport {
    fn build(
        config_path: &Path,
        config: &TrailpostConfig,
        section: Option<String>,
    ) -> Result<Self, CliError> {
        let mut value = serde_json::to_value(config)?;
        if let Some(name) = section.as_deref() {
            if !SECTIONS.contains(&name) {
                return Err(CliError::Command(format!(
                    "unknown section: {name} (expected: {})",
                    SECTIONS.join(", ")
                )));
            }
            value = value.get(name).cloned().unwrap_or_default();
        }
        let config_toml = toml::to_string_pretty(&value)
            .unwrap_or_else(|e| format!("(serialization error: {e})\n"));
        Ok(Self {
            source: config_path.display().to_string(),
            section,
            config: value,
            config_toml,
        })
    }
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        match &self.section {
            Some(section) => writeln!(
                w,
                "Configuration {} (source: {})",
                format!("[{section}]").bold(),
                self.source
            )?,
            None => writeln!(w, "Configuration (source: {})", self.source.bold())?,
        }
        writeln!(w)?;
        write!(w, "{}", self.config_toml)?;
        Ok(())
    }
}

/// Configuration validation report.
#[derive(Debug, Serialize)]
pub struct ConfigValidationReport {
    pub source: String,
    pub valid: bool,
    /// `webhook` or `app` when valid.
    pub slack_mode: Option<&'static str>,
    pub sns_enabled: bool,
    pub threading_enabled: bool,
    pub errors: Vec<String>,
}

impl ConfigValidationReport {
    fn valid(config_path: &Path, config: &TrailpostConfig) -> Self {
        let slack = config.slack_target().ok();
        Self {
            source: config_path.display().to_string(),
            valid: true,
            slack_mode: slack.as_ref().map(|target| target.kind()),
            sns_enabled: matches!(config.sns_routes(), Ok(Some(_))),
            threading_enabled: config.dedup_settings().is_some()
                && slack.as_ref().is_some_and(|target| target.supports_threads()),
            errors: Vec::new(),
        }
    }
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;
        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
            if let Some(mode) = self.slack_mode {
                writeln!(w, "  Slack:  {mode}")?;
            }
            writeln!(w, "  SNS:    {}", on_off(self.sns_enabled))?;
            writeln!(w, "  Thread: {}", on_off(self.threading_enabled))?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }
        Ok(())
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "enabled" } else { "disabled" }
}

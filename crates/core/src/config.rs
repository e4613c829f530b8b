//! Configuration loading: `trailpost.toml` and environment variables.
//!
//! [`TrailpostConfig`] is the raw, serde-friendly view of every setting. It is
//! turned into typed values ([`SlackTarget`], SNS [`RouteTable`],
//! [`DedupSettings`]) once, at load time, and handed to the engine by value.
//!
//! # Precedence
//! 1. Environment variables (the names used by the Lambda deployment, e.g. `HOOK_URL`)
//! 2. Config file
//! 3. `Default` implementations
//!
//! # Example
//! ```no_run
//! # async fn example() -> Result<(), trailpost_core::error::TrailpostError> {
//! use trailpost_core::config::TrailpostConfig;
//!
//! // Lambda: environment only
//! let config = TrailpostConfig::from_env()?;
//!
//! // CLI: file, then environment
//! let config = TrailpostConfig::load("trailpost.toml").await?;
//! let slack = config.slack_target()?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, TrailpostError};
use crate::route::{RouteEntry, RouteTable, SlackTarget};

pub const ENV_HOOK_URL: &str = "HOOK_URL";
pub const ENV_SLACK_BOT_TOKEN: &str = "SLACK_BOT_TOKEN";
pub const ENV_DEFAULT_SLACK_CHANNEL_ID: &str = "DEFAULT_SLACK_CHANNEL_ID";
pub const ENV_CONFIGURATION: &str = "CONFIGURATION";
pub const ENV_RULES: &str = "RULES";
pub const ENV_IGNORE_RULES: &str = "IGNORE_RULES";
pub const ENV_RULES_SEPARATOR: &str = "RULES_SEPARATOR";
pub const ENV_USE_DEFAULT_RULES: &str = "USE_DEFAULT_RULES";
pub const ENV_EVENTS_TO_TRACK: &str = "EVENTS_TO_TRACK";
pub const ENV_DEFAULT_SNS_TOPIC_ARN: &str = "DEFAULT_SNS_TOPIC_ARN";
pub const ENV_SNS_CONFIGURATION: &str = "SNS_CONFIGURATION";
pub const ENV_DYNAMODB_TABLE_NAME: &str = "DYNAMODB_TABLE_NAME";
pub const ENV_DYNAMODB_TIME_TO_LIVE: &str = "DYNAMODB_TIME_TO_LIVE";
pub const ENV_RULE_EVALUATION_ERRORS_TO_SLACK: &str = "RULE_EVALUATION_ERRORS_TO_SLACK";
pub const ENV_PUSH_ACCESS_DENIED_METRICS: &str = "PUSH_ACCESS_DENIED_CLOUDWATCH_METRICS";
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "REQUEST_TIMEOUT_SECS";

/// Default dedup window.
pub const DEFAULT_DEDUP_TTL_SECS: u64 = 900;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const MAX_REQUEST_TIMEOUT_SECS: u64 = 300;
const REDACTED: &str = "<redacted>";

/// Complete trailpost configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrailpostConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub sns: SnsConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl TrailpostConfig {
    /// Loads a TOML file, applies environment overrides and validates.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, TrailpostError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Builds the configuration from the process environment alone.
    pub fn from_env() -> Result<Self, TrailpostError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from defaults plus the given variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TrailpostError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_overrides(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file without applying overrides.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, TrailpostError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TrailpostError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                TrailpostError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    pub fn parse(toml_str: &str) -> Result<Self, TrailpostError> {
        toml::from_str(toml_str).map_err(|e| {
            TrailpostError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), TrailpostError> {
        self.apply_overrides(&|key: &str| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary variable source.
    ///
    /// Only variables that are set are applied. Embedded JSON route tables
    /// that fail to parse are an error; unparsable numbers are logged and
    /// ignored.
    pub fn apply_overrides<F>(&mut self, lookup: &F) -> Result<(), TrailpostError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // general
        override_string(&mut self.general.log_level, ENV_LOG_LEVEL, lookup);
        self.general.log_level = self.general.log_level.to_ascii_lowercase();
        override_string(&mut self.general.log_format, ENV_LOG_FORMAT, lookup);

        // rules; the separator applies to both lists below
        override_string(&mut self.rules.rules_separator, ENV_RULES_SEPARATOR, lookup);
        override_flag(&mut self.rules.use_default_rules, ENV_USE_DEFAULT_RULES, lookup);
        let separator = self.rules.rules_separator.clone();
        if let Some(raw) = lookup(ENV_RULES) {
            self.rules.rules = split_rules(&raw, &separator);
        }
        if let Some(raw) = lookup(ENV_IGNORE_RULES) {
            self.rules.ignore_rules = split_rules(&raw, &separator);
        }
        if let Some(raw) = lookup(ENV_EVENTS_TO_TRACK) {
            self.rules.events_to_track = split_event_names(&raw);
        }

        // slack
        override_string(&mut self.slack.hook_url, ENV_HOOK_URL, lookup);
        override_string(&mut self.slack.bot_token, ENV_SLACK_BOT_TOKEN, lookup);
        override_string(
            &mut self.slack.default_channel_id,
            ENV_DEFAULT_SLACK_CHANNEL_ID,
            lookup,
        );
        if let Some(raw) = lookup(ENV_CONFIGURATION) {
            self.slack.routes = parse_json_routes(&raw, ENV_CONFIGURATION)?;
        }

        // sns
        override_string(&mut self.sns.default_topic_arn, ENV_DEFAULT_SNS_TOPIC_ARN, lookup);
        if let Some(raw) = lookup(ENV_SNS_CONFIGURATION) {
            self.sns.routes = parse_json_routes(&raw, ENV_SNS_CONFIGURATION)?;
        }

        // dedup
        override_string(&mut self.dedup.table_name, ENV_DYNAMODB_TABLE_NAME, lookup);
        override_u64(&mut self.dedup.ttl_secs, ENV_DYNAMODB_TIME_TO_LIVE, lookup);

        // features
        override_flag(
            &mut self.features.rule_evaluation_errors_to_slack,
            ENV_RULE_EVALUATION_ERRORS_TO_SLACK,
            lookup,
        );
        override_flag(
            &mut self.features.push_access_denied_metrics,
            ENV_PUSH_ACCESS_DENIED_METRICS,
            lookup,
        );

        // runtime
        override_u64(
            &mut self.runtime.request_timeout_secs,
            ENV_REQUEST_TIMEOUT_SECS,
            lookup,
        );

        Ok(())
    }

    /// Checks every section, including that a Slack target can be built.
    pub fn validate(&self) -> Result<(), TrailpostError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.rules.rules_separator.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "rules.rules_separator".to_owned(),
                reason: "separator must not be empty".to_owned(),
            }
            .into());
        }

        self.slack_target()?;
        self.sns_routes()?;

        if !self.dedup.table_name.is_empty() && self.dedup.ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "dedup.ttl_secs".to_owned(),
                reason: "must be greater than 0 when a table is configured".to_owned(),
            }
            .into());
        }

        if self.runtime.request_timeout_secs == 0
            || self.runtime.request_timeout_secs > MAX_REQUEST_TIMEOUT_SECS
        {
            return Err(ConfigError::InvalidValue {
                field: "runtime.request_timeout_secs".to_owned(),
                reason: format!("must be between 1 and {MAX_REQUEST_TIMEOUT_SECS}"),
            }
            .into());
        }

        Ok(())
    }

    /// Resolves the Slack delivery mode.
    ///
    /// A bot token takes precedence over a webhook URL.
    pub fn slack_target(&self) -> Result<SlackTarget, ConfigError> {
        let slack = &self.slack;
        if !slack.bot_token.is_empty() {
            if slack.default_channel_id.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "slack.default_channel_id".to_owned(),
                    reason: format!(
                        "{ENV_DEFAULT_SLACK_CHANNEL_ID} is required when {ENV_SLACK_BOT_TOKEN} is set"
                    ),
                });
            }
            let entries = route_entries(&slack.routes, "slack.routes", "slack_channel_id", |r| {
                r.slack_channel_id.as_deref()
            })?;
            return Ok(SlackTarget::App {
                bot_token: slack.bot_token.clone(),
                routes: RouteTable::with_entries(&slack.default_channel_id, entries),
            });
        }

        if !slack.hook_url.is_empty() {
            let entries = route_entries(&slack.routes, "slack.routes", "slack_hook_url", |r| {
                r.slack_hook_url.as_deref()
            })?;
            return Ok(SlackTarget::Webhook {
                routes: RouteTable::with_entries(&slack.hook_url, entries),
            });
        }

        Err(ConfigError::InvalidValue {
            field: "slack".to_owned(),
            reason: format!("{ENV_HOOK_URL} or {ENV_SLACK_BOT_TOKEN} must be set"),
        })
    }

    /// SNS route table, or `None` when no default topic is configured.
    pub fn sns_routes(&self) -> Result<Option<RouteTable>, ConfigError> {
        if self.sns.default_topic_arn.is_empty() {
            return Ok(None);
        }
        let entries = route_entries(&self.sns.routes, "sns.routes", "sns_topic_arn", |r| {
            r.sns_topic_arn.as_deref()
        })?;
        Ok(Some(RouteTable::with_entries(
            &self.sns.default_topic_arn,
            entries,
        )))
    }

    /// Dedup settings, or `None` when threading is disabled.
    pub fn dedup_settings(&self) -> Option<DedupSettings> {
        if self.dedup.table_name.is_empty() {
            return None;
        }
        Some(DedupSettings {
            table_name: self.dedup.table_name.clone(),
            ttl: Duration::from_secs(self.dedup.ttl_secs),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.runtime.request_timeout_secs)
    }

    /// Copy with credentials and webhook URLs masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        mask(&mut copy.slack.bot_token);
        mask(&mut copy.slack.hook_url);
        for route in &mut copy.slack.routes {
            if let Some(url) = route.slack_hook_url.as_mut() {
                mask(url);
            }
        }
        copy
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// trace, debug, info, warn, error
    pub log_level: String,
    /// json or pretty
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// Raw rule inputs. Assembly into ordered lists happens in the rule engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub use_default_rules: bool,
    pub rules: Vec<String>,
    pub ignore_rules: Vec<String>,
    /// Separator for the `RULES` / `IGNORE_RULES` variables.
    pub rules_separator: String,
    /// Event names that always match.
    pub events_to_track: Vec<String>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            use_default_rules: false,
            rules: Vec::new(),
            ignore_rules: Vec::new(),
            rules_separator: ",".to_owned(),
            events_to_track: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    pub hook_url: String,
    pub bot_token: String,
    pub default_channel_id: String,
    pub routes: Vec<AccountRoute>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnsConfig {
    pub default_topic_arn: String,
    pub routes: Vec<AccountRoute>,
}

/// One entry of the `CONFIGURATION` / `SNS_CONFIGURATION` JSON lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRoute {
    pub accounts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack_hook_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack_channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sns_topic_arn: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Empty disables threading.
    pub table_name: String,
    pub ttl_secs: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            table_name: String::new(),
            ttl_secs: DEFAULT_DEDUP_TTL_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Post a Slack diagnostic for every rule that fails to evaluate.
    pub rule_evaluation_errors_to_slack: bool,
    /// Emit the AccessDenied seen/ignored counter pair.
    pub push_access_denied_metrics: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Upper bound for every outbound network call.
    pub request_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Validated dedup store settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupSettings {
    pub table_name: String,
    pub ttl: Duration,
}

/// Splits a separator-delimited rule string, dropping empty entries.
pub fn split_rules(raw: &str, separator: &str) -> Vec<String> {
    raw.split(separator)
        .filter(|rule| !rule.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Splits a comma-separated event name list, removing all spaces.
pub fn split_event_names(raw: &str) -> Vec<String> {
    raw.replace(' ', "")
        .split(',')
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}

/// `true`/`1` in any case; everything else is false.
fn parse_flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

fn route_entries(
    routes: &[AccountRoute],
    section: &str,
    key: &str,
    destination: impl Fn(&AccountRoute) -> Option<&str>,
) -> Result<Vec<RouteEntry>, ConfigError> {
    routes
        .iter()
        .enumerate()
        .map(|(i, route)| match destination(route) {
            Some(dest) if !dest.is_empty() => Ok(RouteEntry::new(route.accounts.clone(), dest)),
            _ => Err(ConfigError::InvalidValue {
                field: format!("{section}[{i}].{key}"),
                reason: format!("{key} is required for every route entry"),
            }),
        })
        .collect()
}

fn parse_json_routes(raw: &str, env_key: &str) -> Result<Vec<AccountRoute>, ConfigError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw).map_err(|e| ConfigError::ParseFailed {
        reason: format!("{env_key}: {e}"),
    })
}

fn mask(value: &mut String) {
    if !value.is_empty() {
        *value = REDACTED.to_owned();
    }
}

// --- override helpers ---

fn override_string<F>(target: &mut String, key: &str, lookup: &F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup(key) {
        *target = val;
    }
}

fn override_flag<F>(target: &mut bool, key: &str, lookup: &F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup(key) {
        *target = parse_flag(&val);
    }
}

fn override_u64<F>(target: &mut u64, key: &str, lookup: &F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup(key) {
        match val.trim().parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key = key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

//! Channel-agnostic notification content.
//!
//! A [`Notification`] is a headline, labelled detail sections and footer
//! fields. Renderers for each channel ([`crate::slack`], [`crate::sns`])
//! turn it into wire payloads; nothing here knows about markup.

use chrono::{DateTime, Utc};
use serde_json::Value;

use trailpost_core::CloudTrailRecord;

/// Placeholder for absent footer values.
pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, PartialEq)]
pub enum Headline {
    /// `actor` called `event_name`, optionally failing with `error_code`.
    ApiCall {
        actor: String,
        event_name: String,
        error_code: Option<String>,
    },
    /// A warning-styled notice about the pipeline itself.
    Notice(String),
}

impl Headline {
    /// Markup-free rendering.
    pub fn plain(&self) -> String {
        match self {
            Self::ApiCall {
                actor,
                event_name,
                error_code: None,
            } => format!("{actor} called {event_name}"),
            Self::ApiCall {
                actor,
                event_name,
                error_code: Some(code),
            } => format!("{actor} called {event_name} but failed due to {code}"),
            Self::Notice(text) => text.clone(),
        }
    }
}

/// What a detail section holds. Determines label and rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    ErrorMessage,
    MfaWarning,
    RequestParameters,
    ResponseElements,
    AdditionalEventData,
    /// Error text of a diagnostic notice.
    Error,
    /// Object keys a diagnostic notice is about.
    Objects,
    /// Rule text of a rule evaluation notice.
    Rule,
}

impl SectionKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::ErrorMessage => "Error message",
            Self::MfaWarning => "Login without MFA!",
            Self::RequestParameters => "requestParameters",
            Self::ResponseElements => "responseElements",
            Self::AdditionalEventData => "additionalEventData",
            Self::Error => "Error",
            Self::Objects => "Object(s)",
            Self::Rule => "Rule",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SectionBody {
    /// Free text, rendered verbatim.
    Text(String),
    /// Preformatted text.
    Code(String),
    /// Structured data, pretty-printed by renderers that need text.
    Json(Value),
    /// The label alone carries the message.
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub kind: SectionKind,
    pub body: SectionBody,
}

impl Section {
    pub fn new(kind: SectionKind, body: SectionBody) -> Self {
        Self { kind, body }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FooterKind {
    Time,
    EventId,
    AccountId,
    Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FooterField {
    pub kind: FooterKind,
    pub value: String,
}

/// One message for a human, independent of the channel carrying it.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub headline: Headline,
    pub sections: Vec<Section>,
    pub footer: Vec<FooterField>,
}

impl Notification {
    /// Notification for a matched record read from `source_key`.
    pub fn for_record(record: &CloudTrailRecord, source_key: &str) -> Self {
        let mut sections = Vec::new();
        if let Some(message) = record.error_message() {
            sections.push(Section::new(
                SectionKind::ErrorMessage,
                SectionBody::Code(message.to_owned()),
            ));
        }
        if record.is_console_login_without_mfa() {
            sections.push(Section::new(SectionKind::MfaWarning, SectionBody::Empty));
        }
        let data = [
            (SectionKind::RequestParameters, record.request_parameters()),
            (SectionKind::ResponseElements, record.response_elements()),
            (SectionKind::AdditionalEventData, record.additional_event_data()),
        ];
        for (kind, value) in data {
            if let Some(value) = value {
                sections.push(Section::new(kind, SectionBody::Json(value.clone())));
            }
        }

        let footer = vec![
            FooterField {
                kind: FooterKind::Time,
                value: display_time(record.event_time()),
            },
            FooterField {
                kind: FooterKind::EventId,
                value: record.event_id().unwrap_or(NOT_AVAILABLE).to_owned(),
            },
            FooterField {
                kind: FooterKind::AccountId,
                value: record.account_id().to_owned(),
            },
            FooterField {
                kind: FooterKind::Location,
                value: source_key.to_owned(),
            },
        ];

        Self {
            headline: Headline::ApiCall {
                actor: record.actor().to_owned(),
                event_name: record.event_name().to_owned(),
                error_code: record.error_code().map(str::to_owned),
            },
            sections,
            footer,
        }
    }

    /// Diagnostic for a log object (or batch of objects) that could not be
    /// processed.
    pub fn failed_to_process(error: &str, object_keys: &[String]) -> Self {
        Self {
            headline: Headline::Notice("Failed to process event:".to_owned()),
            sections: vec![
                Section::new(SectionKind::Error, SectionBody::Code(error.to_owned())),
                Section::new(
                    SectionKind::Objects,
                    SectionBody::Text(object_keys.join("\n ")),
                ),
            ],
            footer: Vec::new(),
        }
    }

    /// Diagnostic for one rule that failed against a record.
    pub fn failed_to_evaluate(rule: &str, error: &str, object_key: &str) -> Self {
        Self {
            headline: Headline::Notice("Failed to evaluate rule:".to_owned()),
            sections: vec![
                Section::new(SectionKind::Rule, SectionBody::Code(rule.to_owned())),
                Section::new(SectionKind::Error, SectionBody::Code(error.to_owned())),
                Section::new(
                    SectionKind::Objects,
                    SectionBody::Text(object_key.to_owned()),
                ),
            ],
            footer: Vec::new(),
        }
    }

    /// Notice for a CloudTrail log object deleted from its bucket.
    pub fn object_removed(
        bucket: &str,
        key: &str,
        event_time: Option<&str>,
        account_id: &str,
    ) -> Self {
        Self {
            headline: Headline::Notice("CloudTrail log object was removed:".to_owned()),
            sections: vec![Section::new(
                SectionKind::Objects,
                SectionBody::Text(format!("s3://{bucket}/{key}")),
            )],
            footer: vec![
                FooterField {
                    kind: FooterKind::Time,
                    value: display_time(event_time),
                },
                FooterField {
                    kind: FooterKind::AccountId,
                    value: account_id.to_owned(),
                },
            ],
        }
    }

    pub fn footer_value(&self, kind: FooterKind) -> Option<&str> {
        self.footer
            .iter()
            .find(|field| field.kind == kind)
            .map(|field| field.value.as_str())
    }

    pub fn section(&self, kind: SectionKind) -> Option<&SectionBody> {
        self.sections
            .iter()
            .find(|section| section.kind == kind)
            .map(|section| &section.body)
    }
}

/// Parses a CloudTrail timestamp; `None` when absent or malformed.
pub fn parse_event_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|time| time.with_timezone(&Utc))
}

/// `2024-01-15 12:00:00`, or the raw text when it does not parse.
fn display_time(raw: Option<&str>) -> String {
    match raw {
        Some(raw) => parse_event_time(raw)
            .map(|time| time.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| raw.to_owned()),
        None => NOT_AVAILABLE.to_owned(),
    }
}

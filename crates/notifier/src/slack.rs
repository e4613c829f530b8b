//! Slack rendering and transport.
//!
//! [`render`] turns a [`Notification`] into Block Kit JSON. [`SlackTransport`]
//! is the seam the dispatcher posts through; [`SlackHttpClient`] implements
//! it with `reqwest` against incoming webhooks and `chat.postMessage`.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json::ser::{PrettyFormatter, Serializer};
use tracing::debug;

use trailpost_core::error::DeliveryError;

use crate::message::{FooterKind, Headline, Notification, SectionBody, SectionKind};

const API_BASE: &str = "https://slack.com/api";

/// Channel name used in delivery errors and metric labels.
pub const CHANNEL: &str = "slack";

// ============================================================================
// Block Kit
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextObject {
    #[serde(rename = "type")]
    pub text_type: &'static str,
    pub text: String,
}

impl TextObject {
    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self {
            text_type: "mrkdwn",
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { text: TextObject },
    Context { elements: Vec<TextObject> },
    Divider {},
}

/// Rendered message: Block Kit blocks plus notification fallback text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlackMessage {
    pub text: String,
    pub blocks: Vec<Block>,
}

/// Renders `notification` as Block Kit.
pub fn render(notification: &Notification) -> SlackMessage {
    let mut blocks = vec![Block::Section {
        text: TextObject::mrkdwn(headline(&notification.headline)),
    }];

    match notification.headline {
        Headline::ApiCall { .. } => render_record_body(notification, &mut blocks),
        Headline::Notice(_) => render_notice_body(notification, &mut blocks),
    }

    let context: Vec<TextObject> = notification
        .footer
        .iter()
        .map(|field| TextObject::mrkdwn(footer_text(field.kind, &field.value)))
        .collect();
    if !context.is_empty() {
        blocks.push(Block::Context { elements: context });
    }
    blocks.push(Block::Divider {});

    SlackMessage {
        text: notification.headline.plain(),
        blocks,
    }
}

fn headline(headline: &Headline) -> String {
    match headline {
        Headline::ApiCall {
            actor,
            event_name,
            error_code,
        } => {
            let title = format!("*{actor}* called *{event_name}*");
            match error_code {
                Some(code) => format!(":warning: {title} but failed due to ```{code}``` :warning:"),
                None => title,
            }
        }
        Headline::Notice(text) => format!(":warning: *{text}*  :warning:"),
    }
}

/// Error and MFA sections as blocks; record data as one context block.
fn render_record_body(notification: &Notification, blocks: &mut Vec<Block>) {
    let mut data = Vec::new();
    for section in &notification.sections {
        let label = section.kind.label();
        match (section.kind, &section.body) {
            (SectionKind::MfaWarning, _) => blocks.push(Block::Section {
                text: TextObject::mrkdwn(format!(":warning: *{label}* :warning:")),
            }),
            (SectionKind::ErrorMessage, body) => blocks.push(Block::Section {
                text: TextObject::mrkdwn(format!("*{label}:* {}", body_text(body))),
            }),
            (_, body) => data.push(TextObject::mrkdwn(format!("*{label}:* {}", body_text(body)))),
        }
    }
    if !data.is_empty() {
        blocks.push(Block::Context { elements: data });
    }
}

/// One context block per section, label on its own line.
fn render_notice_body(notification: &Notification, blocks: &mut Vec<Block>) {
    for section in &notification.sections {
        blocks.push(Block::Context {
            elements: vec![TextObject::mrkdwn(format!(
                "*{}:* \n{}",
                section.kind.label(),
                body_text(&section.body)
            ))],
        });
    }
}

fn body_text(body: &SectionBody) -> String {
    match body {
        SectionBody::Text(text) => text.clone(),
        SectionBody::Code(text) => format!("```{text}```"),
        SectionBody::Json(value) => format!("```{}```", pretty_json(value)),
        SectionBody::Empty => String::new(),
    }
}

fn footer_text(kind: FooterKind, value: &str) -> String {
    match kind {
        FooterKind::Time => format!("Time: {value} UTC"),
        FooterKind::EventId => format!("Id: {value}"),
        FooterKind::AccountId => format!("Account Id: {value}"),
        FooterKind::Location => format!("Event location in s3:\n{value}"),
    }
}

/// JSON with four-space indentation.
pub fn pretty_json(value: &Value) -> String {
    let mut out = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    if value.serialize(&mut serializer).is_err() {
        return value.to_string();
    }
    String::from_utf8(out).unwrap_or_else(|_| value.to_string())
}

// ============================================================================
// transport
// ============================================================================

/// Outbound Slack calls.
pub trait SlackTransport: Send + Sync + 'static {
    /// Posts to a channel through the bot API, optionally as a reply in
    /// `thread_ts`, and returns the new message's `ts`.
    ///
    /// # Errors
    ///
    /// [`DeliveryError::Rejected`] when Slack answers `ok: false`;
    /// [`DeliveryError::Transport`] when no answer arrives.
    fn post_message(
        &self,
        channel: &str,
        notification: &Notification,
        thread_ts: Option<&str>,
    ) -> impl Future<Output = Result<String, DeliveryError>> + Send;

    /// Posts to an incoming webhook and returns the HTTP status code.
    fn post_webhook(
        &self,
        url: &str,
        notification: &Notification,
    ) -> impl Future<Output = Result<u16, DeliveryError>> + Send;
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    error: Option<String>,
    ts: Option<String>,
}

#[derive(Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
    blocks: &'a [Block],
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_ts: Option<&'a str>,
}

/// `reqwest`-backed [`SlackTransport`].
pub struct SlackHttpClient {
    client: Client,
    bot_token: Option<String>,
}

impl SlackHttpClient {
    /// Builds a client whose requests give up after `timeout`.
    ///
    /// `bot_token` is only needed for [`SlackTransport::post_message`].
    pub fn new(bot_token: Option<String>, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| transport(&e))?;
        Ok(Self { client, bot_token })
    }
}

impl std::fmt::Debug for SlackHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackHttpClient")
            .field("bot_token", &self.bot_token.as_ref().map(|_| "***"))
            .finish()
    }
}

fn transport(err: &reqwest::Error) -> DeliveryError {
    DeliveryError::Transport {
        channel: CHANNEL.to_owned(),
        reason: err.to_string(),
    }
}

fn rejected(reason: impl Into<String>) -> DeliveryError {
    DeliveryError::Rejected {
        channel: CHANNEL.to_owned(),
        reason: reason.into(),
    }
}

impl SlackTransport for SlackHttpClient {
    async fn post_message(
        &self,
        channel: &str,
        notification: &Notification,
        thread_ts: Option<&str>,
    ) -> Result<String, DeliveryError> {
        let Some(token) = self.bot_token.as_deref() else {
            return Err(rejected("bot token is not configured"));
        };
        let message = render(notification);
        let body = PostMessageRequest {
            channel,
            text: &message.text,
            blocks: &message.blocks,
            thread_ts,
        };
        debug!(channel, thread_ts, "posting slack message");

        let resp = self
            .client
            .post(format!("{API_BASE}/chat.postMessage"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport(&e))?;

        let parsed: PostMessageResponse = resp.json().await.map_err(|e| transport(&e))?;
        if !parsed.ok {
            return Err(rejected(
                parsed.error.unwrap_or_else(|| "unknown error".into()),
            ));
        }
        parsed.ts.ok_or_else(|| rejected("response carried no ts"))
    }

    async fn post_webhook(
        &self,
        url: &str,
        notification: &Notification,
    ) -> Result<u16, DeliveryError> {
        let message = render(notification);
        debug!("posting slack webhook message");
        let resp = self
            .client
            .post(url)
            .json(&message)
            .send()
            .await
            .map_err(|e| transport(&e))?;
        Ok(resp.status().as_u16())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use trailpost_core::CloudTrailRecord;

    use super::*;

    fn record_notification(value: Value) -> Notification {
        Notification::for_record(&CloudTrailRecord::from_value(value).unwrap(), "key.json.gz")
    }

    fn texts(block: &Block) -> Vec<&str> {
        match block {
            Block::Section { text } => vec![text.text.as_str()],
            Block::Context { elements } => elements.iter().map(|e| e.text.as_str()).collect(),
            Block::Divider {} => vec![],
        }
    }

    #[test]
    fn plain_record_layout() {
        let message = render(&record_notification(json!({
            "eventName": "CreateUser",
            "eventTime": "2024-01-15T12:00:00Z",
            "eventID": "id-1",
            "userIdentity": {"arn": "arn:aws:iam::111:user/alice", "accountId": "111"},
            "requestParameters": {"userName": "bob"}
        })));
        assert_eq!(message.blocks.len(), 4);
        assert_eq!(
            texts(&message.blocks[0]),
            ["*arn:aws:iam::111:user/alice* called *CreateUser*"]
        );
        assert_eq!(
            texts(&message.blocks[1]),
            ["*requestParameters:* ```{\n    \"userName\": \"bob\"\n}```"]
        );
        assert_eq!(
            texts(&message.blocks[2]),
            [
                "Time: 2024-01-15 12:00:00 UTC",
                "Id: id-1",
                "Account Id: 111",
                "Event location in s3:\nkey.json.gz"
            ]
        );
        assert_eq!(message.blocks[3], Block::Divider {});
        assert_eq!(message.text, "arn:aws:iam::111:user/alice called CreateUser");
    }

    #[test]
    fn failed_call_gets_warning_title_and_error_section() {
        let message = render(&record_notification(json!({
            "eventName": "ConsoleLogin",
            "errorCode": "AccessDenied",
            "errorMessage": "nope",
            "additionalEventData": {"MFAUsed": "No"}
        })));
        assert_eq!(
            texts(&message.blocks[0]),
            [":warning: *Unknown Identity* called *ConsoleLogin* but failed due to ```AccessDenied``` :warning:"]
        );
        assert_eq!(texts(&message.blocks[1]), ["*Error message:* ```nope```"]);
        assert_eq!(
            texts(&message.blocks[2]),
            [":warning: *Login without MFA!* :warning:"]
        );
    }

    #[test]
    fn notice_layout() {
        let message = render(&Notification::failed_to_process(
            "access denied",
            &["a.json.gz".to_owned()],
        ));
        assert_eq!(
            texts(&message.blocks[0]),
            [":warning: *Failed to process event:*  :warning:"]
        );
        assert_eq!(texts(&message.blocks[1]), ["*Error:* \n```access denied```"]);
        assert_eq!(texts(&message.blocks[2]), ["*Object(s):* \na.json.gz"]);
        assert_eq!(message.blocks.len(), 4);
    }

    #[test]
    fn blocks_serialize_to_block_kit() {
        let value = serde_json::to_value(render(&Notification::failed_to_evaluate(
            "r", "e", "k",
        )))
        .unwrap();
        assert_eq!(value["blocks"][0]["type"], "section");
        assert_eq!(value["blocks"][0]["text"]["type"], "mrkdwn");
        assert_eq!(value["blocks"][1]["type"], "context");
        assert_eq!(value["blocks"].as_array().unwrap().last().unwrap(), &json!({"type": "divider"}));
    }

    #[test]
    fn post_message_request_omits_missing_thread() {
        let blocks = vec![Block::Divider {}];
        let body = PostMessageRequest {
            channel: "C1",
            text: "t",
            blocks: &blocks,
            thread_ts: None,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert!(value.get("thread_ts").is_none());
        assert_eq!(value["channel"], "C1");
    }

    #[test]
    fn debug_redacts_token() {
        let client = SlackHttpClient::new(Some("xoxb-secret".to_owned()), Duration::from_secs(1))
            .unwrap();
        assert!(!format!("{client:?}").contains("xoxb-secret"));
    }
}

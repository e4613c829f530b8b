//! SNS rendering and the topic publisher seam.

use std::future::Future;

use serde::Serialize;
use serde_json::Value;

use trailpost_core::CloudTrailRecord;
use trailpost_core::error::DeliveryError;

use crate::message::{NOT_AVAILABLE, parse_event_time};

/// Channel name used in delivery errors and metric labels.
pub const CHANNEL: &str = "sns";

/// Publishes a message body to a topic.
pub trait TopicPublisher: Send + Sync + 'static {
    /// # Errors
    ///
    /// [`DeliveryError`] when the topic did not accept the message.
    fn publish(
        &self,
        topic_arn: &str,
        message: &str,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

/// Flat JSON document published for a matched record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnsDocument<'a> {
    pub title: String,
    pub error_message: Option<&'a str>,
    pub request_parameters: Option<&'a Value>,
    pub response_elements: Option<&'a Value>,
    pub additional_details: Option<&'a Value>,
    pub account_id: &'a str,
    pub event_time: String,
    pub event_id: &'a str,
    pub actor: &'a str,
    pub source_file: &'a str,
}

impl<'a> SnsDocument<'a> {
    pub fn new(record: &'a CloudTrailRecord, source_key: &'a str) -> Self {
        let mut title = format!("{} called {}", record.actor(), record.event_name());
        if let Some(code) = record.error_code() {
            title.push_str(&format!(" but failed due to {code}"));
        }
        let account_id = match record.account_id() {
            "" => NOT_AVAILABLE,
            id => id,
        };
        let event_time = match record.event_time() {
            Some(raw) => parse_event_time(raw)
                .map(|time| time.format("%Y-%m-%d %H:%M:%S%:z").to_string())
                .unwrap_or_else(|| raw.to_owned()),
            None => NOT_AVAILABLE.to_owned(),
        };
        Self {
            title,
            error_message: record.error_message(),
            request_parameters: record.request_parameters(),
            response_elements: record.response_elements(),
            additional_details: record.additional_event_data(),
            account_id,
            event_time,
            event_id: record.event_id().unwrap_or(NOT_AVAILABLE),
            actor: record.actor(),
            source_file: source_key,
        }
    }
}

/// Message body for `record`, as published to the topic.
pub fn render(record: &CloudTrailRecord, source_key: &str) -> String {
    let document = SnsDocument::new(record, source_key);
    // Only borrowed JSON values and strings; serialization cannot fail.
    serde_json::to_string(&document).unwrap_or_default()
}

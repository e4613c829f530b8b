//! Trigger payload normalisation.
//!
//! Three payload shapes reach the function:
//!
//! - S3 event notifications: `{"Records": [{"eventName", "s3": {...}}]}`
//! - the same wrapped in SNS: `{"Records": [{"Sns": {"Message": "<json>"}}]}`
//! - EventBridge S3 events: `{"detail-type": "Object Created", "detail": {...}}`
//!
//! All of them become a list of [`ObjectEvent`]s.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use trailpost_core::error::SourceError;

/// Marker in the object key of CloudTrail digest files.
pub const DIGEST_MARKER: &str = "CloudTrail-Digest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectEventKind {
    Created,
    Removed,
}

/// One log object that was written or deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEvent {
    pub bucket: String,
    /// Decoded object key.
    pub key: String,
    /// Account the notification names, or empty.
    pub account_id: String,
    pub event_time: Option<String>,
    pub kind: ObjectEventKind,
}

impl ObjectEvent {
    pub fn is_digest(&self) -> bool {
        self.key.contains(DIGEST_MARKER)
    }
}

#[derive(Deserialize)]
struct S3Record {
    #[serde(rename = "eventName", default)]
    event_name: String,
    #[serde(rename = "eventTime")]
    event_time: Option<String>,
    #[serde(rename = "userIdentity")]
    user_identity: Option<AccountIdentity>,
    s3: S3Entity,
}

#[derive(Deserialize)]
struct AccountIdentity {
    #[serde(rename = "accountId", default)]
    account_id: String,
}

#[derive(Deserialize)]
struct S3Entity {
    bucket: BucketRef,
    object: ObjectRef,
}

#[derive(Deserialize)]
struct BucketRef {
    name: String,
}

#[derive(Deserialize)]
struct ObjectRef {
    key: String,
}

#[derive(Deserialize)]
struct EventBridgeEvent {
    #[serde(rename = "detail-type")]
    detail_type: String,
    #[serde(default)]
    account: String,
    time: Option<String>,
    detail: S3Entity,
}

/// Extracts every object event from a trigger payload.
///
/// Individual records that cannot be understood (bad SNS message JSON,
/// records that are not S3 notifications) are logged and skipped.
///
/// # Errors
///
/// [`SourceError::Envelope`] when the payload as a whole has no known
/// shape, or names an EventBridge `detail-type` other than object
/// creation or deletion.
pub fn parse(payload: &Value) -> Result<Vec<ObjectEvent>, SourceError> {
    if let Some(records) = payload.get("Records").and_then(Value::as_array) {
        let mut events = Vec::new();
        for record in records {
            collect_record(record, &mut events);
        }
        return Ok(events);
    }
    if payload.get("detail-type").is_some() {
        return parse_eventbridge(payload).map(|event| vec![event]);
    }
    Err(SourceError::Envelope(
        "payload has neither Records nor detail-type".to_owned(),
    ))
}

fn collect_record(record: &Value, events: &mut Vec<ObjectEvent>) {
    if let Some(sns) = record.get("Sns") {
        let Some(message) = sns.get("Message").and_then(Value::as_str) else {
            warn!("sns record without a Message string, skipping");
            return;
        };
        match serde_json::from_str::<Value>(message) {
            Ok(inner) => match parse(&inner) {
                Ok(inner_events) => events.extend(inner_events),
                Err(e) => warn!(error = %e, "unsupported payload inside sns message, skipping"),
            },
            Err(e) => warn!(error = %e, "sns message is not valid JSON, skipping"),
        }
        return;
    }

    match serde_json::from_value::<S3Record>(record.clone()) {
        Ok(s3) => events.push(from_s3_record(s3)),
        Err(e) => warn!(error = %e, "record is not an S3 notification, skipping"),
    }
}

fn from_s3_record(record: S3Record) -> ObjectEvent {
    let kind = if record.event_name.starts_with("ObjectRemoved") {
        ObjectEventKind::Removed
    } else {
        ObjectEventKind::Created
    };
    ObjectEvent {
        bucket: record.s3.bucket.name,
        key: decode_key(&record.s3.object.key),
        account_id: record
            .user_identity
            .map(|identity| identity.account_id)
            .unwrap_or_default(),
        event_time: record.event_time,
        kind,
    }
}

fn parse_eventbridge(payload: &Value) -> Result<ObjectEvent, SourceError> {
    let event: EventBridgeEvent = serde_json::from_value(payload.clone())
        .map_err(|e| SourceError::Envelope(format!("eventbridge event: {e}")))?;
    let kind = match event.detail_type.as_str() {
        "Object Created" => ObjectEventKind::Created,
        "Object Deleted" | "Object Removed" => ObjectEventKind::Removed,
        other => {
            return Err(SourceError::Envelope(format!(
                "Unknown EventBridge detail-type: {other}"
            )));
        }
    };
    Ok(ObjectEvent {
        bucket: event.detail.bucket.name,
        key: event.detail.object.key,
        account_id: event.account,
        event_time: event.time,
        kind,
    })
}

/// Decodes an S3 notification key (`+` for space, then percent escapes).
/// Keys that do not decode to UTF-8 are returned as given.
pub fn decode_key(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(Cow::Borrowed(_)) => spaced,
        Ok(Cow::Owned(decoded)) => decoded,
        Err(_) => raw.to_owned(),
    }
}

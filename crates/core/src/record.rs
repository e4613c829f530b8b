//! CloudTrail record wrapper.
//!
//! [`CloudTrailRecord`] holds one API-call event exactly as CloudTrail wrote
//! it. Construction checks the only structural requirement the pipeline has
//! (an object with a string `eventName`); every other field is optional and
//! read through accessors.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::RecordError;

/// Actor label used when a record carries no `userIdentity.arn`.
pub const UNKNOWN_IDENTITY: &str = "Unknown Identity";

/// One CloudTrail API-call event.
///
/// Immutable once constructed. Member order of the underlying JSON is
/// preserved, which keeps flattening deterministic.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CloudTrailRecord {
    raw: Value,
}

impl CloudTrailRecord {
    /// Wraps a parsed JSON value.
    ///
    /// # Errors
    ///
    /// [`RecordError::NotAnObject`] when the root is not an object and
    /// [`RecordError::MissingField`] when `eventName` is absent or not a string.
    pub fn from_value(raw: Value) -> Result<Self, RecordError> {
        let Some(obj) = raw.as_object() else {
            return Err(RecordError::NotAnObject);
        };
        if !obj.get("eventName").is_some_and(Value::is_string) {
            return Err(RecordError::MissingField {
                field: "eventName".to_owned(),
            });
        }
        Ok(Self { raw })
    }

    /// The record as a JSON value.
    pub fn as_value(&self) -> &Value {
        &self.raw
    }

    pub fn into_value(self) -> Value {
        self.raw
    }

    pub fn event_name(&self) -> &str {
        self.str_field("eventName").unwrap_or_default()
    }

    pub fn event_source(&self) -> Option<&str> {
        self.str_field("eventSource")
    }

    pub fn event_time(&self) -> Option<&str> {
        self.str_field("eventTime")
    }

    pub fn event_id(&self) -> Option<&str> {
        self.str_field("eventID")
    }

    pub fn error_code(&self) -> Option<&str> {
        self.str_field("errorCode")
    }

    pub fn error_message(&self) -> Option<&str> {
        self.str_field("errorMessage")
    }

    /// The `userIdentity` object, if present.
    pub fn user_identity(&self) -> Option<&Map<String, Value>> {
        self.raw.get("userIdentity").and_then(Value::as_object)
    }

    /// A string member of `userIdentity`.
    pub fn identity_field(&self, field: &str) -> Option<&str> {
        self.user_identity()
            .and_then(|identity| identity.get(field))
            .and_then(Value::as_str)
    }

    /// Account the call was made from, or an empty string.
    ///
    /// This is the key for per-account destination routing.
    pub fn account_id(&self) -> &str {
        self.identity_field("accountId").unwrap_or_default()
    }

    /// ARN of the caller, or [`UNKNOWN_IDENTITY`].
    pub fn actor(&self) -> &str {
        self.identity_field("arn").unwrap_or(UNKNOWN_IDENTITY)
    }

    pub fn request_parameters(&self) -> Option<&Value> {
        self.non_null_field("requestParameters")
    }

    pub fn response_elements(&self) -> Option<&Value> {
        self.non_null_field("responseElements")
    }

    pub fn additional_event_data(&self) -> Option<&Value> {
        self.non_null_field("additionalEventData")
    }

    /// True for a `ConsoleLogin` whose `additionalEventData.MFAUsed` is not `Yes`.
    pub fn is_console_login_without_mfa(&self) -> bool {
        if self.event_name() != "ConsoleLogin" {
            return false;
        }
        let mfa_used = self
            .additional_event_data()
            .and_then(|data| data.get("MFAUsed"))
            .and_then(Value::as_str);
        mfa_used != Some("Yes")
    }

    /// True when `errorCode` mentions `AccessDenied`.
    pub fn is_access_denied(&self) -> bool {
        self.error_code()
            .is_some_and(|code| code.contains("AccessDenied"))
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.raw.get(key).and_then(Value::as_str)
    }

    fn non_null_field(&self, key: &str) -> Option<&Value> {
        self.raw.get(key).filter(|v| !v.is_null())
    }
}

impl TryFrom<Value> for CloudTrailRecord {
    type Error = RecordError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl<'de> Deserialize<'de> for CloudTrailRecord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Value::deserialize(deserializer)?;
        Self::from_value(raw).map_err(serde::de::Error::custom)
    }
}

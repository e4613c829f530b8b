//! Error taxonomy shared by every trailpost crate.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum TrailpostError {
    /// Configuration could not be loaded or is invalid.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// A CloudTrail record is structurally unusable.
    #[error("record error: {0}")]
    Record(#[from] RecordError),

    /// Rule set assembly failed.
    #[error("rule error: {0}")]
    Rule(#[from] RuleError),

    /// The thread binding store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A notification could not be delivered.
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// A log object could not be fetched or decoded.
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file does not exist.
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// TOML or embedded JSON could not be parsed.
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// A value is present but unusable.
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Errors about the shape of a single record.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// The record root is not a JSON object.
    #[error("record is not a JSON object")]
    NotAnObject,

    /// A field the pipeline depends on is missing or has the wrong type.
    #[error("record is missing required field '{field}'")]
    MissingField { field: String },
}

/// Rule set errors.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// Neither default nor user rules are configured.
    #[error("Have no rules to apply! Add some rules or enable default rules")]
    NoRules,

    /// A rule failed to compile.
    #[error("invalid rule '{rule}': {reason}")]
    Invalid { rule: String, reason: String },
}

/// Thread binding store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached or rejected the call.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored item has an unexpected shape.
    #[error("corrupt item for key '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    /// The call did not complete within the configured timeout.
    #[error("store call timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// Notification delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The channel answered with a non-success HTTP status.
    #[error("{channel} returned status {status}")]
    Status { channel: String, status: u16 },

    /// The channel API reported a failure in its response body.
    #[error("{channel} rejected message: {reason}")]
    Rejected { channel: String, reason: String },

    /// Transport failure before a response was received.
    #[error("{channel} transport error: {reason}")]
    Transport { channel: String, reason: String },

    /// The call did not complete within the configured timeout.
    #[error("{channel} call timed out after {secs}s")]
    Timeout { channel: String, secs: u64 },
}

/// Log object retrieval and decoding errors.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The trigger payload could not be understood.
    #[error("unsupported trigger payload: {0}")]
    Envelope(String),

    /// The object could not be fetched.
    #[error("failed to fetch s3://{bucket}/{key}: {reason}")]
    Fetch {
        bucket: String,
        key: String,
        reason: String,
    },

    /// The object body is not a CloudTrail log document.
    #[error("failed to decode log object: {0}")]
    Decode(String),
}

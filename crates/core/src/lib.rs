//! Shared building blocks for the trailpost workspace.
//!
//! - [`record`]: validated CloudTrail record wrapper
//! - [`route`]: per-account destination tables and the Slack target variant
//! - [`config`]: TOML + environment configuration, validated into typed settings
//! - [`logfile`]: CloudTrail log object decoding (plain or gzip JSON)
//! - [`metrics`]: metric names and descriptions
//! - [`error`]: workspace-wide error taxonomy

pub mod config;
pub mod error;
pub mod logfile;
pub mod metrics;
pub mod record;
pub mod route;

// errors
pub use error::{
    ConfigError, DeliveryError, RecordError, RuleError, SourceError, StoreError, TrailpostError,
};

// configuration
pub use config::{DedupSettings, TrailpostConfig};

// domain types
pub use record::CloudTrailRecord;
pub use route::{RouteEntry, RouteTable, SlackTarget};

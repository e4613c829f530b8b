//! Delivery side of trailpost.
//!
//! - [`fingerprint`]: actor/action digests used as thread keys
//! - [`dedup`]: TTL thread bindings over a pluggable [`ThreadStore`]
//! - [`message`]: channel-agnostic [`Notification`] content
//! - [`slack`] / [`sns`]: renderers and transport seams per channel
//! - [`metrics_sink`]: the AccessDenied counter pair
//! - [`router`]: the [`Dispatcher`] tying it together
//! - [`recording`]: in-process collaborators for previews and tests

pub mod dedup;
pub mod error;
pub mod fingerprint;
pub mod message;
pub mod metrics_sink;
pub mod recording;
pub mod router;
pub mod slack;
pub mod sns;

pub use dedup::{
    Clock, DedupStore, ManualClock, MemoryThreadStore, StoredBinding, SystemClock, ThreadStore,
};
pub use error::NotifierError;
pub use fingerprint::{Fingerprint, fingerprint};
pub use message::Notification;
pub use metrics_sink::{AccessDeniedCounter, FacadeMetricsSink, MetricsSink};
pub use router::{DispatchOptions, DispatchOutcome, Dispatcher, SlackDelivery};
pub use slack::{SlackHttpClient, SlackTransport};
pub use sns::TopicPublisher;

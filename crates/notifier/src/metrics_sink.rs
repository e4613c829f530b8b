//! Sink for the AccessDenied counter pair.

use trailpost_core::metrics::{
    ACCESS_DENIED_IGNORED_METRIC, ACCESS_DENIED_IGNORED_TOTAL, ACCESS_DENIED_NAMESPACE,
    ACCESS_DENIED_SEEN_METRIC, ACCESS_DENIED_SEEN_TOTAL, LABEL_NAMESPACE,
};

/// Which counter of the pair to bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDeniedCounter {
    Seen,
    Ignored,
}

impl AccessDeniedCounter {
    /// Name under the external metric namespace.
    pub fn metric_name(self) -> &'static str {
        match self {
            Self::Seen => ACCESS_DENIED_SEEN_METRIC,
            Self::Ignored => ACCESS_DENIED_IGNORED_METRIC,
        }
    }

    fn facade_name(self) -> &'static str {
        match self {
            Self::Seen => ACCESS_DENIED_SEEN_TOTAL,
            Self::Ignored => ACCESS_DENIED_IGNORED_TOTAL,
        }
    }
}

/// Receives named counter increments.
///
/// Increments are fire-and-forget; implementations that talk to a remote
/// service buffer and flush on their own schedule.
pub trait MetricsSink: Send + Sync + 'static {
    fn increment(&self, counter: AccessDeniedCounter);
}

/// Records through the `metrics` facade, tagged with the namespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct FacadeMetricsSink;

impl MetricsSink for FacadeMetricsSink {
    fn increment(&self, counter: AccessDeniedCounter) {
        metrics::counter!(counter.facade_name(), LABEL_NAMESPACE => ACCESS_DENIED_NAMESPACE)
            .increment(1);
    }
}

//! Metric names and descriptions.
//!
//! Every counter the workspace emits is named here. Call sites use the
//! `metrics` facade directly:
//!
//! ```ignore
//! metrics::counter!(trailpost_core::metrics::RECORDS_PROCESSED_TOTAL).increment(1);
//! ```
//!
//! Naming: `trailpost_` prefix, `_total` suffix for counters.

// ============================================================================
// label keys
// ============================================================================

/// Notification channel label key (slack, sns)
pub const LABEL_CHANNEL: &str = "channel";

/// Outcome label key (matched, ignored, unmatched)
pub const LABEL_OUTCOME: &str = "outcome";

/// Metric namespace label key, used by the AccessDenied counter pair
pub const LABEL_NAMESPACE: &str = "namespace";

// ============================================================================
// classification
// ============================================================================

/// Records classified (counter, label: outcome)
pub const RECORDS_PROCESSED_TOTAL: &str = "trailpost_records_processed_total";

/// Records dropped because they are structurally unusable (counter)
pub const RECORDS_MALFORMED_TOTAL: &str = "trailpost_records_malformed_total";

/// Rule evaluation failures (counter)
pub const RULE_EVALUATION_ERRORS_TOTAL: &str = "trailpost_rule_evaluation_errors_total";

// ============================================================================
// dispatch
// ============================================================================

/// Notifications delivered (counter, label: channel)
pub const NOTIFICATIONS_SENT_TOTAL: &str = "trailpost_notifications_sent_total";

/// Failed deliveries (counter, label: channel)
pub const DELIVERY_FAILURES_TOTAL: &str = "trailpost_delivery_failures_total";

/// Notifications posted as a reply into an existing thread (counter)
pub const THREADED_REPLIES_TOTAL: &str = "trailpost_threaded_replies_total";

/// Thread store lookups or writes that failed (counter)
pub const DEDUP_STORE_ERRORS_TOTAL: &str = "trailpost_dedup_store_errors_total";

// ============================================================================
// AccessDenied pair
// ============================================================================

/// Namespace the AccessDenied pair is published under
pub const ACCESS_DENIED_NAMESPACE: &str = "CloudTrailToSlack/AccessDeniedEvents";

/// Upstream metric name for AccessDenied records seen
pub const ACCESS_DENIED_SEEN_METRIC: &str = "TotalAccessDeniedEvents";

/// Upstream metric name for AccessDenied records vetoed by an ignore rule
pub const ACCESS_DENIED_IGNORED_METRIC: &str = "TotalIgnoredAccessDeniedEvents";

/// AccessDenied records seen (counter, label: namespace)
pub const ACCESS_DENIED_SEEN_TOTAL: &str = "trailpost_access_denied_seen_total";

/// AccessDenied records ignored (counter, label: namespace)
pub const ACCESS_DENIED_IGNORED_TOTAL: &str = "trailpost_access_denied_ignored_total";

// ============================================================================
// object handling
// ============================================================================

/// Log objects fetched and decoded (counter)
pub const LOG_OBJECTS_PROCESSED_TOTAL: &str = "trailpost_log_objects_processed_total";

/// Log objects that could not be fetched or decoded (counter)
pub const LOG_OBJECTS_FAILED_TOTAL: &str = "trailpost_log_objects_failed_total";

/// Registers descriptions for every metric.
///
/// Safe to call without an installed recorder.
pub fn describe_all() {
    use metrics::describe_counter;

    describe_counter!(
        RECORDS_PROCESSED_TOTAL,
        "CloudTrail records classified, by outcome"
    );
    describe_counter!(
        RECORDS_MALFORMED_TOTAL,
        "CloudTrail records skipped because they lack required fields"
    );
    describe_counter!(
        RULE_EVALUATION_ERRORS_TOTAL,
        "Rules that failed to evaluate against a record"
    );

    describe_counter!(
        NOTIFICATIONS_SENT_TOTAL,
        "Notifications delivered, by channel"
    );
    describe_counter!(
        DELIVERY_FAILURES_TOTAL,
        "Notification deliveries that failed, by channel"
    );
    describe_counter!(
        THREADED_REPLIES_TOTAL,
        "Slack notifications posted into an existing thread"
    );
    describe_counter!(
        DEDUP_STORE_ERRORS_TOTAL,
        "Thread store lookups or writes that failed"
    );

    describe_counter!(ACCESS_DENIED_SEEN_TOTAL, "AccessDenied records seen");
    describe_counter!(
        ACCESS_DENIED_IGNORED_TOTAL,
        "AccessDenied records vetoed by an ignore rule"
    );

    describe_counter!(
        LOG_OBJECTS_PROCESSED_TOTAL,
        "CloudTrail log objects fetched and decoded"
    );
    describe_counter!(
        LOG_OBJECTS_FAILED_TOTAL,
        "CloudTrail log objects that could not be fetched or decoded"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRICS: &[&str] = &[
        RECORDS_PROCESSED_TOTAL,
        RECORDS_MALFORMED_TOTAL,
        RULE_EVALUATION_ERRORS_TOTAL,
        NOTIFICATIONS_SENT_TOTAL,
        DELIVERY_FAILURES_TOTAL,
        THREADED_REPLIES_TOTAL,
        DEDUP_STORE_ERRORS_TOTAL,
        ACCESS_DENIED_SEEN_TOTAL,
        ACCESS_DENIED_IGNORED_TOTAL,
        LOG_OBJECTS_PROCESSED_TOTAL,
        LOG_OBJECTS_FAILED_TOTAL,
    ];

    #[test]
    fn all_metrics_have_prefix_and_suffix() {
        for name in ALL_METRICS {
            assert!(name.starts_with("trailpost_"), "{name} lacks prefix");
            assert!(name.ends_with("_total"), "{name} is not a counter name");
        }
    }

    #[test]
    fn metric_names_are_unique() {
        let mut names = ALL_METRICS.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ALL_METRICS.len());
    }

    #[test]
    fn describe_all_does_not_panic() {
        describe_all();
    }

    #[test]
    fn label_keys_are_lowercase() {
        for label in [LABEL_CHANNEL, LABEL_OUTCOME, LABEL_NAMESPACE] {
            assert_eq!(label, label.to_lowercase());
        }
    }
}

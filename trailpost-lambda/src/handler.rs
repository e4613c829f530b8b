//! Per-invocation batch processing.
//!
//! One invocation handles one trigger payload: every object it names is
//! processed in order, and every record of a created object runs through
//! classification and dispatch. Failures below the invocation level are
//! logged, reported to Slack where useful, and tallied in the
//! [`InvocationSummary`]; only primary delivery failures fail the
//! invocation.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use trailpost_core::CloudTrailRecord;
use trailpost_core::error::TrailpostError;
use trailpost_core::metrics::{
    LOG_OBJECTS_FAILED_TOTAL, LOG_OBJECTS_PROCESSED_TOTAL, RECORDS_MALFORMED_TOTAL,
};
use trailpost_notifier::NotifierError;
use trailpost_notifier::dedup::{Clock, SystemClock, ThreadStore};
use trailpost_notifier::metrics_sink::{FacadeMetricsSink, MetricsSink};
use trailpost_notifier::router::{DispatchOutcome, Dispatcher, SlackDelivery};
use trailpost_notifier::slack::SlackTransport;
use trailpost_notifier::sns::TopicPublisher;
use trailpost_rule_engine::{Outcome, RuleSet};

use crate::envelope::{self, ObjectEvent, ObjectEventKind};
use crate::source::{self, ObjectSource};

/// What one invocation did.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationSummary {
    pub objects_processed: usize,
    pub objects_failed: usize,
    pub objects_removed: usize,
    pub digests_skipped: usize,
    pub records_total: usize,
    pub records_malformed: usize,
    pub matched: usize,
    pub ignored: usize,
    pub unmatched: usize,
    pub slack_posted: usize,
    pub slack_replied: usize,
    pub sns_published: usize,
    pub rule_errors: usize,
    /// Slack deliveries that failed; any of these fails the invocation.
    pub primary_failures: usize,
    pub secondary_failures: usize,
    pub store_errors: usize,
}

impl InvocationSummary {
    fn tally(&mut self, outcome: &DispatchOutcome) {
        match outcome.outcome {
            Outcome::Matched => self.matched += 1,
            Outcome::Ignored => self.ignored += 1,
            Outcome::Unmatched => self.unmatched += 1,
        }
        match outcome.slack {
            SlackDelivery::Posted => self.slack_posted += 1,
            SlackDelivery::Replied => self.slack_replied += 1,
            SlackDelivery::Failed => self.primary_failures += 1,
            SlackDelivery::Skipped => {}
        }
        if outcome.sns_published {
            self.sns_published += 1;
        }
        self.secondary_failures += outcome.secondary_errors.len();
        self.store_errors += outcome.store_errors.len();
    }
}

/// Processes trigger payloads with a fixed rule set and dispatcher.
pub struct Handler<O, S, P, T, C = SystemClock, M = FacadeMetricsSink> {
    source: O,
    rules: RuleSet,
    dispatcher: Dispatcher<S, P, T, C, M>,
}

impl<O, S, P, T, C, M> Handler<O, S, P, T, C, M>
where
    O: ObjectSource,
    S: SlackTransport,
    P: TopicPublisher,
    T: ThreadStore,
    C: Clock,
    M: MetricsSink,
{
    pub fn new(source: O, rules: RuleSet, dispatcher: Dispatcher<S, P, T, C, M>) -> Self {
        Self {
            source,
            rules,
            dispatcher,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher<S, P, T, C, M> {
        &self.dispatcher
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Handles one trigger payload.
    ///
    /// # Errors
    ///
    /// - [`TrailpostError::Source`] when the payload shape is not understood;
    ///   a failure notice is posted to the default destination first
    /// - [`TrailpostError::Delivery`] with the first primary delivery failure,
    ///   after every object has been processed
    pub async fn handle(&self, payload: &Value) -> Result<InvocationSummary, TrailpostError> {
        let events = match envelope::parse(payload) {
            Ok(events) => events,
            Err(e) => {
                metrics::counter!(LOG_OBJECTS_FAILED_TOTAL).increment(1);
                error!(error = %e, "unrecognised trigger payload");
                let reason = e.to_string();
                let notice = self.dispatcher.notify_failure(&reason, &[], "");
                if let Err(notify) = notice.await {
                    error!(error = %notify, "failed to report unrecognised payload");
                }
                return Err(e.into());
            }
        };
        info!(objects = events.len(), "processing trigger payload");

        let mut summary = InvocationSummary::default();
        let mut first_primary: Option<NotifierError> = None;
        for event in &events {
            if event.is_digest() {
                debug!(key = %event.key, "skipping digest object");
                summary.digests_skipped += 1;
                continue;
            }
            let result = match event.kind {
                ObjectEventKind::Removed => self.handle_removed(event, &mut summary).await,
                ObjectEventKind::Created => self.handle_created(event, &mut summary).await,
            };
            if let Err(e) = result {
                first_primary.get_or_insert(e);
            }
        }

        info!(
            objects_processed = summary.objects_processed,
            objects_failed = summary.objects_failed,
            records = summary.records_total,
            matched = summary.matched,
            primary_failures = summary.primary_failures,
            "invocation finished"
        );
        match first_primary {
            Some(e) => Err(e.into()),
            None => Ok(summary),
        }
    }

    async fn handle_removed(
        &self,
        event: &ObjectEvent,
        summary: &mut InvocationSummary,
    ) -> Result<(), NotifierError> {
        warn!(bucket = %event.bucket, key = %event.key, "log object removed");
        summary.objects_removed += 1;
        self.dispatcher
            .notify_object_removed(
                &event.bucket,
                &event.key,
                event.event_time.as_deref(),
                &event.account_id,
            )
            .await
            .inspect_err(|_| summary.primary_failures += 1)
    }

    async fn handle_created(
        &self,
        event: &ObjectEvent,
        summary: &mut InvocationSummary,
    ) -> Result<(), NotifierError> {
        let timeout = self.dispatcher.options().request_timeout;
        let raw_records =
            match source::load_records(&self.source, &event.bucket, &event.key, timeout).await {
                Ok(records) => records,
                Err(e) => {
                    metrics::counter!(LOG_OBJECTS_FAILED_TOTAL).increment(1);
                    error!(
                        bucket = %event.bucket,
                        key = %event.key,
                        error = %e,
                        "failed to load log object"
                    );
                    summary.objects_failed += 1;
                    let keys = [event.key.clone()];
                    return self
                        .dispatcher
                        .notify_failure(&e.to_string(), &keys, &event.account_id)
                        .await
                        .inspect_err(|_| summary.primary_failures += 1);
                }
            };

        metrics::counter!(LOG_OBJECTS_PROCESSED_TOTAL).increment(1);
        summary.objects_processed += 1;
        debug!(key = %event.key, records = raw_records.len(), "log object decoded");

        let mut first_primary = None;
        for raw in raw_records {
            summary.records_total += 1;
            let record = match CloudTrailRecord::from_value(raw) {
                Ok(record) => record,
                Err(e) => {
                    metrics::counter!(RECORDS_MALFORMED_TOTAL).increment(1);
                    error!(key = %event.key, error = %e, "skipping malformed record");
                    summary.records_malformed += 1;
                    continue;
                }
            };

            let classification = self.rules.classify(record.as_value());
            summary.rule_errors += classification.errors.len();
            let outcome = self
                .dispatcher
                .route(&record, &classification, &event.key)
                .await;
            summary.tally(&outcome);
            if let Some(e) = outcome.primary_error {
                first_primary.get_or_insert(e);
            }
        }

        match first_primary {
            Some(e) => Err(NotifierError::PrimaryDelivery(e)),
            None => Ok(()),
        }
    }
}

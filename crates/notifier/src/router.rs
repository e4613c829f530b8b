//! Record dispatch.
//!
//! [`Dispatcher::route`] takes a classified record to its destinations:
//!
//! 1. rule evaluation errors are posted as diagnostics when enabled
//! 2. the AccessDenied counter pair is updated when enabled
//! 3. unmatched and ignored records stop here
//! 4. Slack: the destination is resolved from the record's account id. In
//!    bot mode with a thread store, a live binding for the record's
//!    fingerprint turns the post into a threaded reply; otherwise a new
//!    message is posted and bound
//! 5. SNS, when configured, independently of the Slack result
//!
//! Slack is the primary channel: its failure is reported in the
//! [`DispatchOutcome`] for escalation. SNS and thread store failures are
//! logged and recorded but never stop the Slack post.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use trailpost_core::error::{DeliveryError, StoreError};
use trailpost_core::metrics::{
    DEDUP_STORE_ERRORS_TOTAL, DELIVERY_FAILURES_TOTAL, LABEL_CHANNEL, NOTIFICATIONS_SENT_TOTAL,
    THREADED_REPLIES_TOTAL,
};
use trailpost_core::{CloudTrailRecord, RouteTable, SlackTarget};
use trailpost_rule_engine::{ClassificationResult, Outcome, RuleEvaluationError};

use crate::dedup::{Clock, DedupStore, SystemClock, ThreadStore};
use crate::error::NotifierError;
use crate::fingerprint::fingerprint;
use crate::message::Notification;
use crate::metrics_sink::{AccessDeniedCounter, FacadeMetricsSink, MetricsSink};
use crate::slack::{self, SlackTransport};
use crate::sns::{self, TopicPublisher};

/// Feature switches and limits for a [`Dispatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Post a diagnostic for every rule that failed to evaluate.
    pub rule_errors_to_slack: bool,
    /// Drive the AccessDenied counter pair.
    pub access_denied_metrics: bool,
    /// Bound for every Slack and SNS call.
    pub request_timeout: Duration,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            rule_errors_to_slack: false,
            access_denied_metrics: false,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// How the Slack side of a record went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlackDelivery {
    /// The record was not matched.
    Skipped,
    /// Posted as a new message.
    Posted,
    /// Posted as a reply into an existing thread.
    Replied,
    Failed,
}

/// Everything [`Dispatcher::route`] did for one record.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub outcome: Outcome,
    pub slack: SlackDelivery,
    /// Thread the record was posted into or started.
    pub thread_ts: Option<String>,
    pub sns_published: bool,
    /// Rule error diagnostics successfully posted.
    pub diagnostics_sent: usize,
    /// Slack failure; escalated by the caller.
    pub primary_error: Option<DeliveryError>,
    /// Failures of SNS and of diagnostic posts.
    pub secondary_errors: Vec<DeliveryError>,
    pub store_errors: Vec<StoreError>,
}

impl DispatchOutcome {
    fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            slack: SlackDelivery::Skipped,
            thread_ts: None,
            sns_published: false,
            diagnostics_sent: 0,
            primary_error: None,
            secondary_errors: Vec::new(),
            store_errors: Vec::new(),
        }
    }

    pub fn is_primary_failure(&self) -> bool {
        self.primary_error.is_some()
    }

    /// Converts a primary delivery failure into an error.
    pub fn into_result(self) -> Result<Self, NotifierError> {
        match self.primary_error {
            Some(err) => Err(NotifierError::PrimaryDelivery(err)),
            None => Ok(self),
        }
    }
}

struct SnsRoute<P> {
    routes: RouteTable,
    publisher: P,
}

/// Routes classified records to Slack and SNS.
///
/// Route tables and options are fixed at construction; the thread store
/// is the only mutable state touched.
pub struct Dispatcher<S, P, T, C = SystemClock, M = FacadeMetricsSink> {
    target: SlackTarget,
    slack: S,
    sns: Option<SnsRoute<P>>,
    dedup: Option<DedupStore<T, C>>,
    metrics: M,
    options: DispatchOptions,
}

impl<S, P, T, C, M> Dispatcher<S, P, T, C, M>
where
    S: SlackTransport,
    P: TopicPublisher,
    T: ThreadStore,
    C: Clock,
    M: MetricsSink,
{
    pub fn new(target: SlackTarget, slack: S, metrics: M, options: DispatchOptions) -> Self {
        Self {
            target,
            slack,
            sns: None,
            dedup: None,
            metrics,
            options,
        }
    }

    /// Publishes matched records to SNS, routed through `routes`.
    pub fn with_sns(mut self, routes: RouteTable, publisher: P) -> Self {
        self.sns = Some(SnsRoute { routes, publisher });
        self
    }

    /// Enables threading. Only has an effect for the bot API target.
    pub fn with_dedup(mut self, dedup: DedupStore<T, C>) -> Self {
        if !self.target.supports_threads() {
            warn!("thread store configured but Slack target is a webhook; threading disabled");
        }
        self.dedup = Some(dedup);
        self
    }

    pub fn target(&self) -> &SlackTarget {
        &self.target
    }

    pub fn slack(&self) -> &S {
        &self.slack
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    pub fn metrics(&self) -> &M {
        &self.metrics
    }

    /// Dispatches one classified record read from `source_key`.
    ///
    /// Never fails; see [`DispatchOutcome`] for what went wrong.
    pub async fn route(
        &self,
        record: &CloudTrailRecord,
        classification: &ClassificationResult,
        source_key: &str,
    ) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::new(classification.outcome());
        let account_id = record.account_id();

        if self.options.rule_errors_to_slack {
            for rule_error in &classification.errors {
                match self.post_rule_error(rule_error, account_id, source_key).await {
                    Ok(()) => outcome.diagnostics_sent += 1,
                    Err(e) => outcome.secondary_errors.push(e),
                }
            }
        }

        if self.options.access_denied_metrics && record.is_access_denied() {
            self.metrics.increment(AccessDeniedCounter::Seen);
            if classification.is_ignored {
                self.metrics.increment(AccessDeniedCounter::Ignored);
            }
        }

        if !classification.should_process {
            debug!(
                event_name = record.event_name(),
                outcome = %outcome.outcome,
                "record not dispatched"
            );
            return outcome;
        }

        if record.is_access_denied() {
            info!(record = %record.as_value(), "access denied event matched");
        }

        let notification = Notification::for_record(record, source_key);
        self.deliver_slack(record, account_id, &notification, &mut outcome)
            .await;

        if let Some(sns_route) = &self.sns {
            let topic = sns_route.routes.resolve(account_id);
            let message = sns::render(record, source_key);
            let publish = sns_route.publisher.publish(topic, &message);
            match self.bounded(sns::CHANNEL, publish).await {
                Ok(()) => {
                    outcome.sns_published = true;
                    sent(sns::CHANNEL);
                    debug!(topic, "published to sns");
                }
                Err(e) => {
                    failed(sns::CHANNEL);
                    error!(topic, error = %e, "sns publish failed");
                    outcome.secondary_errors.push(e);
                }
            }
        }

        outcome
    }

    /// Posts a "failed to process" diagnostic for `object_keys`.
    ///
    /// # Errors
    ///
    /// [`NotifierError::PrimaryDelivery`] when Slack did not accept it.
    pub async fn notify_failure(
        &self,
        error: &str,
        object_keys: &[String],
        account_id: &str,
    ) -> Result<(), NotifierError> {
        let notification = Notification::failed_to_process(error, object_keys);
        self.post_new(account_id, &notification)
            .await
            .map(|_| ())
            .map_err(NotifierError::PrimaryDelivery)
    }

    /// Posts an "object removed" notice for a deleted log object.
    pub async fn notify_object_removed(
        &self,
        bucket: &str,
        key: &str,
        event_time: Option<&str>,
        account_id: &str,
    ) -> Result<(), NotifierError> {
        let notification = Notification::object_removed(bucket, key, event_time, account_id);
        self.post_new(account_id, &notification)
            .await
            .map(|_| ())
            .map_err(NotifierError::PrimaryDelivery)
    }

    async fn post_rule_error(
        &self,
        rule_error: &RuleEvaluationError,
        account_id: &str,
        source_key: &str,
    ) -> Result<(), DeliveryError> {
        let notification = Notification::failed_to_evaluate(
            &rule_error.rule,
            &rule_error.cause.to_string(),
            source_key,
        );
        self.post_new(account_id, &notification).await.map(|_| ())
    }

    async fn deliver_slack(
        &self,
        record: &CloudTrailRecord,
        account_id: &str,
        notification: &Notification,
        outcome: &mut DispatchOutcome,
    ) {
        let threading = match (&self.target, &self.dedup) {
            (SlackTarget::App { .. }, Some(dedup)) => {
                fingerprint(record).map(|fingerprint| (dedup, fingerprint))
            }
            _ => None,
        };

        let Some((dedup, fingerprint)) = threading else {
            match self.post_new(account_id, notification).await {
                Ok(ts) => {
                    outcome.slack = SlackDelivery::Posted;
                    outcome.thread_ts = ts;
                }
                Err(e) => {
                    outcome.slack = SlackDelivery::Failed;
                    outcome.primary_error = Some(e);
                }
            }
            return;
        };

        let existing = match dedup.lookup_thread(&fingerprint).await {
            Ok(found) => found,
            Err(e) => {
                store_failed(&e, "thread lookup failed; posting new message");
                outcome.store_errors.push(e);
                None
            }
        };

        let channel = self.target.routes().resolve(account_id);
        if let Some(thread_ts) = existing {
            let reply = self
                .slack
                .post_message(channel, notification, Some(&thread_ts));
            match self.bounded(slack::CHANNEL, reply).await {
                Ok(_) => {
                    sent(slack::CHANNEL);
                    metrics::counter!(THREADED_REPLIES_TOTAL).increment(1);
                    info!(channel, thread_ts = %thread_ts, "replied in existing thread");
                    outcome.slack = SlackDelivery::Replied;
                    outcome.thread_ts = Some(thread_ts);
                }
                Err(e) => {
                    failed(slack::CHANNEL);
                    error!(channel, error = %e, "slack reply failed");
                    outcome.slack = SlackDelivery::Failed;
                    outcome.primary_error = Some(e);
                }
            }
            return;
        }

        match self.post_new(account_id, notification).await {
            Ok(ts) => {
                outcome.slack = SlackDelivery::Posted;
                if let Some(ts) = ts.as_deref()
                    && let Err(e) = dedup.record_default(&fingerprint, ts).await
                {
                    store_failed(&e, "failed to store thread binding");
                    outcome.store_errors.push(e);
                }
                outcome.thread_ts = ts;
            }
            Err(e) => {
                outcome.slack = SlackDelivery::Failed;
                outcome.primary_error = Some(e);
            }
        }
    }

    /// New top-level Slack message to the destination for `account_id`.
    /// Returns the message handle in bot mode.
    async fn post_new(
        &self,
        account_id: &str,
        notification: &Notification,
    ) -> Result<Option<String>, DeliveryError> {
        let destination = self.target.routes().resolve(account_id);
        let result = match &self.target {
            SlackTarget::App { .. } => {
                let post = self.slack.post_message(destination, notification, None);
                self.bounded(slack::CHANNEL, post).await.map(Some)
            }
            SlackTarget::Webhook { .. } => {
                let post = self.slack.post_webhook(destination, notification);
                match self.bounded(slack::CHANNEL, post).await {
                    Ok(status) if (200..300).contains(&status) => Ok(None),
                    Ok(status) => Err(DeliveryError::Status {
                        channel: slack::CHANNEL.to_owned(),
                        status,
                    }),
                    Err(e) => Err(e),
                }
            }
        };
        match &result {
            Ok(_) => {
                sent(slack::CHANNEL);
                info!(
                    mode = self.target.kind(),
                    headline = %notification.headline.plain(),
                    "slack message posted"
                );
            }
            Err(e) => {
                failed(slack::CHANNEL);
                error!(mode = self.target.kind(), error = %e, "slack post failed");
            }
        }
        result
    }

    async fn bounded<R>(
        &self,
        channel: &str,
        call: impl Future<Output = Result<R, DeliveryError>>,
    ) -> Result<R, DeliveryError> {
        let limit = self.options.request_timeout;
        tokio::time::timeout(limit, call)
            .await
            .map_err(|_| DeliveryError::Timeout {
                channel: channel.to_owned(),
                secs: limit.as_secs(),
            })?
    }
}

fn sent(channel: &'static str) {
    metrics::counter!(NOTIFICATIONS_SENT_TOTAL, LABEL_CHANNEL => channel).increment(1);
}

fn failed(channel: &'static str) {
    metrics::counter!(DELIVERY_FAILURES_TOTAL, LABEL_CHANNEL => channel).increment(1);
}

fn store_failed(err: &StoreError, message: &str) {
    metrics::counter!(DEDUP_STORE_ERRORS_TOTAL).increment(1);
    warn!(error = %err, "{message}");
}

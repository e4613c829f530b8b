//! `trailpost check` command handler
//!
//! Decodes a local CloudTrail log file and classifies every record with the
//! configured rules. With `--dispatch-preview`, matched records also go
//! through a real [`Dispatcher`] wired to recording channels and an
//! in-memory thread store, so routing and threading can be inspected
//! without sending anything.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use trailpost_core::{CloudTrailRecord, TrailpostError};
use trailpost_core::config::TrailpostConfig;
use trailpost_core::logfile;
use trailpost_notifier::dedup::{DedupStore, MemoryThreadStore, SystemClock};
use trailpost_notifier::recording::{RecordingMetrics, RecordingPublisher, RecordingSlack};
use trailpost_notifier::fingerprint;
use trailpost_notifier::router::{DispatchOptions, Dispatcher, SlackDelivery};
use trailpost_rule_engine::{ClassificationResult, Outcome, RuleSet};

use crate::cli::CheckArgs;
use crate::commands::load_partial;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

type PreviewDispatcher = Dispatcher<
    RecordingSlack,
    RecordingPublisher,
    MemoryThreadStore,
    SystemClock,
    RecordingMetrics,
>;

/// Execute the `check` command.
pub async fn execute(
    args: CheckArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = load_partial(config_path).await?;
    let rules = RuleSet::from_config(&config.rules)?;
    let preview = if args.dispatch_preview {
        Some(Preview::new(&config)?)
    } else {
        None
    };

    info!(file = %args.file.display(), "reading log file");
    let body = tokio::fs::read(&args.file).await?;
    let raw_records = logfile::decode_records(&body).await.map_err(TrailpostError::from)?;

    let source_key = args.file.display().to_string();
    let report = check_records(
        &source_key,
        raw_records,
        &rules,
        preview.as_ref(),
        args.matched_only,
    )
    .await;
    writer.render(&report)
}

/// Classifies (and optionally previews) `raw_records` read from `source_key`.
pub async fn check_records(
    source_key: &str,
    raw_records: Vec<Value>,
    rules: &RuleSet,
    preview: Option<&Preview>,
    matched_only: bool,
) -> CheckReport {
    let mut report = CheckReport {
        file: source_key.to_owned(),
        ..CheckReport::default()
    };

    for (i, raw) in raw_records.into_iter().enumerate() {
        report.total += 1;
        let record = match CloudTrailRecord::from_value(raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(index = i, error = %e, "malformed record");
                report.malformed += 1;
                if !matched_only {
                    report.records.push(RecordReport::malformed(i, e.to_string()));
                }
                continue;
            }
        };

        let classification = rules.classify(record.as_value());
        report.rule_errors += classification.errors.len();
        match classification.outcome() {
            Outcome::Matched => report.matched += 1,
            Outcome::Ignored => report.ignored += 1,
            Outcome::Unmatched => report.unmatched += 1,
        }

        let delivery = match preview {
            Some(preview) => Some(preview.run(&record, &classification, source_key).await),
            None => None,
        };
        if matched_only && classification.outcome() != Outcome::Matched {
            continue;
        }
        report
            .records
            .push(RecordReport::classified(i, &record, &classification, delivery));
    }
    report
}

/// Dispatcher wired to recording collaborators.
pub struct Preview {
    dispatcher: PreviewDispatcher,
    slack: RecordingSlack,
    publisher: RecordingPublisher,
}

impl Preview {
    /// Builds the preview from the Slack, SNS and dedup settings of `config`.
    ///
    /// # Errors
    ///
    /// `CliError::Core` when the Slack or SNS settings are unusable.
    pub fn new(config: &TrailpostConfig) -> Result<Self, CliError> {
        let target = config.slack_target().map_err(TrailpostError::from)?;
        let slack = RecordingSlack::new();
        let publisher = RecordingPublisher::new();
        let options = DispatchOptions {
            rule_errors_to_slack: config.features.rule_evaluation_errors_to_slack,
            access_denied_metrics: config.features.push_access_denied_metrics,
            request_timeout: config.request_timeout(),
        };
        let mut dispatcher =
            Dispatcher::new(target, slack.clone(), RecordingMetrics::new(), options);
        if let Some(routes) = config.sns_routes().map_err(TrailpostError::from)? {
            dispatcher = dispatcher.with_sns(routes, publisher.clone());
        }
        if let Some(dedup) = config.dedup_settings() {
            dispatcher = dispatcher.with_dedup(DedupStore::new(
                MemoryThreadStore::new(),
                dedup.ttl,
                config.request_timeout(),
            ));
        }
        Ok(Self {
            dispatcher,
            slack,
            publisher,
        })
    }

    async fn run(
        &self,
        record: &CloudTrailRecord,
        classification: &ClassificationResult,
        source_key: &str,
    ) -> DeliveryPreview {
        let posts_before = self.slack.posts().await.len();
        let published_before = self.publisher.published().await.len();

        let outcome = self
            .dispatcher
            .route(record, classification, source_key)
            .await;

        let posts = self.slack.posts().await;
        let published = self.publisher.published().await;
        DeliveryPreview {
            slack: match outcome.slack {
                SlackDelivery::Skipped => "skipped",
                SlackDelivery::Posted => "posted",
                SlackDelivery::Replied => "replied",
                SlackDelivery::Failed => "failed",
            },
            slack_destinations: posts[posts_before..]
                .iter()
                .map(|post| post.destination.clone())
                .collect(),
            thread_ts: outcome.thread_ts,
            sns_topics: published[published_before..]
                .iter()
                .map(|(topic, _)| topic.clone())
                .collect(),
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct CheckReport {
    pub file: String,
    pub total: usize,
    pub matched: usize,
    pub ignored: usize,
    pub unmatched: usize,
    pub malformed: usize,
    pub rule_errors: usize,
    pub records: Vec<RecordReport>,
}

#[derive(Debug, Serialize)]
pub struct RecordReport {
    pub index: usize,
    /// `matched`, `ignored`, `unmatched` or `malformed`.
    pub outcome: String,
    pub event_name: Option<String>,
    pub event_id: Option<String>,
    pub actor: Option<String>,
    pub account_id: Option<String>,
    pub matched_rule: Option<String>,
    pub fingerprint: Option<String>,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliveryPreview>,
}

impl RecordReport {
    fn malformed(index: usize, error: String) -> Self {
        Self {
            index,
            outcome: "malformed".to_owned(),
            event_name: None,
            event_id: None,
            actor: None,
            account_id: None,
            matched_rule: None,
            fingerprint: None,
            errors: vec![error],
            delivery: None,
        }
    }

    fn classified(
        index: usize,
        record: &CloudTrailRecord,
        classification: &ClassificationResult,
        delivery: Option<DeliveryPreview>,
    ) -> Self {
        Self {
            index,
            outcome: classification.outcome().to_string(),
            event_name: Some(record.event_name().to_owned()),
            event_id: record.event_id().map(str::to_owned),
            actor: Some(record.actor().to_owned()),
            account_id: Some(record.account_id().to_owned()),
            matched_rule: classification.matched_rule.clone(),
            fingerprint: fingerprint(record).map(|f| f.to_string()),
            errors: classification
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.rule, e.cause))
                .collect(),
            delivery,
        }
    }
}

/// Where a record would have been delivered.
#[derive(Debug, Serialize)]
pub struct DeliveryPreview {
    pub slack: &'static str,
    pub slack_destinations: Vec<String>,
    pub thread_ts: Option<String>,
    pub sns_topics: Vec<String>,
}

impl Render for CheckReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Check: {}", self.file.bold())?;
        writeln!(
            w,
            "  Records: {} total, {} matched, {} ignored, {} unmatched, {} malformed",
            self.total,
            self.matched.to_string().green(),
            self.ignored.to_string().yellow(),
            self.unmatched,
            if self.malformed > 0 {
                self.malformed.to_string().red()
            } else {
                self.malformed.to_string().normal()
            }
        )?;
        if self.rule_errors > 0 {
            writeln!(w, "  Rule errors: {}", self.rule_errors.to_string().red())?;
        }
        if self.records.is_empty() {
            return Ok(());
        }

        writeln!(w)?;
        writeln!(
            w,
            "{:<6} {:<10} {:<32} {:<14} Actor",
            "#", "Outcome", "Event", "Account"
        )?;
        writeln!(w, "{}", "-".repeat(90))?;
        for r in &self.records {
            let outcome = match r.outcome.as_str() {
                "matched" => r.outcome.green(),
                "ignored" => r.outcome.yellow(),
                "malformed" => r.outcome.red(),
                _ => r.outcome.normal(),
            };
            writeln!(
                w,
                "{:<6} {:<10} {:<32} {:<14} {}",
                r.index,
                outcome,
                r.event_name.as_deref().unwrap_or("-"),
                r.account_id.as_deref().unwrap_or("-"),
                r.actor.as_deref().unwrap_or("-"),
            )?;
            if let Some(rule) = &r.matched_rule {
                writeln!(w, "       rule: {rule}")?;
            }
            if let Some(delivery) = &r.delivery {
                writeln!(
                    w,
                    "       slack: {} {}",
                    delivery.slack,
                    delivery.slack_destinations.join(", ")
                )?;
                if let Some(ts) = &delivery.thread_ts {
                    writeln!(w, "       thread: {ts}")?;
                }
                if !delivery.sns_topics.is_empty() {
                    writeln!(w, "       sns: {}", delivery.sns_topics.join(", "))?;
                }
            }
            for err in &r.errors {
                writeln!(w, "       {} {err}", "error:".red())?;
            }
        }
        Ok(())
    }
}

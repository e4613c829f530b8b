//! Lambda bootstrap.
//!
//! Configuration, rules and clients are built once per cold start and
//! shared by every invocation of the warm container.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use aws_config::BehaviorVersion;
use aws_config::timeout::TimeoutConfig;
use lambda_runtime::{LambdaEvent, service_fn};
use serde_json::Value;

use trailpost_core::SlackTarget;
use trailpost_core::config::{GeneralConfig, TrailpostConfig};
use trailpost_core::error::DeliveryError;
use trailpost_notifier::dedup::{DedupStore, SystemClock};
use trailpost_notifier::router::{DispatchOptions, Dispatcher};
use trailpost_notifier::slack::SlackHttpClient;
use trailpost_rule_engine::RuleSet;

use trailpost_lambda::aws::{
    CloudWatchMetricsSink, DynamoDbThreadStore, S3ObjectSource, SnsTopicPublisher,
};
use trailpost_lambda::handler::{Handler, InvocationSummary};
use trailpost_lambda::{logging, startup};

const STARTUP_REPORT_TIMEOUT: Duration = Duration::from_secs(10);

type LambdaHandler = Handler<
    S3ObjectSource,
    SlackHttpClient,
    SnsTopicPublisher,
    DynamoDbThreadStore,
    SystemClock,
    CloudWatchMetricsSink,
>;

#[tokio::main]
async fn main() -> Result<()> {
    let config = match TrailpostConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            logging::init_tracing(&GeneralConfig::default())?;
            tracing::error!(error = %e, "failed to load configuration");
            let fallback = startup::fallback_slack_target(|key| std::env::var(key).ok());
            abort_with_report(fallback, &e.to_string()).await;
            return Err(e.into());
        }
    };

    logging::init_tracing(&config.general)?;
    trailpost_core::metrics::describe_all();

    let rules = match RuleSet::from_config(&config.rules) {
        Ok(rules) => rules,
        Err(e) => {
            tracing::error!(error = %e, "failed to build rule set");
            abort_with_report(config.slack_target().ok(), &e.to_string()).await;
            return Err(e.into());
        }
    };
    let handler = Arc::new(build_handler(&config, rules).await?);
    tracing::info!(slack_mode = handler.dispatcher().target().kind(), "trailpost ready");

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let handler = Arc::clone(&handler);
        async move { invoke(&handler, event).await }
    }))
    .await
    .map_err(|e| anyhow::anyhow!("lambda runtime failed: {e}"))
}

async fn build_handler(config: &TrailpostConfig, rules: RuleSet) -> Result<LambdaHandler> {
    let target = config.slack_target()?;
    let timeout = config.request_timeout();
    let slack = slack_client(&target, timeout)?;

    let aws = aws_config::defaults(BehaviorVersion::latest())
        .timeout_config(TimeoutConfig::builder().operation_timeout(timeout).build())
        .load()
        .await;
    let options = DispatchOptions {
        rule_errors_to_slack: config.features.rule_evaluation_errors_to_slack,
        access_denied_metrics: config.features.push_access_denied_metrics,
        request_timeout: timeout,
    };
    let metrics = CloudWatchMetricsSink::new(aws_sdk_cloudwatch::Client::new(&aws), timeout);
    let mut dispatcher = Dispatcher::new(target, slack, metrics, options);

    if let Some(routes) = config.sns_routes()? {
        tracing::info!(default_topic = routes.default_destination(), "sns publishing enabled");
        let publisher = SnsTopicPublisher::new(aws_sdk_sns::Client::new(&aws));
        dispatcher = dispatcher.with_sns(routes, publisher);
    }
    if let Some(dedup) = config.dedup_settings() {
        tracing::info!(
            table = %dedup.table_name,
            ttl_secs = dedup.ttl.as_secs(),
            "slack threading enabled"
        );
        let store =
            DynamoDbThreadStore::new(aws_sdk_dynamodb::Client::new(&aws), dedup.table_name);
        dispatcher = dispatcher.with_dedup(DedupStore::new(store, dedup.ttl, timeout));
    }

    let source = S3ObjectSource::new(aws_sdk_s3::Client::new(&aws));
    Ok(Handler::new(source, rules, dispatcher))
}

fn slack_client(target: &SlackTarget, timeout: Duration) -> Result<SlackHttpClient, DeliveryError> {
    let bot_token = match target {
        SlackTarget::App { bot_token, .. } => Some(bot_token.clone()),
        SlackTarget::Webhook { .. } => None,
    };
    SlackHttpClient::new(bot_token, timeout)
}

async fn invoke(
    handler: &LambdaHandler,
    event: LambdaEvent<Value>,
) -> Result<InvocationSummary, lambda_runtime::Error> {
    let (payload, context) = event.into_parts();
    tracing::debug!(request_id = %context.request_id, "invocation started");
    let result = handler.handle(&payload).await;
    handler.dispatcher().metrics().flush().await;
    match result {
        Ok(summary) => Ok(summary),
        Err(e) => {
            tracing::error!(request_id = %context.request_id, error = %e, "invocation failed");
            Err(e.into())
        }
    }
}

/// Best-effort report of a fatal cold-start error to the default Slack
/// destination.
async fn abort_with_report(target: Option<SlackTarget>, error: &str) {
    let Some(target) = target else {
        tracing::warn!("no slack destination available for the startup failure report");
        return;
    };
    let slack = match slack_client(&target, STARTUP_REPORT_TIMEOUT) {
        Ok(slack) => slack,
        Err(e) => {
            tracing::error!(error = %e, "failed to build slack client for startup report");
            return;
        }
    };
    if let Err(e) = startup::report_startup_failure(&slack, &target, error).await {
        tracing::error!(error = %e, "failed to report startup failure to slack");
    }
}

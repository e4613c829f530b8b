//! AWS-backed collaborators.
//!
//! | Seam | Service |
//! |------|---------|
//! | [`ObjectSource`] | S3 `GetObject` |
//! | [`ThreadStore`] | DynamoDB `GetItem` / `PutItem` |
//! | [`TopicPublisher`] | SNS `Publish` |
//! | [`MetricsSink`] | CloudWatch `PutMetricData`, batched per invocation |

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use aws_sdk_cloudwatch::types::{MetricDatum, StandardUnit};
use aws_sdk_dynamodb::types::AttributeValue;
use bytes::Bytes;
use chrono::DateTime;
use tracing::{debug, warn};

use trailpost_core::error::{DeliveryError, SourceError, StoreError};
use trailpost_core::metrics::ACCESS_DENIED_NAMESPACE;
use trailpost_notifier::dedup::{StoredBinding, ThreadStore};
use trailpost_notifier::metrics_sink::{AccessDeniedCounter, FacadeMetricsSink, MetricsSink};
use trailpost_notifier::sns::{self, TopicPublisher};

use crate::source::ObjectSource;

/// Partition key of the thread table.
pub const KEY_ATTRIBUTE: &str = "principal_structure_and_action_hash";
/// Slack message handle attribute.
pub const THREAD_ATTRIBUTE: &str = "thread_ts";
/// Expiry attribute, epoch seconds; the table's TTL attribute.
pub const TTL_ATTRIBUTE: &str = "ttl";

// ============================================================================
// S3
// ============================================================================

#[derive(Debug, Clone)]
pub struct S3ObjectSource {
    client: aws_sdk_s3::Client,
}

impl S3ObjectSource {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

impl ObjectSource for S3ObjectSource {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Bytes, SourceError> {
        let fetch_error = |reason: String| SourceError::Fetch {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            reason,
        };
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| fetch_error(aws_sdk_s3::error::DisplayErrorContext(&e).to_string()))?;
        let body = output
            .body
            .collect()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        let bytes = body.into_bytes();
        debug!(bucket, key, size = bytes.len(), "log object fetched");
        Ok(bytes)
    }
}

// ============================================================================
// DynamoDB
// ============================================================================

/// Thread bindings in a DynamoDB table keyed by fingerprint.
///
/// Items carry a numeric `ttl` attribute so the table's TTL feature can
/// garbage-collect them; expiry itself is decided by the dedup layer.
#[derive(Debug, Clone)]
pub struct DynamoDbThreadStore {
    client: aws_sdk_dynamodb::Client,
    table: String,
}

impl DynamoDbThreadStore {
    pub fn new(client: aws_sdk_dynamodb::Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

impl ThreadStore for DynamoDbThreadStore {
    async fn get(&self, key: &str) -> Result<Option<StoredBinding>, StoreError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table)
            .key(KEY_ATTRIBUTE, AttributeValue::S(key.to_owned()))
            .send()
            .await
            .map_err(|e| {
                StoreError::Unavailable(aws_sdk_dynamodb::error::DisplayErrorContext(&e).to_string())
            })?;
        output.item().map(|item| binding_from_item(key, item)).transpose()
    }

    async fn put(&self, key: &str, binding: StoredBinding) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(&self.table)
            .item(KEY_ATTRIBUTE, AttributeValue::S(key.to_owned()))
            .item(THREAD_ATTRIBUTE, AttributeValue::S(binding.value))
            .item(
                TTL_ATTRIBUTE,
                AttributeValue::N(binding.expires_at.timestamp().to_string()),
            )
            .send()
            .await
            .map_err(|e| {
                StoreError::Unavailable(aws_sdk_dynamodb::error::DisplayErrorContext(&e).to_string())
            })?;
        Ok(())
    }
}

fn binding_from_item(
    key: &str,
    item: &HashMap<String, AttributeValue>,
) -> Result<StoredBinding, StoreError> {
    let corrupt = |reason: &str| StoreError::Corrupt {
        key: key.to_owned(),
        reason: reason.to_owned(),
    };
    let value = item
        .get(THREAD_ATTRIBUTE)
        .and_then(|v| v.as_s().ok())
        .ok_or_else(|| corrupt("missing string attribute 'thread_ts'"))?;
    let expires_at = item
        .get(TTL_ATTRIBUTE)
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| corrupt("missing or invalid numeric attribute 'ttl'"))?;
    Ok(StoredBinding {
        value: value.clone(),
        expires_at,
    })
}

// ============================================================================
// SNS
// ============================================================================

#[derive(Debug, Clone)]
pub struct SnsTopicPublisher {
    client: aws_sdk_sns::Client,
}

impl SnsTopicPublisher {
    pub fn new(client: aws_sdk_sns::Client) -> Self {
        Self { client }
    }
}

impl TopicPublisher for SnsTopicPublisher {
    async fn publish(&self, topic_arn: &str, message: &str) -> Result<(), DeliveryError> {
        let result = self
            .client
            .publish()
            .topic_arn(topic_arn)
            .message(message)
            .send()
            .await;
        match result {
            Ok(output) => {
                debug!(topic_arn, message_id = ?output.message_id(), "sns message published");
                Ok(())
            }
            Err(e) if e.as_service_error().is_some() => Err(DeliveryError::Rejected {
                channel: sns::CHANNEL.to_owned(),
                reason: aws_sdk_sns::error::DisplayErrorContext(&e).to_string(),
            }),
            Err(e) => Err(DeliveryError::Transport {
                channel: sns::CHANNEL.to_owned(),
                reason: aws_sdk_sns::error::DisplayErrorContext(&e).to_string(),
            }),
        }
    }
}

// ============================================================================
// CloudWatch
// ============================================================================

/// AccessDenied counters pushed to CloudWatch.
///
/// Increments accumulate in memory and also reach the `metrics` facade;
/// [`flush`](Self::flush) sends the accumulated values as one
/// `PutMetricData` call and resets them.
#[derive(Debug)]
pub struct CloudWatchMetricsSink {
    client: aws_sdk_cloudwatch::Client,
    facade: FacadeMetricsSink,
    seen: AtomicU64,
    ignored: AtomicU64,
    timeout: Duration,
}

impl CloudWatchMetricsSink {
    /// `timeout` bounds each [`flush`](Self::flush).
    pub fn new(client: aws_sdk_cloudwatch::Client, timeout: Duration) -> Self {
        Self {
            client,
            facade: FacadeMetricsSink,
            timeout,
            seen: AtomicU64::new(0),
            ignored: AtomicU64::new(0),
        }
    }

    /// Values accumulated since the last flush, in `(seen, ignored)` order.
    pub fn pending(&self) -> (u64, u64) {
        (
            self.seen.load(Ordering::Relaxed),
            self.ignored.load(Ordering::Relaxed),
        )
    }

    /// Pushes and resets the accumulated counters. Nothing is sent when
    /// both are zero. A failed push is logged and the values are dropped.
    pub async fn flush(&self) {
        let seen = self.seen.swap(0, Ordering::Relaxed);
        let ignored = self.ignored.swap(0, Ordering::Relaxed);
        if seen == 0 && ignored == 0 {
            return;
        }

        let data: Vec<MetricDatum> = [
            (AccessDeniedCounter::Seen, seen),
            (AccessDeniedCounter::Ignored, ignored),
        ]
        .into_iter()
        .filter(|(_, value)| *value > 0)
        .map(|(counter, value)| {
            MetricDatum::builder()
                .metric_name(counter.metric_name())
                .value(value as f64)
                .unit(StandardUnit::Count)
                .build()
        })
        .collect();

        let put = self
            .client
            .put_metric_data()
            .namespace(ACCESS_DENIED_NAMESPACE)
            .set_metric_data(Some(data))
            .send();
        match tokio::time::timeout(self.timeout, put).await {
            Ok(Ok(_)) => debug!(seen, ignored, "access denied metrics pushed"),
            Err(_) => warn!(
                timeout_secs = self.timeout.as_secs(),
                seen,
                ignored,
                "access denied metrics push timed out"
            ),
            Ok(Err(e)) => warn!(
                error = %aws_sdk_cloudwatch::error::DisplayErrorContext(&e),
                seen,
                ignored,
                "failed to push access denied metrics"
            ),
        }
    }
}

impl MetricsSink for CloudWatchMetricsSink {
    fn increment(&self, counter: AccessDeniedCounter) {
        match counter {
            AccessDeniedCounter::Seen => self.seen.fetch_add(1, Ordering::Relaxed),
            AccessDeniedCounter::Ignored => self.ignored.fetch_add(1, Ordering::Relaxed),
        };
        self.facade.increment(counter);
    }
}

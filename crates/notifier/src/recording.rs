//! In-process collaborators that record deliveries instead of sending them.
//!
//! Used by the CLI dispatch preview and by tests. Clones share state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

use trailpost_core::error::DeliveryError;

use crate::message::Notification;
use crate::metrics_sink::{AccessDeniedCounter, MetricsSink};
use crate::slack::{self, SlackTransport};
use crate::sns::{self, TopicPublisher};

/// One recorded Slack call.
#[derive(Debug, Clone, PartialEq)]
pub struct SlackPost {
    /// Channel id or webhook URL.
    pub destination: String,
    /// Thread the post replied into.
    pub thread_ts: Option<String>,
    /// `ts` handed back for bot posts; `None` for webhooks.
    pub ts: Option<String>,
    pub notification: Notification,
}

/// Recording [`SlackTransport`].
///
/// Bot posts get sequential handles `1.000001`, `1.000002`, ...
#[derive(Debug, Clone, Default)]
pub struct RecordingSlack {
    posts: Arc<Mutex<Vec<SlackPost>>>,
    next_ts: Arc<AtomicU64>,
    fail_status: Option<u16>,
}

impl RecordingSlack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call answers with `status` and records nothing.
    pub fn failing(status: u16) -> Self {
        Self {
            fail_status: Some(status),
            ..Self::default()
        }
    }

    pub async fn posts(&self) -> Vec<SlackPost> {
        self.posts.lock().await.clone()
    }

    fn next_handle(&self) -> String {
        let n = self.next_ts.fetch_add(1, Ordering::SeqCst) + 1;
        format!("1.{n:06}")
    }
}

impl SlackTransport for RecordingSlack {
    async fn post_message(
        &self,
        channel: &str,
        notification: &Notification,
        thread_ts: Option<&str>,
    ) -> Result<String, DeliveryError> {
        if self.fail_status.is_some() {
            return Err(DeliveryError::Rejected {
                channel: slack::CHANNEL.to_owned(),
                reason: "channel_not_found".to_owned(),
            });
        }
        let ts = self.next_handle();
        self.posts.lock().await.push(SlackPost {
            destination: channel.to_owned(),
            thread_ts: thread_ts.map(str::to_owned),
            ts: Some(ts.clone()),
            notification: notification.clone(),
        });
        Ok(ts)
    }

    async fn post_webhook(
        &self,
        url: &str,
        notification: &Notification,
    ) -> Result<u16, DeliveryError> {
        if let Some(status) = self.fail_status {
            return Ok(status);
        }
        self.posts.lock().await.push(SlackPost {
            destination: url.to_owned(),
            thread_ts: None,
            ts: None,
            notification: notification.clone(),
        });
        Ok(200)
    }
}

/// Recording [`TopicPublisher`]. Stores `(topic_arn, message)` pairs.
#[derive(Debug, Clone, Default)]
pub struct RecordingPublisher {
    published: Arc<Mutex<Vec<(String, String)>>>,
    fail: bool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub async fn published(&self) -> Vec<(String, String)> {
        self.published.lock().await.clone()
    }
}

impl TopicPublisher for RecordingPublisher {
    async fn publish(&self, topic_arn: &str, message: &str) -> Result<(), DeliveryError> {
        if self.fail {
            return Err(DeliveryError::Transport {
                channel: sns::CHANNEL.to_owned(),
                reason: "topic unreachable".to_owned(),
            });
        }
        self.published
            .lock()
            .await
            .push((topic_arn.to_owned(), message.to_owned()));
        Ok(())
    }
}

/// Recording [`MetricsSink`].
#[derive(Debug, Clone, Default)]
pub struct RecordingMetrics {
    increments: Arc<std::sync::Mutex<Vec<AccessDeniedCounter>>>,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increments(&self) -> Vec<AccessDeniedCounter> {
        self.increments
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl MetricsSink for RecordingMetrics {
    fn increment(&self, counter: AccessDeniedCounter) {
        if let Ok(mut guard) = self.increments.lock() {
            guard.push(counter);
        }
    }
}

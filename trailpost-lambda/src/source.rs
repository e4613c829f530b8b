//! Log object retrieval.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::Mutex;

use trailpost_core::error::SourceError;
use trailpost_core::logfile;

/// Fetches raw log object bodies.
pub trait ObjectSource: Send + Sync + 'static {
    /// Reads the whole object at `bucket`/`key`.
    ///
    /// # Errors
    ///
    /// [`SourceError::Fetch`] when the object cannot be read.
    fn fetch(&self, bucket: &str, key: &str)
    -> impl Future<Output = Result<Bytes, SourceError>> + Send;
}

/// Fetches and decodes one log object into its raw records.
///
/// The fetch is bounded by `timeout`; expiry is a [`SourceError::Fetch`].
pub async fn load_records<O: ObjectSource>(
    source: &O,
    bucket: &str,
    key: &str,
    timeout: Duration,
) -> Result<Vec<Value>, SourceError> {
    let body = tokio::time::timeout(timeout, source.fetch(bucket, key))
        .await
        .map_err(|_| SourceError::Fetch {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            reason: format!("timed out after {}s", timeout.as_secs()),
        })??;
    logfile::decode_records(&body).await
}

/// In-process [`ObjectSource`] for tests and local replays.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectSource {
    objects: Arc<Mutex<HashMap<(String, String), Bytes>>>,
}

impl MemoryObjectSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, bucket: &str, key: &str, body: impl Into<Bytes>) {
        self.objects
            .lock()
            .await
            .insert((bucket.to_owned(), key.to_owned()), body.into());
    }
}

impl ObjectSource for MemoryObjectSource {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Bytes, SourceError> {
        self.objects
            .lock()
            .await
            .get(&(bucket.to_owned(), key.to_owned()))
            .cloned()
            .ok_or_else(|| SourceError::Fetch {
                bucket: bucket.to_owned(),
                key: key.to_owned(),
                reason: "NoSuchKey".to_owned(),
            })
    }
}

//! Thread bindings with TTL expiry.
//!
//! A binding maps a [`Fingerprint`] to the handle of a previously posted
//! message. [`DedupStore`] owns the expiry rule: a binding is live while
//! `now <= expires_at` and treated as absent afterwards, whether or not the
//! backing store has garbage-collected it yet. Writes are unconditional
//! upserts (last write wins).

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use trailpost_core::error::StoreError;

use crate::fingerprint::Fingerprint;

/// A stored binding as the backing store returns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBinding {
    /// Message handle (Slack `ts`).
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

/// Key-value persistence for thread bindings.
///
/// Implementations only store and return items; they do not interpret
/// `expires_at`.
pub trait ThreadStore: Send + Sync + 'static {
    /// Reads the binding stored under `key`.
    ///
    /// # Errors
    ///
    /// [`StoreError`] when the store is unreachable or the item is corrupt.
    fn get(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<StoredBinding>, StoreError>> + Send;

    /// Upserts the binding under `key`.
    fn put(
        &self,
        key: &str,
        binding: StoredBinding,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Source of the current time.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start.timestamp_millis())),
        }
    }

    pub fn advance(&self, by: Duration) {
        let by = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.millis.fetch_add(by, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

/// In-process [`ThreadStore`], for tests and local runs.
///
/// Like a real table with TTL garbage collection disabled, it keeps expired
/// items until they are overwritten.
#[derive(Debug, Clone, Default)]
pub struct MemoryThreadStore {
    items: Arc<Mutex<HashMap<String, StoredBinding>>>,
}

impl MemoryThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of physically stored items, expired ones included.
    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}

impl ThreadStore for MemoryThreadStore {
    async fn get(&self, key: &str) -> Result<Option<StoredBinding>, StoreError> {
        Ok(self.items.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, binding: StoredBinding) -> Result<(), StoreError> {
        self.items.lock().await.insert(key.to_owned(), binding);
        Ok(())
    }
}

/// Fingerprint-to-thread lookups over a [`ThreadStore`].
///
/// Every store call is bounded by the configured timeout.
#[derive(Debug, Clone)]
pub struct DedupStore<S, C = SystemClock> {
    store: S,
    clock: C,
    ttl: Duration,
    timeout: Duration,
}

impl<S: ThreadStore> DedupStore<S> {
    pub fn new(store: S, ttl: Duration, timeout: Duration) -> Self {
        Self::with_clock(store, SystemClock, ttl, timeout)
    }
}

impl<S: ThreadStore, C: Clock> DedupStore<S, C> {
    pub fn with_clock(store: S, clock: C, ttl: Duration, timeout: Duration) -> Self {
        Self {
            store,
            clock,
            ttl,
            timeout,
        }
    }

    /// TTL applied by [`record_default`](Self::record_default).
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the live thread handle for `fingerprint`, if any.
    ///
    /// # Errors
    ///
    /// [`StoreError`] from the backing store, or [`StoreError::Timeout`].
    pub async fn lookup_thread(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<String>, StoreError> {
        let stored = self.bounded(self.store.get(fingerprint.as_str())).await?;
        let Some(binding) = stored else {
            debug!(fingerprint = %fingerprint, "no thread binding");
            return Ok(None);
        };
        if self.clock.now() > binding.expires_at {
            info!(fingerprint = %fingerprint, "thread binding expired");
            return Ok(None);
        }
        debug!(fingerprint = %fingerprint, thread = %binding.value, "thread binding found");
        Ok(Some(binding.value))
    }

    /// Binds `fingerprint` to `handle` until `now + ttl`.
    pub async fn record_thread(
        &self,
        fingerprint: &Fingerprint,
        handle: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let binding = StoredBinding {
            value: handle.to_owned(),
            expires_at,
        };
        self.bounded(self.store.put(fingerprint.as_str(), binding))
            .await?;
        debug!(
            fingerprint = %fingerprint,
            thread = %handle,
            %expires_at,
            "thread binding stored"
        );
        Ok(())
    }

    /// [`record_thread`](Self::record_thread) with the configured TTL.
    pub async fn record_default(
        &self,
        fingerprint: &Fingerprint,
        handle: &str,
    ) -> Result<(), StoreError> {
        self.record_thread(fingerprint, handle, self.ttl).await
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| StoreError::Timeout {
                secs: self.timeout.as_secs(),
            })?
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use trailpost_core::CloudTrailRecord;

    use super::*;
    use crate::fingerprint::fingerprint;

    const TTL: Duration = Duration::from_secs(900);
    const TIMEOUT: Duration = Duration::from_secs(5);

    fn fp(event_name: &str) -> Fingerprint {
        let record = CloudTrailRecord::from_value(json!({
            "eventName": event_name,
            "userIdentity": {"type": "IAMUser", "accountId": "111111111111"}
        }))
        .unwrap();
        fingerprint(&record).unwrap()
    }

    fn start() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn dedup(clock: &ManualClock) -> DedupStore<MemoryThreadStore, ManualClock> {
        DedupStore::with_clock(MemoryThreadStore::new(), clock.clone(), TTL, TIMEOUT)
    }

    #[tokio::test]
    async fn binding_is_readable_right_after_write() {
        let clock = ManualClock::new(start());
        let store = dedup(&clock);
        let key = fp("CreateUser");
        store.record_thread(&key, "1700000000.000100", TTL).await.unwrap();
        assert_eq!(
            store.lookup_thread(&key).await.unwrap().as_deref(),
            Some("1700000000.000100")
        );
    }

    #[tokio::test]
    async fn binding_expires_after_ttl_but_stays_stored() {
        let clock = ManualClock::new(start());
        let store = dedup(&clock);
        let key = fp("CreateUser");
        store.record_thread(&key, "ts-1", TTL).await.unwrap();

        clock.advance(TTL + Duration::from_secs(1));
        assert_eq!(store.lookup_thread(&key).await.unwrap(), None);
        assert_eq!(store.store().len().await, 1);
    }

    #[tokio::test]
    async fn binding_is_live_at_exact_expiry() {
        let clock = ManualClock::new(start());
        let store = dedup(&clock);
        let key = fp("CreateUser");
        store.record_default(&key, "ts-1").await.unwrap();

        clock.advance(TTL);
        assert!(store.lookup_thread(&key).await.unwrap().is_some());
        clock.advance(Duration::from_millis(1));
        assert!(store.lookup_thread(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn last_write_wins() {
        let clock = ManualClock::new(start());
        let store = dedup(&clock);
        let key = fp("CreateUser");
        store.record_default(&key, "ts-1").await.unwrap();
        store.record_default(&key, "ts-2").await.unwrap();
        assert_eq!(store.lookup_thread(&key).await.unwrap().as_deref(), Some("ts-2"));
    }

    #[tokio::test]
    async fn unknown_fingerprint_is_absent() {
        let clock = ManualClock::new(start());
        assert_eq!(dedup(&clock).lookup_thread(&fp("X")).await.unwrap(), None);
    }

    struct SlowStore;

    impl ThreadStore for SlowStore {
        async fn get(&self, _key: &str) -> Result<Option<StoredBinding>, StoreError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(None)
        }

        async fn put(&self, _key: &str, _binding: StoredBinding) -> Result<(), StoreError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_times_out() {
        let store = DedupStore::new(SlowStore, TTL, TIMEOUT);
        let err = store.lookup_thread(&fp("X")).await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout { secs: 5 }));
        let err = store.record_default(&fp("X"), "ts").await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout { .. }));
    }
}

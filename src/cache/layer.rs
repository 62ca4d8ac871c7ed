//! Fallback layer that orchestrates memoization, write-through persistence and offline fallback.

use std::future::Future;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};

use super::key::CacheKey;
use super::memo::MemoCache;
use super::result::CacheResult;
use crate::error::{FallbackError, FetchError, StorageError};
use crate::fetch::Payload;
use crate::store::{DurableRecord, RecordKey, RecordStore};

/// Default maximum age of a stored record that may stand in for the remote.
pub const DEFAULT_FRESHNESS_HOURS: i64 = 24;

/// Sits between the consumer and the fetcher.
///
/// Every remote success is written to the store before it is returned, so
/// anything a caller has seen is already available for later fallback.
pub struct FallbackLayer<S: RecordStore> {
  store: Arc<S>,
  memo: Arc<MemoCache<Payload>>,
  /// How old a stored record may be and still be served
  freshness: Duration,
}

impl<S: RecordStore> FallbackLayer<S> {
  pub fn new(store: S, memo: MemoCache<Payload>) -> Self {
    Self {
      store: Arc::new(store),
      memo: Arc::new(memo),
      freshness: Duration::hours(DEFAULT_FRESHNESS_HOURS),
    }
  }

  pub fn with_freshness(mut self, freshness: Duration) -> Self {
    self.freshness = freshness;
    self
  }

  #[cfg(test)]
  pub fn store(&self) -> &S {
    &self.store
  }

  /// Remote-first strategy, for time-sensitive data.
  ///
  /// 1. Fetch through the memo cache, persisting fresh remote data
  /// 2. On any fetch failure, serve the newest stored record within the freshness window
  /// 3. Nothing fresh enough stored: `NoFreshData`
  pub async fn remote_first<F, Fut>(
    &self,
    cache_key: &CacheKey,
    record_key: &RecordKey,
    fetcher: F,
  ) -> Result<CacheResult<Payload>, FallbackError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Payload, FetchError>>,
  {
    match self.fetch_through(cache_key, record_key, fetcher).await {
      Ok(payload) => Ok(CacheResult::from_remote(payload)),
      Err(e) => {
        warn!(key = %record_key, error = %e, "Remote fetch failed, checking local storage");
        match self.lookup(record_key) {
          Some(record) => {
            info!(
              key = %record.key,
              record_id = record.id,
              captured_at = %record.captured_at,
              "Serving stored data while remote is unavailable"
            );
            Ok(CacheResult::offline(record.payload, record.captured_at))
          }
          None => Err(FallbackError::NoFreshData {
            description: record_key.to_string(),
          }),
        }
      }
    }
  }

  /// Store-first strategy, for data that rarely changes.
  ///
  /// A fresh stored record is served without touching the remote. Otherwise
  /// the remote is fetched (and persisted); if that fails there is nothing to serve.
  pub async fn store_first<F, Fut>(
    &self,
    cache_key: &CacheKey,
    record_key: &RecordKey,
    fetcher: F,
  ) -> Result<CacheResult<Payload>, FallbackError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Payload, FetchError>>,
  {
    if let Some(record) = self.lookup(record_key) {
      return Ok(CacheResult::from_store(record.payload, record.captured_at));
    }

    match self.fetch_through(cache_key, record_key, fetcher).await {
      Ok(payload) => Ok(CacheResult::from_remote(payload)),
      Err(e) => {
        warn!(key = %record_key, error = %e, "Remote fetch failed and nothing stored");
        Err(FallbackError::NoFreshData {
          description: record_key.to_string(),
        })
      }
    }
  }

  /// Delete stored records older than `age`.
  pub fn prune_older_than(&self, age: Duration) -> Result<usize, StorageError> {
    if age < Duration::zero() {
      return Err(StorageError::NegativeAge(age));
    }
    match Utc::now().checked_sub_signed(age) {
      Some(cutoff) => self.store.prune_before(cutoff),
      // Nothing stored can be older than that
      None => Ok(0),
    }
  }

  /// Memoized fetch; a real remote success is persisted exactly once, a memo hit not at all.
  async fn fetch_through<F, Fut>(
    &self,
    cache_key: &CacheKey,
    record_key: &RecordKey,
    fetcher: F,
  ) -> Result<Payload, FetchError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Payload, FetchError>>,
  {
    self
      .memo
      .memoize(cache_key, || async move {
        let payload = fetcher().await?;
        self.persist(record_key, &payload);
        Ok::<_, FetchError>(payload)
      })
      .await
  }

  /// Best effort: a failed write only costs future fallback freshness.
  fn persist(&self, key: &RecordKey, payload: &Payload) {
    if let Err(e) = self.store.append(key, payload, Utc::now()) {
      warn!(key = %key, error = %e, "Failed to persist response");
    }
  }

  fn lookup(&self, key: &RecordKey) -> Option<DurableRecord> {
    match self.store.find_latest(key, self.freshness) {
      Ok(record) => record,
      Err(e) => {
        warn!(key = %key, error = %e, "Failed to read local storage");
        None
      }
    }
  }
}

impl<S: RecordStore> Clone for FallbackLayer<S> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      memo: Arc::clone(&self.memo),
      freshness: self.freshness,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheSource;
  use crate::error::{DecodeError, TransportError};
  use crate::store::{SqliteStore, Status};
  use serde_json::json;
  use std::collections::BTreeMap;
  use std::sync::atomic::{AtomicU32, Ordering};

  fn layer() -> FallbackLayer<SqliteStore> {
    FallbackLayer::new(
      SqliteStore::open_in_memory().unwrap(),
      MemoCache::new(std::time::Duration::from_secs(300)),
    )
  }

  fn keys(endpoint: &str) -> (CacheKey, RecordKey) {
    let mut params = BTreeMap::new();
    params.insert("season".to_string(), "2023".to_string());
    (
      CacheKey::new("PL", Some("2023"), endpoint, &params),
      RecordKey::for_endpoint("PL", Some("2023"), endpoint),
    )
  }

  fn exhausted() -> FetchError {
    FetchError::Exhausted {
      url: "https://api.example.com".to_string(),
      attempts: 3,
      last_error: TransportError::Status { status: 503 },
    }
  }

  async fn remote_ok(calls: &AtomicU32, payload: Payload) -> Result<Payload, FetchError> {
    calls.fetch_add(1, Ordering::SeqCst);
    Ok(payload)
  }

  async fn remote_down(calls: &AtomicU32) -> Result<Payload, FetchError> {
    calls.fetch_add(1, Ordering::SeqCst);
    Err(exhausted())
  }

  /// Store whose every operation fails.
  struct BrokenStore;

  impl RecordStore for BrokenStore {
    fn append(
      &self,
      _key: &RecordKey,
      _payload: &Payload,
      _captured_at: chrono::DateTime<Utc>,
    ) -> Result<i64, StorageError> {
      Err(StorageError::LockPoisoned)
    }

    fn find_latest(
      &self,
      _key: &RecordKey,
      _window: Duration,
    ) -> Result<Option<DurableRecord>, StorageError> {
      Err(StorageError::LockPoisoned)
    }

    fn prune_before(&self, _cutoff: chrono::DateTime<Utc>) -> Result<usize, StorageError> {
      Err(StorageError::LockPoisoned)
    }
  }

  #[tokio::test]
  async fn test_success_writes_through_once() {
    let layer = layer();
    let (cache_key, record_key) = keys("standings");
    let calls = AtomicU32::new(0);
    let started = Utc::now();

    let result = layer
      .remote_first(&cache_key, &record_key, || {
        remote_ok(&calls, json!({"standings": []}))
      })
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Remote);
    assert_eq!(result.data, json!({"standings": []}));
    assert_eq!(layer.store().count().unwrap(), 1);

    let record = layer
      .store()
      .find_latest(&record_key, Duration::hours(1))
      .unwrap()
      .unwrap();
    assert!(record.captured_at.timestamp_millis() >= started.timestamp_millis());
    assert_eq!(record.payload, json!({"standings": []}));
  }

  #[tokio::test]
  async fn test_memo_hit_does_not_persist_again() {
    let layer = layer();
    let (cache_key, record_key) = keys("standings");
    let calls = AtomicU32::new(0);

    for _ in 0..3 {
      layer
        .remote_first(&cache_key, &record_key, || remote_ok(&calls, json!(1)))
        .await
        .unwrap();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(layer.store().count().unwrap(), 1);
  }

  #[tokio::test]
  async fn test_remote_failure_serves_recent_record() {
    let layer = layer();
    let (cache_key, record_key) = keys("matches?status=FINISHED");
    let stored = json!({"matches": [{"id": 1}]});
    let captured_at = Utc::now() - Duration::hours(2);
    layer
      .store()
      .append(&record_key, &stored, captured_at)
      .unwrap();
    let calls = AtomicU32::new(0);

    let result = layer
      .remote_first(&cache_key, &record_key, || remote_down(&calls))
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Offline);
    assert_eq!(result.data, stored);
    assert_eq!(
      result.cached_at.map(|t| t.timestamp_millis()),
      Some(captured_at.timestamp_millis())
    );
    assert_eq!(record_key.status, Status::Finished);
  }

  #[tokio::test]
  async fn test_remote_failure_with_only_old_record() {
    let layer = layer();
    let (cache_key, record_key) = keys("matches?status=FINISHED");
    layer
      .store()
      .append(&record_key, &json!("old"), Utc::now() - Duration::hours(48))
      .unwrap();
    let calls = AtomicU32::new(0);

    let err = layer
      .remote_first(&cache_key, &record_key, || remote_down(&calls))
      .await
      .unwrap_err();

    assert!(matches!(err, FallbackError::NoFreshData { .. }));
  }

  #[tokio::test]
  async fn test_decode_error_takes_fallback_path() {
    let layer = layer();
    let (cache_key, record_key) = keys("standings");
    layer
      .store()
      .append(&record_key, &json!("stored"), Utc::now() - Duration::hours(1))
      .unwrap();

    let result = layer
      .remote_first(&cache_key, &record_key, || async {
        Err(FetchError::Decode(DecodeError::XmlStructure("broken")))
      })
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Offline);
    assert_eq!(result.data, json!("stored"));
  }

  #[tokio::test]
  async fn test_remote_first_ignores_fresh_record() {
    let layer = layer();
    let (cache_key, record_key) = keys("standings");
    layer
      .store()
      .append(&record_key, &json!("stored"), Utc::now())
      .unwrap();
    let calls = AtomicU32::new(0);

    let result = layer
      .remote_first(&cache_key, &record_key, || remote_ok(&calls, json!("live")))
      .await
      .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.data, json!("live"));
  }

  #[tokio::test]
  async fn test_store_first_skips_remote_when_fresh() {
    let layer = layer();
    let (cache_key, record_key) = keys("club_flags");
    layer
      .store()
      .append(&record_key, &json!([{"name": "Arsenal FC"}]), Utc::now())
      .unwrap();
    let calls = AtomicU32::new(0);

    let result = layer
      .store_first(&cache_key, &record_key, || remote_ok(&calls, json!([])))
      .await
      .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(result.source, CacheSource::Stored);
    assert_eq!(result.data, json!([{"name": "Arsenal FC"}]));
  }

  #[tokio::test]
  async fn test_store_first_fetches_and_persists_when_empty() {
    let layer = layer();
    let (cache_key, record_key) = keys("club_flags");
    let calls = AtomicU32::new(0);

    let result = layer
      .store_first(&cache_key, &record_key, || remote_ok(&calls, json!(["crest"])))
      .await
      .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.source, CacheSource::Remote);
    assert_eq!(layer.store().count().unwrap(), 1);
  }

  #[tokio::test]
  async fn test_store_first_remote_failure() {
    let layer = layer();
    let (cache_key, record_key) = keys("club_flags");
    layer
      .store()
      .append(&record_key, &json!("stale"), Utc::now() - Duration::hours(30))
      .unwrap();
    let calls = AtomicU32::new(0);

    let err = layer
      .store_first(&cache_key, &record_key, || remote_down(&calls))
      .await
      .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(matches!(err, FallbackError::NoFreshData { .. }));
  }

  #[tokio::test]
  async fn test_storage_failure_does_not_fail_request() {
    let layer = FallbackLayer::new(
      BrokenStore,
      MemoCache::new(std::time::Duration::from_secs(300)),
    );
    let (cache_key, record_key) = keys("standings");
    let calls = AtomicU32::new(0);

    let result = layer
      .remote_first(&cache_key, &record_key, || remote_ok(&calls, json!("live")))
      .await
      .unwrap();

    assert_eq!(result.data, json!("live"));
  }

  #[tokio::test]
  async fn test_storage_failure_during_fallback() {
    let layer = FallbackLayer::new(
      BrokenStore,
      MemoCache::new(std::time::Duration::from_secs(300)),
    );
    let (cache_key, record_key) = keys("standings");
    let calls = AtomicU32::new(0);

    let err = layer
      .remote_first(&cache_key, &record_key, || remote_down(&calls))
      .await
      .unwrap_err();

    assert!(matches!(err, FallbackError::NoFreshData { .. }));
  }

  #[tokio::test]
  async fn test_custom_freshness_window() {
    let layer = layer().with_freshness(Duration::hours(1));
    let (cache_key, record_key) = keys("standings");
    layer
      .store()
      .append(&record_key, &json!("two hours"), Utc::now() - Duration::hours(2))
      .unwrap();
    let calls = AtomicU32::new(0);

    let err = layer
      .remote_first(&cache_key, &record_key, || remote_down(&calls))
      .await;

    assert!(err.is_err());
  }

  #[tokio::test]
  async fn test_prune_older_than() {
    let layer = layer();
    let (_, record_key) = keys("standings");
    layer
      .store()
      .append(&record_key, &json!(1), Utc::now() - Duration::days(40))
      .unwrap();
    layer
      .store()
      .append(&record_key, &json!(2), Utc::now())
      .unwrap();

    assert_eq!(layer.prune_older_than(Duration::days(30)).unwrap(), 1);
    assert_eq!(layer.store().count().unwrap(), 1);
  }

  #[tokio::test]
  async fn test_prune_rejects_negative_age() {
    let layer = layer();
    let (_, record_key) = keys("standings");
    layer
      .store()
      .append(&record_key, &json!(1), Utc::now())
      .unwrap();

    let err = layer.prune_older_than(Duration::days(-1)).unwrap_err();

    assert!(matches!(err, StorageError::NegativeAge(_)));
    assert_eq!(layer.store().count().unwrap(), 1);
  }

  #[tokio::test]
  async fn test_prune_with_age_beyond_calendar_removes_nothing() {
    let layer = layer();
    let (_, record_key) = keys("standings");
    layer
      .store()
      .append(&record_key, &json!(1), Utc::now() - Duration::days(400))
      .unwrap();

    assert_eq!(layer.prune_older_than(Duration::days(1_000_000_000)).unwrap(), 0);
    assert_eq!(layer.store().count().unwrap(), 1);
  }
}

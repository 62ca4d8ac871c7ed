//! Short-lived in-memory memoization of expensive async calls.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::key::CacheKey;

struct MemoEntry<V> {
  value: V,
  inserted_at: Instant,
}

/// TTL cache keyed by [`CacheKey`].
///
/// Entries are checked for expiry when read; there is no background sweep.
/// Concurrent misses on the same key are collapsed into one computation.
pub struct MemoCache<V> {
  ttl: Duration,
  entries: Mutex<HashMap<String, MemoEntry<V>>>,
  /// One async gate per key currently being computed.
  gates: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<V: Clone> MemoCache<V> {
  pub fn new(ttl: Duration) -> Self {
    Self {
      ttl,
      entries: Mutex::new(HashMap::new()),
      gates: Mutex::new(HashMap::new()),
    }
  }

  /// Live value for `key`, if any. Expired entries are dropped on the way.
  pub fn get(&self, key: &CacheKey) -> Option<V> {
    let mut entries = lock(&self.entries);
    let live = entries
      .get(key.hash())
      .map(|entry| entry.inserted_at.elapsed() < self.ttl)?;
    if live {
      entries.get(key.hash()).map(|entry| entry.value.clone())
    } else {
      entries.remove(key.hash());
      None
    }
  }

  pub fn insert(&self, key: &CacheKey, value: V) {
    lock(&self.entries).insert(
      key.hash().to_string(),
      MemoEntry {
        value,
        inserted_at: Instant::now(),
      },
    );
  }

  /// Number of stored entries, expired ones that were not read yet included.
  pub fn len(&self) -> usize {
    lock(&self.entries).len()
  }

  /// Return the live value for `key`, or run `compute` once and remember its `Ok` result.
  ///
  /// Errors are handed back to the caller and never cached.
  pub async fn memoize<F, Fut, E>(&self, key: &CacheKey, compute: F) -> Result<V, E>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, E>>,
  {
    if let Some(value) = self.get(key) {
      debug!(key = %key, "Memo hit");
      return Ok(value);
    }

    let gate = self.gate(key);
    let result = {
      let _guard = gate.lock().await;
      // Whoever held the gate before us may have filled the entry
      if let Some(value) = self.get(key) {
        debug!(key = %key, "Memo filled while waiting");
        Ok(value)
      } else {
        debug!(key = %key, "Memo miss");
        let result = compute().await;
        if let Ok(value) = &result {
          self.insert(key, value.clone());
          debug!(key = %key, entries = self.len(), "Memo stored");
        }
        result
      }
    };
    self.release_gate(key, gate);

    result
  }

  fn gate(&self, key: &CacheKey) -> Arc<tokio::sync::Mutex<()>> {
    lock(&self.gates)
      .entry(key.hash().to_string())
      .or_default()
      .clone()
  }

  /// Drop the gate once nobody else is queued on it.
  ///
  /// The caller's handle is released under the map lock, so the last
  /// releaser always sees the map's handle as the only one left.
  fn release_gate(&self, key: &CacheKey, gate: Arc<tokio::sync::Mutex<()>>) {
    let mut gates = lock(&self.gates);
    let ours = gates
      .get(key.hash())
      .is_some_and(|current| Arc::ptr_eq(current, &gate));
    drop(gate);
    let idle = ours
      && gates
        .get(key.hash())
        .is_some_and(|current| Arc::strong_count(current) == 1);
    if idle {
      gates.remove(key.hash());
    }
  }
}

/// The maps hold no invariants a panicking holder could break.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::BTreeMap;
  use std::sync::atomic::{AtomicU32, Ordering};

  fn key(endpoint: &str) -> CacheKey {
    CacheKey::new("PL", Some("2023"), endpoint, &BTreeMap::new())
  }

  async fn counted(counter: &AtomicU32, value: u32) -> Result<u32, String> {
    counter.fetch_add(1, Ordering::SeqCst);
    Ok(value)
  }

  #[tokio::test(start_paused = true)]
  async fn test_hit_within_ttl() {
    let cache = MemoCache::new(Duration::from_secs(300));
    let calls = AtomicU32::new(0);

    let first = cache.memoize(&key("standings"), || counted(&calls, 1)).await;
    tokio::time::advance(Duration::from_secs(299)).await;
    let second = cache.memoize(&key("standings"), || counted(&calls, 2)).await;

    assert_eq!(first, Ok(1));
    assert_eq!(second, Ok(1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_recomputes_after_ttl() {
    let cache = MemoCache::new(Duration::from_secs(300));
    let calls = AtomicU32::new(0);

    cache
      .memoize(&key("standings"), || counted(&calls, 1))
      .await
      .unwrap();
    tokio::time::advance(Duration::from_secs(301)).await;
    let second = cache.memoize(&key("standings"), || counted(&calls, 2)).await;

    assert_eq!(second, Ok(2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_expired_entry_removed_on_read() {
    let cache = MemoCache::new(Duration::from_secs(10));
    cache.insert(&key("standings"), 7u32);
    assert_eq!(cache.len(), 1);

    tokio::time::advance(Duration::from_secs(11)).await;

    assert_eq!(cache.get(&key("standings")), None);
    assert_eq!(cache.len(), 0);
  }

  #[tokio::test]
  async fn test_errors_are_not_cached() {
    let cache = MemoCache::new(Duration::from_secs(300));
    let calls = AtomicU32::new(0);

    let calls_ref = &calls;
    let failed: Result<u32, String> = cache
      .memoize(&key("standings"), move || async move {
        calls_ref.fetch_add(1, Ordering::SeqCst);
        Err("remote down".to_string())
      })
      .await;
    let ok = cache.memoize(&key("standings"), || counted(&calls, 5)).await;

    assert!(failed.is_err());
    assert_eq!(ok, Ok(5));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_keys_are_independent() {
    let cache = MemoCache::new(Duration::from_secs(300));
    let calls = AtomicU32::new(0);

    let a = cache.memoize(&key("standings"), || counted(&calls, 1)).await;
    let b = cache.memoize(&key("matches"), || counted(&calls, 2)).await;

    assert_eq!((a, b), (Ok(1), Ok(2)));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_concurrent_misses_compute_once() {
    let cache = MemoCache::new(Duration::from_secs(300));
    let calls = AtomicU32::new(0);
    let calls_ref = &calls;
    let slow = move || async move {
      calls_ref.fetch_add(1, Ordering::SeqCst);
      tokio::time::sleep(Duration::from_millis(50)).await;
      Ok::<_, String>(42u32)
    };

    let standings = key("standings");
    let (a, b) = tokio::join!(
      cache.memoize(&standings, slow),
      cache.memoize(&standings, slow)
    );

    assert_eq!((a, b), (Ok(42), Ok(42)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(lock(&cache.gates).is_empty());
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_gates_are_released_after_contention() {
    let cache = Arc::new(MemoCache::new(Duration::from_secs(300)));
    let calls = Arc::new(AtomicU32::new(0));

    let tasks: Vec<_> = (0..16)
      .map(|_| {
        let cache = Arc::clone(&cache);
        let calls = Arc::clone(&calls);
        tokio::spawn(async move {
          let standings = key("standings");
          cache
            .memoize(&standings, move || async move {
              calls.fetch_add(1, Ordering::SeqCst);
              tokio::task::yield_now().await;
              Ok::<u32, String>(7)
            })
            .await
        })
      })
      .collect();

    for task in tasks {
      assert_eq!(task.await.unwrap(), Ok(7));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(lock(&cache.gates).is_empty());
  }
}

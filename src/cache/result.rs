//! Served data plus where it came from.

use chrono::{DateTime, Utc};

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was captured (if it came from local storage)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Fresh data from the remote, possibly memoized.
  pub fn from_remote(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Remote,
      cached_at: None,
    }
  }

  /// A fresh stored record served without asking the remote.
  pub fn from_store(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Stored,
      cached_at: Some(cached_at),
    }
  }

  /// A stored record served because the remote failed.
  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }
}

/// Indicates where served data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Live remote fetch, or its memoized copy
  Remote,
  /// Local storage, checked first by policy
  Stored,
  /// Local storage, remote unavailable
  Offline,
}

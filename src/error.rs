//! Error types for the fetch, storage and fallback layers.

use thiserror::Error;

/// A single failed attempt against the remote source.
#[derive(Debug, Error)]
pub enum TransportError {
  #[error("request timed out: {0}")]
  Timeout(String),
  #[error("connection failed: {0}")]
  Connect(String),
  #[error("HTTP status {status}")]
  Status { status: u16 },
  #[error("request failed: {0}")]
  Other(String),
}

/// A response body that could not be parsed as its declared content type.
#[derive(Debug, Error)]
pub enum DecodeError {
  #[error("invalid JSON body: {0}")]
  Json(#[from] serde_json::Error),
  #[error("invalid XML body: {0}")]
  Xml(#[from] quick_xml::Error),
  #[error("malformed XML body: {0}")]
  XmlStructure(&'static str),
  #[error("invalid YAML body: {0}")]
  Yaml(#[from] serde_yaml::Error),
  #[error("invalid CSV body: {0}")]
  Csv(#[from] csv::Error),
}

#[derive(Debug, Error)]
pub enum FetchError {
  #[error("failed to fetch {url} after {attempts} attempts: {last_error}")]
  Exhausted {
    url: String,
    attempts: u32,
    last_error: TransportError,
  },
  #[error(transparent)]
  Decode(#[from] DecodeError),
  #[error("invalid request URL {url}: {source}")]
  InvalidUrl {
    url: String,
    source: url::ParseError,
  },
}

#[derive(Debug, Error)]
pub enum StorageError {
  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),
  #[error("failed to serialize payload: {0}")]
  Serialize(#[from] serde_json::Error),
  #[error("store lock poisoned")]
  LockPoisoned,
  #[error("failed to prepare store location: {0}")]
  Io(#[from] std::io::Error),
  #[error("retention age must not be negative, got {0}")]
  NegativeAge(chrono::Duration),
}

/// Terminal failure of the fetch/fallback pipeline.
#[derive(Debug, Error)]
pub enum FallbackError {
  #[error("no data for {description}: remote unavailable and nothing fresh in local storage")]
  NoFreshData { description: String },
}

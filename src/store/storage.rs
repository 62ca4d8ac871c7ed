//! Record storage trait and SQLite implementation.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::record::{DurableRecord, RecordKey};
use crate::error::StorageError;
use crate::fetch::Payload;

/// Append-only store of fetched responses.
pub trait RecordStore: Send + Sync {
  /// Add a record. Existing records are never touched. Returns the new record's id.
  fn append(
    &self,
    key: &RecordKey,
    payload: &Payload,
    captured_at: DateTime<Utc>,
  ) -> Result<i64, StorageError>;

  /// Most recent record for `key` captured within `window` of now.
  ///
  /// Records with equal timestamps are ordered by insertion; the later one wins.
  fn find_latest(
    &self,
    key: &RecordKey,
    window: Duration,
  ) -> Result<Option<DurableRecord>, StorageError>;

  /// Delete every record captured before `cutoff`. Returns how many were removed.
  fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError>;
}

/// SQLite-based record storage.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open the store at `path`, or at the default location when `None`.
  pub fn open(path: Option<&Path>) -> Result<Self, StorageError> {
    match path {
      Some(p) => Self::open_at(p),
      None => Self::open_at(&Self::default_path()?),
    }
  }

  pub fn open_at(path: &Path) -> Result<Self, StorageError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    debug!(path = %path.display(), "Opening record store");
    Self::with_connection(Connection::open(path)?)
  }

  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self, StorageError> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> Result<Self, StorageError> {
    conn.execute_batch(RECORD_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf, StorageError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| {
        StorageError::Io(std::io::Error::new(
          std::io::ErrorKind::NotFound,
          "could not determine data directory",
        ))
      })?;

    Ok(data_dir.join("scoreline").join("records.db"))
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
    self.conn.lock().map_err(|_| StorageError::LockPoisoned)
  }

  #[cfg(test)]
  pub(crate) fn count(&self) -> Result<usize, StorageError> {
    let conn = self.conn()?;
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
    Ok(n as usize)
  }
}

/// Schema for the record table.
const RECORD_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    collection TEXT NOT NULL,
    resource_id TEXT NOT NULL,
    period_id TEXT,
    status TEXT NOT NULL,
    data TEXT NOT NULL,
    -- epoch milliseconds, UTC
    captured_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_lookup
    ON records(collection, resource_id, period_id, status, captured_at);
"#;

impl RecordStore for SqliteStore {
  fn append(
    &self,
    key: &RecordKey,
    payload: &Payload,
    captured_at: DateTime<Utc>,
  ) -> Result<i64, StorageError> {
    let data = serde_json::to_string(payload)?;
    let conn = self.conn()?;

    conn.execute(
      "INSERT INTO records (collection, resource_id, period_id, status, data, captured_at)
       VALUES (?, ?, ?, ?, ?, ?)",
      params![
        key.collection.as_str(),
        key.resource_id,
        key.period_id,
        key.status.as_str(),
        data,
        captured_at.timestamp_millis()
      ],
    )?;

    Ok(conn.last_insert_rowid())
  }

  fn find_latest(
    &self,
    key: &RecordKey,
    window: Duration,
  ) -> Result<Option<DurableRecord>, StorageError> {
    // A window reaching past the representable range has no lower bound
    let oldest = Utc::now()
      .checked_sub_signed(window)
      .map_or(i64::MIN, |t| t.timestamp_millis());
    let conn = self.conn()?;

    // `IS` so that a NULL period matches period-independent records
    let row: Option<(i64, String, i64)> = conn
      .query_row(
        "SELECT id, data, captured_at FROM records
         WHERE collection = ? AND resource_id = ? AND period_id IS ? AND status = ?
           AND captured_at >= ?
         ORDER BY captured_at DESC, id DESC
         LIMIT 1",
        params![
          key.collection.as_str(),
          key.resource_id,
          key.period_id,
          key.status.as_str(),
          oldest
        ],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()?;

    let Some((id, data, captured_ms)) = row else {
      return Ok(None);
    };

    Ok(Some(DurableRecord {
      id,
      key: key.clone(),
      payload: serde_json::from_str(&data)?,
      captured_at: DateTime::from_timestamp_millis(captured_ms).unwrap_or_default(),
    }))
  }

  fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
    let conn = self.conn()?;
    let removed = conn.execute(
      "DELETE FROM records WHERE captured_at < ?",
      params![cutoff.timestamp_millis()],
    )?;
    Ok(removed)
  }
}

//! Durable record types and the key they are filed under.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::fetch::Payload;

/// Logical dataset a record belongs to, taken from the endpoint's first path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
  Standings,
  Matches,
  ClubFlags,
  Unknown,
}

impl Collection {
  pub fn from_endpoint(endpoint: &str) -> Self {
    let path = endpoint.split('?').next().unwrap_or_default();
    match path.split('/').next().unwrap_or_default() {
      "standings" => Self::Standings,
      "matches" => Self::Matches,
      "club_flags" => Self::ClubFlags,
      _ => Self::Unknown,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Standings => "standings",
      Self::Matches => "matches",
      Self::ClubFlags => "club_flags",
      Self::Unknown => "unknown",
    }
  }
}

/// Match status filter a record was fetched with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Status {
  Scheduled,
  Timed,
  Live,
  InPlay,
  Paused,
  Finished,
  Postponed,
  Suspended,
  Cancelled,
  /// Any other filter, kept verbatim so it only ever matches itself
  Other(String),
  /// No status filter
  Unknown,
}

impl Status {
  /// Status named by the endpoint's `status` query parameter; `Unknown` if absent.
  pub fn from_endpoint(endpoint: &str) -> Self {
    let Some((_, query)) = endpoint.split_once('?') else {
      return Self::Unknown;
    };
    url::form_urlencoded::parse(query.as_bytes())
      .find(|(key, _)| key == "status")
      .map(|(_, value)| Self::from_token(&value))
      .unwrap_or(Self::Unknown)
  }

  pub fn from_token(token: &str) -> Self {
    match token {
      "SCHEDULED" => Self::Scheduled,
      "TIMED" => Self::Timed,
      "LIVE" => Self::Live,
      "IN_PLAY" => Self::InPlay,
      "PAUSED" => Self::Paused,
      "FINISHED" => Self::Finished,
      "POSTPONED" => Self::Postponed,
      "SUSPENDED" => Self::Suspended,
      "CANCELLED" => Self::Cancelled,
      "" => Self::Unknown,
      other => Self::Other(other.to_string()),
    }
  }

  pub fn as_str(&self) -> &str {
    match self {
      Self::Scheduled => "SCHEDULED",
      Self::Timed => "TIMED",
      Self::Live => "LIVE",
      Self::InPlay => "IN_PLAY",
      Self::Paused => "PAUSED",
      Self::Finished => "FINISHED",
      Self::Postponed => "POSTPONED",
      Self::Suspended => "SUSPENDED",
      Self::Cancelled => "CANCELLED",
      Self::Other(token) => token,
      Self::Unknown => "UNKNOWN",
    }
  }
}

/// Address of a record in the store.
///
/// `period_id` is `None` for period-independent data such as crests.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
  pub collection: Collection,
  pub resource_id: String,
  pub period_id: Option<String>,
  pub status: Status,
}

impl RecordKey {
  /// Key for a response fetched from `endpoint`; collection and status both come from it.
  pub fn for_endpoint(resource_id: &str, period_id: Option<&str>, endpoint: &str) -> Self {
    Self {
      collection: Collection::from_endpoint(endpoint),
      resource_id: resource_id.to_string(),
      period_id: period_id.map(String::from),
      status: Status::from_endpoint(endpoint),
    }
  }
}

impl fmt::Display for RecordKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.collection.as_str(), self.resource_id)?;
    if let Some(period) = &self.period_id {
      write!(f, " {}", period)?;
    }
    if self.status != Status::Unknown {
      write!(f, " [{}]", self.status.as_str())?;
    }
    Ok(())
  }
}

/// A persisted response. Never modified once written.
#[derive(Debug, Clone, PartialEq)]
pub struct DurableRecord {
  pub id: i64,
  pub key: RecordKey,
  pub payload: Payload,
  pub captured_at: DateTime<Utc>,
}

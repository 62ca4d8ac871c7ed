use std::collections::BTreeMap;
use std::time::Duration;

use url::Url;

use crate::error::FetchError;

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// An outbound GET request. Built once, then only read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
  url: String,
  headers: BTreeMap<String, String>,
  query: BTreeMap<String, String>,
  timeout: Duration,
}

impl FetchRequest {
  pub fn new(url: impl Into<String>) -> Self {
    Self {
      url: url.into(),
      headers: BTreeMap::new(),
      query: BTreeMap::new(),
      timeout: DEFAULT_TIMEOUT,
    }
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.insert(name.into(), value.into());
    self
  }

  pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.query.insert(key.into(), value.into());
    self
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  pub fn headers(&self) -> &BTreeMap<String, String> {
    &self.headers
  }

  pub fn query(&self) -> &BTreeMap<String, String> {
    &self.query
  }

  pub fn timeout(&self) -> Duration {
    self.timeout
  }

  /// The target URL with the query parameters appended to any query already in it.
  pub fn full_url(&self) -> Result<Url, FetchError> {
    let mut url = Url::parse(&self.url).map_err(|source| FetchError::InvalidUrl {
      url: self.url.clone(),
      source,
    })?;

    // query_pairs_mut leaves a bare '?' behind when nothing is appended
    if !self.query.is_empty() {
      url.query_pairs_mut().extend_pairs(&self.query);
    }

    Ok(url)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_full_url_keeps_existing_query() {
    let request =
      FetchRequest::new("https://api.example.com/v4/competitions/PL/matches?status=FINISHED")
        .with_query("season", "2023");

    let url = request.full_url().unwrap();
    assert_eq!(
      url.as_str(),
      "https://api.example.com/v4/competitions/PL/matches?status=FINISHED&season=2023"
    );
  }

  #[test]
  fn test_invalid_url() {
    let request = FetchRequest::new("not a url");
    assert!(matches!(
      request.full_url(),
      Err(FetchError::InvalidUrl { .. })
    ));
  }

  #[test]
  fn test_defaults() {
    let request = FetchRequest::new("https://example.com");
    assert_eq!(request.timeout(), DEFAULT_TIMEOUT);
    assert!(request.headers().is_empty());
    assert!(request.query().is_empty());
  }
}

use std::time::Duration;

use crate::config::Config;
use crate::fetch::FetchRequest;

/// Endpoint name crest lists are cached and stored under.
pub const CRESTS_ENDPOINT: &str = "club_flags";

/// Builds requests against the competition API and the crest CDN.
#[derive(Debug, Clone)]
pub struct FootballApi {
  base_url: String,
  crests_url: String,
  auth_header: String,
  token: Option<String>,
  timeout: Duration,
}

impl FootballApi {
  pub fn new(config: &Config, token: Option<String>) -> Self {
    Self {
      base_url: config.api.base_url.clone(),
      crests_url: config.api.crests_url.clone(),
      auth_header: config.api.auth_header.clone(),
      token,
      timeout: config.fetch.timeout(),
    }
  }

  /// Request for a competition endpoint such as `standings` or `matches?status=FINISHED`.
  ///
  /// Any query in the endpoint stays in the URL; the season is added as a parameter.
  pub fn competition_request(
    &self,
    competition: &str,
    season: &str,
    endpoint: &str,
  ) -> FetchRequest {
    let url = self
      .base_url
      .replace("{competition}", competition)
      .replace("{endpoint}", endpoint);

    let request = FetchRequest::new(url)
      .with_query("season", season)
      .with_timeout(self.timeout);
    match &self.token {
      Some(token) => request.with_header(self.auth_header.as_str(), token.as_str()),
      None => request,
    }
  }

  /// Request for a competition's crest list. The CDN needs no credentials.
  pub fn crests_request(&self, competition: &str) -> FetchRequest {
    let url = self.crests_url.replace("{competition}", competition);
    FetchRequest::new(url).with_timeout(self.timeout)
  }
}

//! Football data with memoization and offline fallback.

use std::sync::Arc;
use std::time::Duration;

use color_eyre::Result;
use serde_json::json;
use tracing::{debug, warn};

use super::client::{FootballApi, CRESTS_ENDPOINT};
use super::crests::{apply_crests, crests_from_payload, Crest};
use crate::cache::{CacheKey, CacheResult, FallbackLayer, MemoCache};
use crate::config::Config;
use crate::error::{FallbackError, StorageError};
use crate::fetch::{FetchRequest, Fetcher, Payload, ReqwestTransport, Transport};
use crate::store::{RecordKey, RecordStore, SqliteStore};

/// Standings, fixtures and crests for a competition.
///
/// Standings and fixtures always try the remote first and fall back to stored
/// copies; crests come from storage whenever a fresh copy exists.
pub struct FootballService<T: Transport, S: RecordStore> {
  api: FootballApi,
  fetcher: Arc<Fetcher<T>>,
  layer: FallbackLayer<S>,
}

impl FootballService<ReqwestTransport, SqliteStore> {
  /// Wire up the real transport and on-disk store from configuration.
  pub fn new(config: &Config) -> Result<Self> {
    let token = Config::get_api_token();
    if token.is_none() {
      warn!(
        "No API token set (SCORELINE_API_TOKEN or FOOTBALL_DATA_TOKEN); requests will be anonymous"
      );
    }

    let api = FootballApi::new(config, token);
    let fetcher = Fetcher::new(ReqwestTransport::new()?).with_policy(config.fetch.retry_policy());
    let store = SqliteStore::open(config.store.path.as_deref())?;
    let memo = MemoCache::new(Duration::from_secs(config.cache.ttl_secs));
    let layer = FallbackLayer::new(store, memo)
      .with_freshness(chrono::Duration::hours(config.fallback.freshness_hours));

    Ok(Self::with_parts(api, fetcher, layer))
  }
}

impl<T: Transport, S: RecordStore> FootballService<T, S> {
  pub fn with_parts(api: FootballApi, fetcher: Fetcher<T>, layer: FallbackLayer<S>) -> Self {
    Self {
      api,
      fetcher: Arc::new(fetcher),
      layer,
    }
  }

  pub async fn get_standings(
    &self,
    competition: &str,
    season: &str,
  ) -> Result<CacheResult<Payload>, FallbackError> {
    self.competition_data(competition, season, "standings").await
  }

  /// Fixtures with the given status, e.g. `SCHEDULED` or `FINISHED`.
  pub async fn get_matches(
    &self,
    competition: &str,
    season: &str,
    status: &str,
  ) -> Result<CacheResult<Payload>, FallbackError> {
    let status: String = url::form_urlencoded::byte_serialize(status.as_bytes()).collect();
    let endpoint = format!("matches?status={status}");
    self.competition_data(competition, season, &endpoint).await
  }

  /// Crest list for a competition. Crests do not change between seasons, so
  /// the season never narrows the lookup.
  pub async fn get_crests(
    &self,
    competition: &str,
    season: &str,
  ) -> Result<CacheResult<Payload>, FallbackError> {
    debug!(competition, season, "Loading crests");
    let request = self.api.crests_request(competition);
    let cache_key = CacheKey::new(competition, None, CRESTS_ENDPOINT, request.query());
    let record_key = RecordKey::for_endpoint(competition, None, CRESTS_ENDPOINT);

    self
      .layer
      .store_first(&cache_key, &record_key, || self.fetch(request))
      .await
  }

  /// Crests for enrichment; any failure degrades to an empty list.
  pub async fn crest_list(&self, competition: &str, season: &str) -> Vec<Crest> {
    match self.get_crests(competition, season).await {
      Ok(result) => crests_from_payload(&result.data),
      Err(e) => {
        warn!(competition, error = %e, "Crests unavailable, continuing without logos");
        Vec::new()
      }
    }
  }

  /// Standings plus scheduled and finished fixtures, all with crests applied.
  ///
  /// The four lookups run concurrently. Missing crests only blank the logos;
  /// any other failure fails the overview.
  pub async fn get_overview(
    &self,
    competition: &str,
    season: &str,
  ) -> Result<Payload, FallbackError> {
    let (crests, standings, scheduled, finished) = futures::join!(
      self.crest_list(competition, season),
      self.get_standings(competition, season),
      self.get_matches(competition, season, "SCHEDULED"),
      self.get_matches(competition, season, "FINISHED"),
    );

    let mut standings = standings?.data;
    let mut scheduled = scheduled?.data;
    let mut finished = finished?.data;
    apply_crests(&mut standings, "standings", &crests);
    apply_crests(&mut scheduled, "matches", &crests);
    apply_crests(&mut finished, "matches", &crests);

    Ok(json!({
      "competition": competition,
      "season": season,
      "standings": standings,
      "scheduled": scheduled,
      "finished": finished,
    }))
  }

  /// Delete stored records older than `age`.
  pub fn prune(&self, age: chrono::Duration) -> Result<usize, StorageError> {
    self.layer.prune_older_than(age)
  }

  async fn competition_data(
    &self,
    competition: &str,
    season: &str,
    endpoint: &str,
  ) -> Result<CacheResult<Payload>, FallbackError> {
    let request = self.api.competition_request(competition, season, endpoint);
    let cache_key = CacheKey::new(competition, Some(season), endpoint, request.query());
    let record_key = RecordKey::for_endpoint(competition, Some(season), endpoint);

    self
      .layer
      .remote_first(&cache_key, &record_key, || self.fetch(request))
      .await
  }

  async fn fetch(&self, request: FetchRequest) -> Result<Payload, crate::error::FetchError> {
    self.fetcher.fetch(&request).await
  }
}

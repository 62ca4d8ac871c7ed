use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fetch::{Backoff, RetryPolicy, MAX_RETRY};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub fetch: FetchConfig,
  pub cache: CacheConfig,
  pub fallback: FallbackConfig,
  pub store: StoreConfig,
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  /// Standings/matches URL template with `{competition}` and `{endpoint}` placeholders
  pub base_url: String,
  /// Crest list URL template with a `{competition}` placeholder
  pub crests_url: String,
  /// Header the API token is sent in
  pub auth_header: String,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: "https://api.football-data.org/v4/competitions/{competition}/{endpoint}".into(),
      crests_url: "https://cdn.logosports.net/club/fb/list?region={competition}".into(),
      auth_header: "X-Auth-Token".into(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
  pub max_retry: u32,
  pub timeout_secs: u64,
  /// Base delay for exponential backoff between attempts; unset retries immediately
  pub backoff_ms: Option<u64>,
}

impl Default for FetchConfig {
  fn default() -> Self {
    Self {
      max_retry: MAX_RETRY,
      timeout_secs: 60,
      backoff_ms: None,
    }
  }
}

impl FetchConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    let backoff = match self.backoff_ms {
      Some(ms) => Backoff::Exponential {
        base: Duration::from_millis(ms),
        max: Duration::from_secs(30),
      },
      None => Backoff::Immediate,
    };
    RetryPolicy {
      max_attempts: self.max_retry,
      backoff,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub ttl_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self { ttl_secs: 300 }
  }
}

/// Upper bound for `fallback.freshness_hours`, about a century.
const MAX_FRESHNESS_HOURS: i64 = 24 * 366 * 100;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
  /// Maximum age of a stored record that may be served instead of the remote
  pub freshness_hours: i64,
}

impl Default for FallbackConfig {
  fn default() -> Self {
    Self {
      freshness_hours: crate::cache::DEFAULT_FRESHNESS_HOURS,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
  /// SQLite file; defaults to the platform data directory
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  pub level: String,
  /// Also write daily log files here when set
  pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: "info".into(),
      directory: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./scoreline.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/scoreline/config.yaml
  ///
  /// Built-in defaults are used when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("scoreline.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("scoreline").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    if config.fetch.max_retry == 0 {
      return Err(eyre!("fetch.max_retry must be at least 1"));
    }
    if !(0..=MAX_FRESHNESS_HOURS).contains(&config.fallback.freshness_hours) {
      return Err(eyre!(
        "fallback.freshness_hours must be between 0 and {MAX_FRESHNESS_HOURS}"
      ));
    }
    Ok(config)
  }

  /// Get the API token from environment variables.
  ///
  /// Checks SCORELINE_API_TOKEN first, then FOOTBALL_DATA_TOKEN as fallback.
  pub fn get_api_token() -> Option<String> {
    std::env::var("SCORELINE_API_TOKEN")
      .or_else(|_| std::env::var("FOOTBALL_DATA_TOKEN"))
      .ok()
      .filter(|t| !t.is_empty())
  }
}

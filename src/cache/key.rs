//! Cache keys for memoized fetches.

use std::collections::BTreeMap;
use std::fmt;

use sha2::{Digest, Sha256};

/// Identifies one memoized call by its full argument tuple.
///
/// Parameters live in a `BTreeMap`, so the order callers insert them in never
/// changes the key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
  hash: String,
  description: String,
}

impl CacheKey {
  pub fn new(
    resource_id: &str,
    period_id: Option<&str>,
    endpoint: &str,
    params: &BTreeMap<String, String>,
  ) -> Self {
    let params = params
      .iter()
      .map(|(k, v)| format!("{}={}", escape(k), escape(v)))
      .collect::<Vec<_>>()
      .join("&");
    let input = format!(
      "{}|{}|{}|{}",
      escape(resource_id),
      period_id.map(|p| format!("+{}", escape(p))).unwrap_or_default(),
      escape(endpoint),
      params
    );

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let hash = hex::encode(hasher.finalize());

    let description = match period_id {
      Some(period) => format!("{} {} ({})", resource_id, endpoint, period),
      None => format!("{} {}", resource_id, endpoint),
    };

    Self { hash, description }
  }

  pub fn hash(&self) -> &str {
    &self.hash
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.description)
  }
}

/// Keeps separators inside a component from colliding with the ones between components.
fn escape(s: &str) -> String {
  s.replace('%', "%25")
    .replace('|', "%7C")
    .replace('&', "%26")
    .replace('=', "%3D")
}

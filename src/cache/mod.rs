//! Short-lived memoization and the offline fallback policy built on it.
//!
//! - [`MemoCache`] keeps recent remote results in memory for a TTL
//! - [`FallbackLayer`] writes every remote success through to the record
//!   store and serves stored records when the remote fails

mod key;
mod layer;
mod memo;
mod result;

pub use key::CacheKey;
pub use layer::{FallbackLayer, DEFAULT_FRESHNESS_HOURS};
pub use memo::MemoCache;
pub use result::{CacheResult, CacheSource};

//! Remote fetching with retries and content negotiation.
//!
//! This module knows nothing about caching or persistence: it turns a
//! [`FetchRequest`] into a decoded [`Payload`] or a [`FetchError`](crate::error::FetchError).

mod client;
mod decode;
mod request;
mod transport;

pub use client::{Backoff, Fetcher, RetryPolicy, MAX_RETRY};
pub use request::FetchRequest;
pub use transport::{ReqwestTransport, Transport};

#[cfg(test)]
pub use transport::testing;

/// Encoding-agnostic decoded response body.
pub type Payload = serde_json::Value;

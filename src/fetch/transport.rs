//! Network boundary for the fetcher.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use super::request::FetchRequest;
use crate::error::{FetchError, TransportError};

/// A response with a non-error status, body already read.
#[derive(Debug, Clone)]
pub struct RawResponse {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: String,
}

/// Performs a single GET attempt. Retrying is the caller's business.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn get(&self, request: &FetchRequest) -> Result<RawResponse, AttemptError>;
}

/// Why a single attempt failed.
#[derive(Debug)]
pub enum AttemptError {
  /// Worth retrying: network trouble or an error status.
  Retryable(TransportError),
  /// Retrying cannot help.
  Fatal(FetchError),
}

impl From<TransportError> for AttemptError {
  fn from(e: TransportError) -> Self {
    Self::Retryable(e)
  }
}

/// reqwest-backed transport.
#[derive(Clone)]
pub struct ReqwestTransport {
  client: reqwest::Client,
}

impl ReqwestTransport {
  pub fn new() -> Result<Self, reqwest::Error> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("scoreline/", env!("CARGO_PKG_VERSION")))
      .build()?;
    Ok(Self { client })
  }

  fn classify(e: &reqwest::Error) -> TransportError {
    if e.is_timeout() {
      TransportError::Timeout(e.to_string())
    } else if e.is_connect() {
      TransportError::Connect(e.to_string())
    } else if let Some(status) = e.status() {
      TransportError::Status {
        status: status.as_u16(),
      }
    } else {
      TransportError::Other(e.to_string())
    }
  }
}

#[async_trait]
impl Transport for ReqwestTransport {
  async fn get(&self, request: &FetchRequest) -> Result<RawResponse, AttemptError> {
    let url = request.full_url().map_err(AttemptError::Fatal)?;
    debug!(url = %url, "HTTP GET start");

    let mut builder = self.client.get(url).timeout(request.timeout());
    for (name, value) in request.headers() {
      builder = builder.header(name.as_str(), value.as_str());
    }

    let response = builder.send().await.map_err(|e| Self::classify(&e))?;
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
      return Err(
        TransportError::Status {
          status: status.as_u16(),
        }
        .into(),
      );
    }

    let content_type = response
      .headers()
      .get(CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map(String::from);
    let body = response.text().await.map_err(|e| Self::classify(&e))?;

    Ok(RawResponse {
      status: status.as_u16(),
      content_type,
      body,
    })
  }
}

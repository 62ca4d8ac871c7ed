use std::time::Duration;

use backoff::backoff::Backoff as _;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use tracing::{info, warn};

use super::decode::decode_body;
use super::request::FetchRequest;
use super::transport::{AttemptError, Transport};
use super::Payload;
use crate::error::{FetchError, TransportError};

/// Number of attempts made before giving up.
pub const MAX_RETRY: u32 = 3;

/// Pause between failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
  /// Retry straight away.
  Immediate,
  /// Wait `base * 2^(attempt-1)`, capped at `max`.
  Exponential { base: Duration, max: Duration },
}

impl Backoff {
  /// Delay generator for one fetch; `None` retries without waiting.
  fn schedule(&self) -> Option<ExponentialBackoff> {
    match *self {
      Backoff::Immediate => None,
      Backoff::Exponential { base, max } => Some(
        ExponentialBackoffBuilder::new()
          .with_initial_interval(base)
          .with_multiplier(2.0)
          .with_randomization_factor(0.0)
          .with_max_interval(max)
          .with_max_elapsed_time(None)
          .build(),
      ),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub backoff: Backoff,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: MAX_RETRY,
      backoff: Backoff::Immediate,
    }
  }
}

/// Issues GET requests with bounded retries and decodes the body by content type.
pub struct Fetcher<T: Transport> {
  transport: T,
  policy: RetryPolicy,
}

impl<T: Transport> Fetcher<T> {
  pub fn new(transport: T) -> Self {
    Self {
      transport,
      policy: RetryPolicy::default(),
    }
  }

  pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
    self.policy = policy;
    self
  }

  #[cfg(test)]
  pub fn transport(&self) -> &T {
    &self.transport
  }

  pub async fn fetch(&self, request: &FetchRequest) -> Result<Payload, FetchError> {
    let max_attempts = self.policy.max_attempts.max(1);
    let mut schedule = self.policy.backoff.schedule();
    let mut last_error = None;

    for attempt in 1..=max_attempts {
      match self.transport.get(request).await {
        Ok(response) => {
          log_attempt(request, Some(response.status), None);
          return Ok(decode_body(response.content_type.as_deref(), &response.body)?);
        }
        Err(AttemptError::Fatal(e)) => return Err(e),
        Err(AttemptError::Retryable(e)) => {
          let status = match &e {
            TransportError::Status { status } => Some(*status),
            _ => None,
          };
          log_attempt(request, status, Some(&e));
          warn!(
            url = request.url(),
            error = %e,
            "Request failed. Retrying {}/{}",
            attempt,
            max_attempts
          );
          last_error = Some(e);
        }
      }

      if attempt < max_attempts {
        if let Some(delay) = schedule.as_mut().and_then(|s| s.next_backoff()) {
          tokio::time::sleep(delay).await;
        }
      }
    }

    Err(FetchError::Exhausted {
      url: request.url().to_string(),
      attempts: max_attempts,
      last_error: last_error.unwrap_or(TransportError::Other("no attempt made".to_string())),
    })
  }
}

/// Header values are left out: they carry the auth token.
fn log_attempt(request: &FetchRequest, status: Option<u16>, error: Option<&TransportError>) {
  let headers: Vec<&str> = request.headers().keys().map(String::as_str).collect();
  info!(
    url = request.url(),
    method = "GET",
    headers = ?headers,
    params = ?request.query(),
    response_status_code = ?status,
    error = error.map(tracing::field::display),
    "HTTP request"
  );
}

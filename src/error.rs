//! Failure taxonomy for calls to the analytics service.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The closed set of ways an upstream call can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
  /// 4xx: the request itself was rejected
  ClientError,
  /// 5xx, or a success status with a body we could not read
  ServerError,
  /// No response within the transport timeout
  Timeout,
  /// DNS, connection or TLS failure
  Unreachable,
}

impl FailureKind {
  /// Classify a non-success HTTP status.
  pub fn from_status(status: u16) -> Self {
    if (400..500).contains(&status) {
      FailureKind::ClientError
    } else {
      FailureKind::ServerError
    }
  }

  /// Whether the failure is an upstream malfunction rather than a bad request.
  pub fn is_fallback_eligible(self) -> bool {
    !matches!(self, FailureKind::ClientError)
  }
}

impl fmt::Display for FailureKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      FailureKind::ClientError => "client error",
      FailureKind::ServerError => "server error",
      FailureKind::Timeout => "timeout",
      FailureKind::Unreachable => "unreachable",
    };
    f.write_str(label)
  }
}

/// A failed analytics call, carrying the upstream's message when it sent one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FetchError {
  pub kind: FailureKind,
  pub message: String,
  /// Machine-readable code from `{ error: { code } }`, if present
  pub code: Option<String>,
  /// HTTP status, when a response was received
  pub status: Option<u16>,
}

impl FetchError {
  pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
      code: None,
      status: None,
    }
  }

  /// Error built from a non-success HTTP status.
  pub fn from_status(status: u16, message: impl Into<String>, code: Option<String>) -> Self {
    Self {
      kind: FailureKind::from_status(status),
      message: message.into(),
      code,
      status: Some(status),
    }
  }

  pub fn timeout(after: Duration) -> Self {
    Self::new(
      FailureKind::Timeout,
      format!("Analytics service did not respond within {}ms", after.as_millis()),
    )
  }

  pub fn unreachable(cause: impl fmt::Display) -> Self {
    Self::new(
      FailureKind::Unreachable,
      format!("Analytics service unreachable: {}", cause),
    )
  }

  pub fn with_status(mut self, status: u16) -> Self {
    self.status = Some(status);
    self
  }
}

/// Result of a single upstream call, produced by the transport and consumed
/// immediately by the cache layer.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
  Success(T),
  /// The upstream answered but marked its own data as stale; carries the
  /// reported age of that data.
  StaleFallback(T, chrono::Duration),
  Failure(FetchError),
}

impl<T> FetchOutcome<T> {
  /// Transform the payload, turning a conversion error into a failure.
  pub fn and_then<U, F>(self, f: F) -> FetchOutcome<U>
  where
    F: FnOnce(T) -> Result<U, FetchError>,
  {
    match self {
      FetchOutcome::Success(v) => match f(v) {
        Ok(u) => FetchOutcome::Success(u),
        Err(e) => FetchOutcome::Failure(e),
      },
      FetchOutcome::StaleFallback(v, age) => match f(v) {
        Ok(u) => FetchOutcome::StaleFallback(u, age),
        Err(e) => FetchOutcome::Failure(e),
      },
      FetchOutcome::Failure(e) => FetchOutcome::Failure(e),
    }
  }

  pub fn is_failure(&self) -> bool {
    matches!(self, FetchOutcome::Failure(_))
  }
}

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, AGE};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

use super::api_types::ApiErrorBody;
use crate::cache::STALE_HEADER;
use crate::config::{AnalyticsConfig, Config};
use crate::error::{FailureKind, FetchError, FetchOutcome};

/// One outbound call to the analytics service.
///
/// Implementations never retry; they turn every failure into a [`FetchError`]
/// inside [`FetchOutcome::Failure`].
#[async_trait]
pub trait AnalyticsTransport: Send + Sync {
  async fn call(
    &self,
    endpoint: &str,
    body: &Value,
    headers: Option<&HeaderMap>,
  ) -> FetchOutcome<Value>;
}

/// Analytics API client wrapper
#[derive(Clone)]
pub struct AnalyticsClient {
  http: reqwest::Client,
  base_url: Url,
  timeout: Duration,
  api_key: Option<String>,
}

impl AnalyticsClient {
  pub fn new(config: &AnalyticsConfig) -> Result<Self> {
    let mut client = Self::with_base_url(&config.url, config.timeout())?;
    client.api_key = Config::get_api_key().ok();
    if client.api_key.is_none() {
      debug!("No analytics API key set, calling without authorization");
    }
    Ok(client)
  }

  /// Client without credentials, used by tests and local deployments.
  pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
    let mut base_url =
      Url::parse(base_url).map_err(|e| eyre!("Invalid analytics URL {}: {}", base_url, e))?;

    // Url::join replaces the last path segment unless the base ends with '/'
    if !base_url.path().ends_with('/') {
      let path = format!("{}/", base_url.path());
      base_url.set_path(&path);
    }

    let http = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      timeout,
      api_key: None,
    })
  }

  pub fn timeout(&self) -> Duration {
    self.timeout
  }

  fn endpoint_url(&self, endpoint: &str) -> std::result::Result<Url, FetchError> {
    self
      .base_url
      .join(endpoint.trim_start_matches('/'))
      .map_err(|e| {
        FetchError::new(
          FailureKind::ClientError,
          format!("Invalid endpoint {}: {}", endpoint, e),
        )
      })
  }
}

#[async_trait]
impl AnalyticsTransport for AnalyticsClient {
  async fn call(
    &self,
    endpoint: &str,
    body: &Value,
    headers: Option<&HeaderMap>,
  ) -> FetchOutcome<Value> {
    let url = match self.endpoint_url(endpoint) {
      Ok(url) => url,
      Err(e) => return FetchOutcome::Failure(e),
    };

    let mut request = self.http.post(url).json(body);
    if let Some(key) = &self.api_key {
      request = request.bearer_auth(key);
    }
    if let Some(extra) = headers {
      request = request.headers(extra.clone());
    }

    let started = Instant::now();

    // Dropping the future on timeout cancels the in-flight request.
    let response = tokio::time::timeout(self.timeout, async {
      let response = request.send().await?;
      let status = response.status();
      let headers = response.headers().clone();
      let bytes = response.bytes().await?;
      Ok::<_, reqwest::Error>((status, headers, bytes))
    })
    .await;

    let elapsed_ms = started.elapsed().as_millis() as u64;

    match response {
      Err(_) => {
        warn!(endpoint, elapsed_ms, "analytics call timed out");
        FetchOutcome::Failure(FetchError::timeout(self.timeout))
      }
      Ok(Err(e)) => {
        warn!(endpoint, elapsed_ms, error = %e, "analytics call failed");
        if e.is_timeout() {
          FetchOutcome::Failure(FetchError::timeout(self.timeout))
        } else {
          FetchOutcome::Failure(FetchError::unreachable(error_chain(&e)))
        }
      }
      Ok(Ok((status, headers, bytes))) => {
        debug!(endpoint, status = status.as_u16(), elapsed_ms, "analytics call finished");
        classify_response(status, &headers, &bytes)
      }
    }
  }
}

/// Turn a received response into an outcome.
pub fn classify_response(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> FetchOutcome<Value> {
  if status.is_success() {
    return match serde_json::from_slice::<Value>(body) {
      Ok(value) if is_marked_stale(headers) => {
        FetchOutcome::StaleFallback(value, reported_age(headers))
      }
      Ok(value) => FetchOutcome::Success(value),
      Err(e) => FetchOutcome::Failure(
        FetchError::new(
          FailureKind::ServerError,
          format!("Invalid JSON from analytics service: {}", e),
        )
        .with_status(status.as_u16()),
      ),
    };
  }

  let error = match serde_json::from_slice::<ApiErrorBody>(body) {
    Ok(parsed) => {
      let code = parsed.error.code_string();
      FetchError::from_status(status.as_u16(), parsed.error.message, code)
    }
    Err(_) => FetchError::from_status(
      status.as_u16(),
      format!("Analytics service returned HTTP {}", status.as_u16()),
      None,
    ),
  };
  FetchOutcome::Failure(error)
}

fn is_marked_stale(headers: &HeaderMap) -> bool {
  headers
    .get(STALE_HEADER)
    .and_then(|v| v.to_str().ok())
    .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1"))
    .unwrap_or(false)
}

fn reported_age(headers: &HeaderMap) -> ChronoDuration {
  headers
    .get(AGE)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.trim().parse::<i64>().ok())
    .map(ChronoDuration::seconds)
    .unwrap_or_else(ChronoDuration::zero)
}

/// reqwest hides the interesting cause (DNS, refused, TLS) in the source chain
fn error_chain(err: &reqwest::Error) -> String {
  let mut message = err.to_string();
  let mut source = std::error::Error::source(err);
  while let Some(cause) = source {
    message.push_str(": ");
    message.push_str(&cause.to_string());
    source = cause.source();
  }
  message
}

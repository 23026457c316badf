//! Aggregation gateway: the analytics transport behind the freshness cache.

use chrono::Duration;
use serde::Serialize;
use std::sync::Arc;

use crate::cache::{CacheLayer, CacheResult, CachedValue, FreshnessCache};
use crate::config::{duration_from_secs, Config};
use crate::error::{FailureKind, FetchError};

use super::api_types::{AnalyticsEnvelope, ApiHolding, DashboardRequest, SignalRequest};
use super::cache::AnalyticsQueryKey;
use super::client::AnalyticsTransport;
use super::types::{DigestResult, Holding, SignalResult};

/// The cache every gateway in the process should share.
pub type PayloadCache = FreshnessCache<CachedValue<AnalyticsEnvelope>>;

/// Per-operation TTLs and endpoint paths.
#[derive(Debug, Clone)]
pub struct GatewayPolicy {
  pub dashboard_ttl: Duration,
  pub signals_ttl: Duration,
  pub dashboard_path: String,
  pub signals_path: String,
}

impl Default for GatewayPolicy {
  fn default() -> Self {
    Self {
      dashboard_ttl: Duration::minutes(2),
      signals_ttl: Duration::minutes(5),
      dashboard_path: "/v1/dashboard".to_string(),
      signals_path: "/v1/signals".to_string(),
    }
  }
}

impl GatewayPolicy {
  pub fn from_config(config: &Config) -> Self {
    Self {
      dashboard_ttl: duration_from_secs(config.cache.dashboard_ttl_secs),
      signals_ttl: duration_from_secs(config.cache.signals_ttl_secs),
      dashboard_path: config.analytics.dashboard_path.clone(),
      signals_path: config.analytics.signals_path.clone(),
    }
  }
}

/// Analytics access with transparent caching and stale fallback.
///
/// Every response carries a `stale` flag: set when the upstream failed and an
/// expired entry was served instead, or when the upstream itself marked the
/// data stale. Failures with nothing cached propagate unchanged.
#[derive(Clone)]
pub struct AggregationGateway {
  transport: Arc<dyn AnalyticsTransport>,
  cache: CacheLayer<AnalyticsEnvelope>,
  policy: GatewayPolicy,
}

impl AggregationGateway {
  pub fn new(
    transport: Arc<dyn AnalyticsTransport>,
    cache: Arc<PayloadCache>,
    policy: GatewayPolicy,
  ) -> Self {
    Self {
      transport,
      cache: CacheLayer::new(cache),
      policy,
    }
  }

  pub fn policy(&self) -> &GatewayPolicy {
    &self.policy
  }

  /// Dashboard digest for `holdings`, optionally limited to `include` sections.
  pub async fn fetch_dashboard(
    &self,
    holdings: &[Holding],
    include: &[String],
  ) -> Result<CacheResult<DigestResult>, FetchError> {
    let key = AnalyticsQueryKey::dashboard(holdings, include);
    let body = to_body(&DashboardRequest {
      holdings: key.holdings().iter().map(ApiHolding::from).collect(),
      include: key.include(),
    })?;

    let result = self
      .fetch_envelope(&key, &self.policy.dashboard_path, body, self.policy.dashboard_ttl)
      .await?;
    Ok(result.map(DigestResult::from))
  }

  /// Signal aggregation for `holdings` over the trailing `window_days`.
  pub async fn fetch_signal_aggregation(
    &self,
    holdings: &[Holding],
    window_days: u32,
  ) -> Result<CacheResult<SignalResult>, FetchError> {
    let key = AnalyticsQueryKey::signals(holdings, window_days);
    let body = to_body(&SignalRequest {
      holdings: key.holdings().iter().map(ApiHolding::from).collect(),
      days: window_days,
    })?;

    let result = self
      .fetch_envelope(&key, &self.policy.signals_path, body, self.policy.signals_ttl)
      .await?;
    Ok(result.map(|env| env.into_signals(window_days)))
  }

  async fn fetch_envelope(
    &self,
    key: &AnalyticsQueryKey,
    path: &str,
    body: serde_json::Value,
    ttl: Duration,
  ) -> Result<CacheResult<AnalyticsEnvelope>, FetchError> {
    self
      .cache
      .fetch(key, ttl, || {
        let transport = Arc::clone(&self.transport);
        let path = path.to_string();
        async move {
          transport
            .call(&path, &body, None)
            .await
            .and_then(AnalyticsEnvelope::from_value)
        }
      })
      .await
  }
}

fn to_body(request: &impl Serialize) -> Result<serde_json::Value, FetchError> {
  serde_json::to_value(request).map_err(|e| {
    FetchError::new(
      FailureKind::ClientError,
      format!("Failed to encode analytics request: {}", e),
    )
  })
}

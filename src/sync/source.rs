//! Data sources a session can poll.

use async_trait::async_trait;

use crate::analytics::{AggregationGateway, DigestResult, Portfolio, SignalResult};
use crate::cache::CacheResult;
use crate::error::FetchError;

/// Fetches the latest payload for a subject.
///
/// The `stale` flag on the result is how a source reports that it served data
/// known to be outdated.
#[async_trait]
pub trait SyncSource<T>: Send + Sync {
  async fn fetch(&self, subject: &Portfolio) -> Result<CacheResult<T>, FetchError>;
}

/// Dashboard digests through the aggregation gateway
#[derive(Clone)]
pub struct DashboardSource {
  gateway: AggregationGateway,
  include: Vec<String>,
}

impl DashboardSource {
  pub fn new(gateway: AggregationGateway, include: Vec<String>) -> Self {
    Self { gateway, include }
  }
}

#[async_trait]
impl SyncSource<DigestResult> for DashboardSource {
  async fn fetch(&self, subject: &Portfolio) -> Result<CacheResult<DigestResult>, FetchError> {
    self
      .gateway
      .fetch_dashboard(&subject.holdings, &self.include)
      .await
  }
}

/// Signal aggregations through the aggregation gateway
#[derive(Clone)]
pub struct SignalSource {
  gateway: AggregationGateway,
  window_days: u32,
}

impl SignalSource {
  pub fn new(gateway: AggregationGateway, window_days: u32) -> Self {
    Self {
      gateway,
      window_days,
    }
  }
}

#[async_trait]
impl SyncSource<SignalResult> for SignalSource {
  async fn fetch(&self, subject: &Portfolio) -> Result<CacheResult<SignalResult>, FetchError> {
    self
      .gateway
      .fetch_signal_aggregation(&subject.holdings, self.window_days)
      .await
  }
}

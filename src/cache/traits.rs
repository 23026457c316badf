//! Core traits and types for the caching system.

use chrono::Duration;

/// Response header a serving boundary sets when it hands out stale data.
pub const STALE_HEADER: &str = "x-data-stale";

/// Trait for request descriptions that can be turned into cache keys.
///
/// Two logically identical requests must produce the same `cache_hash`
/// regardless of argument ordering.
pub trait QueryKey {
  /// Stable key used for cache lookup
  fn cache_hash(&self) -> String;

  /// Human readable description for logs
  fn description(&self) -> String;
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// True when the data is known to be outdated, either because the upstream
  /// said so or because the upstream failed and the cache filled in
  pub stale: bool,
  /// How old the data was when served (if from cache or marked by upstream)
  pub age: Option<Duration>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      stale: false,
      age: None,
    }
  }

  /// Network data the upstream itself flagged as stale.
  pub fn from_stale_upstream(data: T, age: Duration) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      stale: true,
      age: Some(age),
    }
  }

  /// Create a new cache result from an unexpired entry.
  pub fn from_cache(data: T, age: Duration, upstream_stale: bool) -> Self {
    Self {
      data,
      source: CacheSource::CacheFresh,
      stale: upstream_stale,
      age: Some(age),
    }
  }

  /// Create a new cache result for offline mode.
  pub fn offline(data: T, age: Duration) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      stale: true,
      age: Some(age),
    }
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheResult<U> {
    CacheResult {
      data: f(self.data),
      source: self.source,
      stale: self.stale,
      age: self.age,
    }
  }

  /// Value for [`STALE_HEADER`] when this result is forwarded over HTTP.
  pub fn stale_header_value(&self) -> Option<&'static str> {
    self.stale.then_some("true")
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still within its TTL
  CacheFresh,
  /// Offline mode - upstream failed, serving an expired entry
  Offline,
}

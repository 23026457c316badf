//! Cache layer that orchestrates caching logic with network fetching.

use chrono::Duration;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::store::FreshnessCache;
use super::traits::{CacheResult, QueryKey};
use crate::error::{FetchError, FetchOutcome};

/// What the layer keeps per key: the payload plus whether the upstream had
/// already flagged it as stale when it was fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue<V> {
  pub value: V,
  pub upstream_stale: bool,
}

/// Cache layer that manages caching logic and network fetching.
///
/// This layer sits between the gateway and the transport, providing
/// transparent caching with offline support. It never retries; its only
/// recovery is serving an expired entry.
pub struct CacheLayer<V> {
  cache: Arc<FreshnessCache<CachedValue<V>>>,
}

impl<V: Clone> CacheLayer<V> {
  /// Create a new cache layer over a (possibly shared) cache.
  pub fn new(cache: Arc<FreshnessCache<CachedValue<V>>>) -> Self {
    Self { cache }
  }

  pub fn cache(&self) -> &Arc<FreshnessCache<CachedValue<V>>> {
    &self.cache
  }

  /// Fetch with a cache-first strategy.
  ///
  /// 1. Check cache - if fresh, return immediately without calling `fetcher`
  /// 2. If expired or missing, call the upstream through `fetcher`
  /// 3. On success, overwrite the entry with a new `ttl`
  /// 4. On failure, serve any entry for the key, marked stale (offline mode)
  /// 5. With nothing cached at all, propagate the failure
  pub async fn fetch<K, F, Fut>(
    &self,
    key: &K,
    ttl: Duration,
    fetcher: F,
  ) -> Result<CacheResult<V>, FetchError>
  where
    K: QueryKey,
    F: FnOnce() -> Fut,
    Fut: Future<Output = FetchOutcome<V>>,
  {
    let hash = key.cache_hash();

    if let Some(cached) = self.cache.get_fresh(&hash) {
      let age = self.cache.entry_age(&hash).unwrap_or_else(Duration::zero);
      debug!(query = %key.description(), "cache hit");
      return Ok(CacheResult::from_cache(
        cached.value,
        age,
        cached.upstream_stale,
      ));
    }

    debug!(query = %key.description(), "cache miss, calling upstream");

    match fetcher().await {
      FetchOutcome::Success(value) => {
        self.store(&hash, value.clone(), false, ttl);
        Ok(CacheResult::from_network(value))
      }
      FetchOutcome::StaleFallback(value, age) => {
        debug!(query = %key.description(), age_secs = age.num_seconds(), "upstream marked data stale");
        self.store(&hash, value.clone(), true, ttl);
        Ok(CacheResult::from_stale_upstream(value, age))
      }
      FetchOutcome::Failure(err) => match self.cache.get_stale_entry(&hash) {
        Some(read) => {
          warn!(
            query = %key.description(),
            kind = %err.kind,
            fallback_eligible = err.kind.is_fallback_eligible(),
            error = %err,
            age_secs = read.age.num_seconds(),
            expired = read.expired,
            "upstream failed, serving stale cache"
          );
          Ok(CacheResult::offline(read.payload.value, read.age))
        }
        None => {
          warn!(query = %key.description(), kind = %err.kind, error = %err, "upstream failed with nothing cached");
          Err(err)
        }
      },
    }
  }

  fn store(&self, hash: &str, value: V, upstream_stale: bool, ttl: Duration) {
    self.cache.put(
      hash,
      CachedValue {
        value,
        upstream_stale,
      },
      ttl,
    );
  }
}

impl<V> Clone for CacheLayer<V> {
  fn clone(&self) -> Self {
    Self {
      cache: Arc::clone(&self.cache),
    }
  }
}

//! In-process key/value store with per-entry expiry.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::clock::{self, SharedClock};

/// A single cached payload.
///
/// Entries are never mutated in place; a write always replaces the whole
/// entry, so readers never see a partial update.
#[derive(Debug)]
pub struct CacheEntry<V> {
  pub payload: V,
  pub stored_at: DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
}

/// Payload read back regardless of expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct StaleRead<V> {
  pub payload: V,
  /// Time since the entry was written
  pub age: Duration,
  /// Whether the entry was still within its TTL
  pub expired: bool,
}

/// Process-wide cache of previously fetched payloads.
///
/// There is no sweep and no size cap: an entry lives until it is overwritten
/// or the cache is cleared. Expired entries stay readable through
/// [`FreshnessCache::get_stale`].
pub struct FreshnessCache<V> {
  entries: RwLock<HashMap<String, Arc<CacheEntry<V>>>>,
  clock: SharedClock,
}

impl<V: Clone> FreshnessCache<V> {
  pub fn new(clock: SharedClock) -> Self {
    Self {
      entries: RwLock::new(HashMap::new()),
      clock,
    }
  }

  /// Cache driven by the real wall clock.
  pub fn with_system_clock() -> Self {
    Self::new(clock::system())
  }

  /// Payload for `key` only if it has not expired.
  pub fn get_fresh(&self, key: &str) -> Option<V> {
    let entry = self.entry(key)?;
    if self.clock.now() < entry.expires_at {
      Some(entry.payload.clone())
    } else {
      None
    }
  }

  /// Payload for `key` regardless of expiry. Only for degraded-mode serving.
  pub fn get_stale(&self, key: &str) -> Option<V> {
    self.entry(key).map(|entry| entry.payload.clone())
  }

  /// Like [`get_stale`](Self::get_stale), with the entry's age attached.
  pub fn get_stale_entry(&self, key: &str) -> Option<StaleRead<V>> {
    let entry = self.entry(key)?;
    let now = self.clock.now();
    Some(StaleRead {
      payload: entry.payload.clone(),
      age: now - entry.stored_at,
      expired: now >= entry.expires_at,
    })
  }

  /// Overwrite any entry for `key`; it expires `ttl` from now, saturating at
  /// the end of representable time.
  pub fn put(&self, key: &str, payload: V, ttl: Duration) {
    let now = self.clock.now();
    let expires_at = now
      .checked_add_signed(ttl)
      .unwrap_or(if ttl < Duration::zero() {
        DateTime::<Utc>::MIN_UTC
      } else {
        DateTime::<Utc>::MAX_UTC
      });
    let entry = Arc::new(CacheEntry {
      payload,
      stored_at: now,
      expires_at,
    });
    self.write().insert(key.to_string(), entry);
  }

  /// Drop every entry.
  pub fn clear(&self) {
    self.write().clear();
  }

  /// Age of the entry for `key`, if one was ever written.
  pub fn entry_age(&self, key: &str) -> Option<Duration> {
    self.entry(key).map(|entry| self.clock.now() - entry.stored_at)
  }

  /// Number of distinct keys written since the last clear.
  pub fn len(&self) -> usize {
    self.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.read().is_empty()
  }

  fn entry(&self, key: &str) -> Option<Arc<CacheEntry<V>>> {
    self.read().get(key).cloned()
  }

  // A poisoned lock still holds a consistent map since every write is a
  // single insert of a fully built entry.
  fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<CacheEntry<V>>>> {
    self.entries.read().unwrap_or_else(|e| e.into_inner())
  }

  fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<CacheEntry<V>>>> {
    self.entries.write().unwrap_or_else(|e| e.into_inner())
  }
}

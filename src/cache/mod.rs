//! Freshness cache for analytics payloads.
//!
//! This module provides an upstream-agnostic caching mechanism that:
//! - Keeps one entry per derived key, tagged with an expiry instant
//! - Separates "fresh or nothing" reads from "fresh or stale" fallback reads
//! - Provides basic offline mode (serve stale cache when the upstream fails)

mod layer;
mod store;
mod traits;

pub use layer::{CacheLayer, CachedValue};
pub use store::{CacheEntry, FreshnessCache, StaleRead};
pub use traits::{CacheResult, CacheSource, QueryKey, STALE_HEADER};

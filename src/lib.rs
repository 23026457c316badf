//! Synchronization layer between portfolio views and the analytics service.
//!
//! - [`analytics`]: timeout-bound transport and the aggregation gateway
//! - [`cache`]: TTL freshness cache with stale-read fallback
//! - [`sync`]: per-view polling sessions

pub mod analytics;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod marker;
pub mod portfolio;
pub mod sync;
pub mod telemetry;

pub use error::{FailureKind, FetchError, FetchOutcome};

//! Access to the upstream analytics service.

pub mod api_types;
pub mod cache;
pub mod client;
pub mod gateway;
pub mod types;

pub use cache::AnalyticsQueryKey;
pub use client::{AnalyticsClient, AnalyticsTransport};
pub use gateway::{AggregationGateway, GatewayPolicy, PayloadCache};
pub use types::{DigestResult, Holding, Portfolio, SignalResult};

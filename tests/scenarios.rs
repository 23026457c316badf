//! End-to-end behaviour over a local HTTP responder: transport, gateway cache
//! and sync session wired the way the watcher wires them.

mod common;

use chrono::Duration as ChronoDuration;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use common::{envelope, CannedResponse, MockAnalytics};
use intel_sync::analytics::{
  AggregationGateway, AnalyticsClient, DigestResult, GatewayPolicy, Holding, PayloadCache,
  Portfolio, SignalResult,
};
use intel_sync::clock::{Clock, ManualClock};
use intel_sync::marker::{AcknowledgementMarker, SqliteMarkerStore};
use intel_sync::sync::{
  DashboardSource, SignalSource, SyncOptions, SyncSession, SyncStatus, STALE_DATA_MESSAGE,
};
use intel_sync::FailureKind;

struct Harness {
  mock: MockAnalytics,
  clock: ManualClock,
  gateway: AggregationGateway,
}

impl Harness {
  async fn start(timeout: Duration) -> Self {
    let mock = MockAnalytics::start().await;
    let clock = ManualClock::starting_now();
    let transport = Arc::new(AnalyticsClient::with_base_url(&mock.base_url, timeout).unwrap());
    let cache = Arc::new(PayloadCache::new(clock.shared()));
    let gateway = AggregationGateway::new(transport, cache, GatewayPolicy::default());
    Self {
      mock,
      clock,
      gateway,
    }
  }

  fn dashboard_session(&self) -> SyncSession<DigestResult> {
    SyncSession::new(
      Arc::new(DashboardSource::new(self.gateway.clone(), vec!["risk".to_string()])),
      self.clock.shared(),
      SyncOptions::default(),
    )
  }

  fn signal_session(&self) -> SyncSession<SignalResult> {
    SyncSession::new(
      Arc::new(SignalSource::new(self.gateway.clone(), 30)),
      self.clock.shared(),
      SyncOptions::default(),
    )
  }
}

fn portfolio(id: &str) -> Portfolio {
  Portfolio {
    id: id.to_string(),
    name: id.to_uppercase(),
    is_active: true,
    holdings: vec![Holding::new("AAPL", 60.0), Holding::new("MSFT", 40.0)],
  }
}

fn unavailable() -> CannedResponse {
  CannedResponse::json(503, json!({ "error": { "message": "Service Unavailable" } }))
}

#[tokio::test]
async fn test_outage_after_success_serves_cached_data_then_recovers() {
  let h = Harness::start(Duration::from_secs(5)).await;
  let mut session = h.dashboard_session();

  h.mock.push(CannedResponse::json(200, envelope(json!({ "risk": { "beta": 1.1 } }))));
  session.select_subject(portfolio("p"));
  session.settle().await;
  assert_eq!(session.status(), SyncStatus::Success);
  let fetched_at = session.state().last_fetched_at;

  // Past the dashboard TTL, the upstream goes down
  h.clock.advance(ChronoDuration::minutes(3));
  h.mock.push(unavailable());
  session.refresh();
  session.settle().await;

  assert_eq!(session.status(), SyncStatus::Stale);
  assert_eq!(
    session.data().and_then(|d| d.section("risk")),
    Some(&json!({ "beta": 1.1 }))
  );
  assert_eq!(session.state().error_message.as_deref(), Some(STALE_DATA_MESSAGE));
  assert!(session.state().last_fetched_at > fetched_at);
  assert_eq!(h.mock.hits(), 2);

  h.clock.advance(ChronoDuration::minutes(3));
  h.mock.push(CannedResponse::json(200, envelope(json!({ "risk": { "beta": 0.9 } }))));
  session.refresh();
  session.settle().await;

  assert_eq!(session.status(), SyncStatus::Success);
  assert_eq!(session.state().error_message, None);
  assert_eq!(
    session.data().and_then(|d| d.section("risk")),
    Some(&json!({ "beta": 0.9 }))
  );
}

#[tokio::test]
async fn test_first_fetch_timeout_is_error() {
  let h = Harness::start(Duration::from_millis(200)).await;
  let mut session = h.dashboard_session();

  h.mock.push(
    CannedResponse::json(200, envelope(json!({})))
      .delayed(Duration::from_secs(3)),
  );
  session.select_subject(portfolio("q"));
  session.settle().await;

  assert_eq!(session.status(), SyncStatus::Error);
  assert!(session.data().is_none());
  assert_eq!(
    session.state().error_message.as_deref(),
    Some("Analytics service did not respond within 200ms")
  );
}

#[tokio::test]
async fn test_cold_cache_failure_reaches_caller() {
  let h = Harness::start(Duration::from_secs(5)).await;
  h.mock.push(unavailable());

  let err = h
    .gateway
    .fetch_signal_aggregation(&[Holding::new("AAPL", 100.0)], 30)
    .await
    .unwrap_err();

  assert_eq!(err.kind, FailureKind::ServerError);
  assert_eq!(err.status, Some(503));
}

#[tokio::test]
async fn test_signal_request_carries_window() {
  let h = Harness::start(Duration::from_secs(5)).await;
  let mut session = h.signal_session();

  h.mock.push(CannedResponse::json(200, envelope(json!({ "signals": [] }))));
  session.select_subject(portfolio("p"));
  session.settle().await;

  let result = session.data().unwrap();
  assert_eq!(result.window_days, 30);
  assert!(result.generated_at().is_some());

  let request = &h.mock.requests()[0];
  assert_eq!(request.path, "/v1/signals");
  assert_eq!(request.body["days"], json!(30));
  assert_eq!(request.body["holdings"][0]["ticker"], json!("AAPL"));
}

#[tokio::test]
async fn test_long_hidden_view_refetches_once_on_return() {
  let h = Harness::start(Duration::from_secs(5)).await;
  let mut session = h.dashboard_session();

  h.mock.push(CannedResponse::json(200, envelope(json!({ "risk": {} }))));
  session.select_subject(portfolio("p"));
  session.settle().await;

  session.set_visible(false);
  for _ in 0..15 {
    h.clock.advance(ChronoDuration::minutes(1));
    session.tick();
  }
  assert_eq!(h.mock.hits(), 1);

  h.mock.push(CannedResponse::json(200, envelope(json!({ "risk": {} }))));
  assert!(session.set_visible(true));
  session.tick();
  session.settle().await;
  session.tick();

  assert_eq!(h.mock.hits(), 2);
  assert_eq!(session.status(), SyncStatus::Success);
}

#[tokio::test]
async fn test_unacknowledged_update_follows_marker() {
  let h = Harness::start(Duration::from_secs(5)).await;
  let mut session = h.dashboard_session();
  let marker = SqliteMarkerStore::in_memory().unwrap();

  h.mock.push(CannedResponse::json(200, envelope(json!({}))));
  session.select_subject(portfolio("p"));
  session.settle().await;
  assert!(session.has_unacknowledged_update(&marker).unwrap());

  h.clock.advance(ChronoDuration::seconds(30));
  marker.acknowledge(h.clock.now()).unwrap();
  assert!(!session.has_unacknowledged_update(&marker).unwrap());
}

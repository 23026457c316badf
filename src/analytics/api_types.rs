//! Serde types matching the analytics service's request and response bodies.
//!
//! These types are separate from domain types to allow clean (de)serialization
//! while keeping domain types focused on application needs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::types::{DigestResult, Holding, SignalResult};
use crate::error::{FailureKind, FetchError};

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApiHolding<'a> {
  pub ticker: &'a str,
  pub weight_pct: f64,
}

impl<'a> From<&'a Holding> for ApiHolding<'a> {
  fn from(h: &'a Holding) -> Self {
    ApiHolding {
      ticker: &h.ticker,
      weight_pct: h.weight_pct,
    }
  }
}

#[derive(Debug, Serialize)]
pub struct DashboardRequest<'a> {
  pub holdings: Vec<ApiHolding<'a>>,
  pub include: &'a [String],
}

#[derive(Debug, Serialize)]
pub struct SignalRequest<'a> {
  pub holdings: Vec<ApiHolding<'a>>,
  pub days: u32,
}

// ============================================================================
// Responses
// ============================================================================

/// `{ data: {...}, meta: {...} }`, shared by both endpoints
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnalyticsEnvelope {
  pub data: Value,
  #[serde(default)]
  pub meta: Map<String, Value>,
}

impl AnalyticsEnvelope {
  /// Validate a decoded success body.
  ///
  /// A 2xx response that does not follow the envelope shape is an upstream
  /// malfunction, so it is reported as a server error and never cached.
  pub fn from_value(value: Value) -> Result<Self, FetchError> {
    serde_json::from_value(value).map_err(|e| {
      FetchError::new(
        FailureKind::ServerError,
        format!("Malformed analytics response: {}", e),
      )
    })
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
  pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
  pub message: String,
  // Some deployments send numeric codes
  #[serde(default)]
  pub code: Option<Value>,
}

impl ApiErrorDetail {
  pub fn code_string(&self) -> Option<String> {
    match self.code.as_ref()? {
      Value::Null => None,
      Value::String(s) => Some(s.clone()),
      other => Some(other.to_string()),
    }
  }
}

// ============================================================================
// Conversions to domain types
// ============================================================================

impl From<AnalyticsEnvelope> for DigestResult {
  fn from(env: AnalyticsEnvelope) -> Self {
    DigestResult {
      data: env.data,
      meta: env.meta,
    }
  }
}

impl AnalyticsEnvelope {
  pub fn into_signals(self, window_days: u32) -> SignalResult {
    SignalResult {
      data: self.data,
      meta: self.meta,
      window_days,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_envelope_requires_data() {
    let ok = AnalyticsEnvelope::from_value(json!({ "data": { "risk": 1 } })).unwrap();
    assert!(ok.meta.is_empty());

    let err = AnalyticsEnvelope::from_value(json!({ "result": [] })).unwrap_err();
    assert_eq!(err.kind, FailureKind::ServerError);
  }

  #[test]
  fn test_error_code_accepts_strings_and_numbers() {
    let body: ApiErrorBody =
      serde_json::from_value(json!({ "error": { "message": "nope", "code": 4012 } })).unwrap();
    assert_eq!(body.error.code_string().as_deref(), Some("4012"));

    let body: ApiErrorBody =
      serde_json::from_value(json!({ "error": { "message": "nope", "code": "E_RANGE" } }))
        .unwrap();
    assert_eq!(body.error.code_string().as_deref(), Some("E_RANGE"));

    let body: ApiErrorBody =
      serde_json::from_value(json!({ "error": { "message": "nope" } })).unwrap();
    assert_eq!(body.error.code_string(), None);
  }

  #[test]
  fn test_digest_sections() {
    let env = AnalyticsEnvelope::from_value(json!({
      "data": { "risk": { "beta": 1.1 } },
      "meta": { "generated_at": "2026-10-19T08:00:00Z" }
    }))
    .unwrap();
    let digest = DigestResult::from(env);

    assert_eq!(digest.section("risk"), Some(&json!({ "beta": 1.1 })));
    assert!(digest.section("performance").is_none());
    assert!(digest.generated_at().is_some());
  }
}

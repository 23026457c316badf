use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One position in a portfolio, weighted as a percentage of the whole
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
  pub ticker: String,
  pub weight_pct: f64,
}

impl Holding {
  pub fn new(ticker: impl Into<String>, weight_pct: f64) -> Self {
    Self {
      ticker: ticker.into(),
      weight_pct,
    }
  }
}

/// A portfolio as supplied by the portfolio store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub is_active: bool,
  #[serde(default)]
  pub holdings: Vec<Holding>,
}

/// Dashboard digest for one holdings set
#[derive(Debug, Clone, PartialEq)]
pub struct DigestResult {
  /// Section name -> section payload, as computed upstream
  pub data: Value,
  pub meta: Map<String, Value>,
}

impl DigestResult {
  /// A single included section, e.g. `"risk"`
  pub fn section(&self, name: &str) -> Option<&Value> {
    self.data.get(name)
  }

  pub fn generated_at(&self) -> Option<DateTime<Utc>> {
    generated_at(&self.meta)
  }
}

/// Signal aggregation over a trailing window
#[derive(Debug, Clone, PartialEq)]
pub struct SignalResult {
  pub data: Value,
  pub meta: Map<String, Value>,
  pub window_days: u32,
}

impl SignalResult {
  pub fn generated_at(&self) -> Option<DateTime<Utc>> {
    generated_at(&self.meta)
  }
}

fn generated_at(meta: &Map<String, Value>) -> Option<DateTime<Utc>> {
  meta
    .get("generated_at")
    .and_then(|v| v.as_str())
    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
    .map(|dt| dt.with_timezone(&Utc))
}

//! Cache keys for analytics requests.

use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

use crate::cache::QueryKey;

use super::types::Holding;

/// Query key types for analytics calls.
///
/// Constructed through [`AnalyticsQueryKey::dashboard`] and
/// [`AnalyticsQueryKey::signals`], which normalize their inputs so argument
/// order never changes the key.
#[derive(Clone, Debug, PartialEq)]
pub enum AnalyticsQueryKey {
  /// Dashboard digest for a holdings set and section list
  Dashboard {
    holdings: Vec<Holding>,
    include: Vec<String>,
  },
  /// Signal aggregation for a holdings set over a trailing window
  Signals { holdings: Vec<Holding>, days: u32 },
}

impl AnalyticsQueryKey {
  pub fn dashboard(holdings: &[Holding], include: &[String]) -> Self {
    Self::Dashboard {
      holdings: normalize_holdings(holdings),
      include: normalize_sections(include),
    }
  }

  pub fn signals(holdings: &[Holding], days: u32) -> Self {
    Self::Signals {
      holdings: normalize_holdings(holdings),
      days,
    }
  }

  /// The normalized holdings, also used as the request body.
  pub fn holdings(&self) -> &[Holding] {
    match self {
      Self::Dashboard { holdings, .. } | Self::Signals { holdings, .. } => holdings,
    }
  }

  /// The normalized dashboard sections; empty for signal keys.
  pub fn include(&self) -> &[String] {
    match self {
      Self::Dashboard { include, .. } => include,
      Self::Signals { .. } => &[],
    }
  }

  fn prefix(&self) -> &'static str {
    match self {
      Self::Dashboard { .. } => "dashboard",
      Self::Signals { .. } => "signals",
    }
  }

  fn canonical(&self) -> String {
    match self {
      Self::Dashboard { holdings, include } => format!(
        "dashboard|{}|{}",
        canonical_holdings(holdings),
        include.join(",")
      ),
      Self::Signals { holdings, days } => {
        format!("signals|{}|{}", canonical_holdings(holdings), days)
      }
    }
  }
}

impl QueryKey for AnalyticsQueryKey {
  fn cache_hash(&self) -> String {
    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(self.canonical().as_bytes());
    let result = hasher.finalize();
    format!("{}:{}", self.prefix(), hex::encode(result))
  }

  fn description(&self) -> String {
    match self {
      Self::Dashboard { holdings, include } => {
        if include.is_empty() {
          format!("dashboard ({} holdings)", holdings.len())
        } else {
          format!(
            "dashboard ({} holdings) [{}]",
            holdings.len(),
            include.join(", ")
          )
        }
      }
      Self::Signals { holdings, days } => {
        format!("signals ({} holdings, {}d)", holdings.len(), days)
      }
    }
  }
}

/// Normalize holdings for consistent hashing.
/// Tickers are trimmed and uppercased, duplicates are merged by summing their
/// weights, blanks are dropped, and the result is sorted by ticker. Weights
/// are rounded to the precision the key is built from, so the request body
/// and the key always agree.
pub fn normalize_holdings(holdings: &[Holding]) -> Vec<Holding> {
  let mut merged: BTreeMap<String, f64> = BTreeMap::new();
  for h in holdings {
    let ticker = h.ticker.trim().to_uppercase();
    if ticker.is_empty() {
      continue;
    }
    *merged.entry(ticker).or_insert(0.0) += h.weight_pct;
  }

  merged
    .into_iter()
    .map(|(ticker, weight_pct)| Holding {
      ticker,
      weight_pct: round_weight(weight_pct),
    })
    .collect()
}

fn round_weight(weight_pct: f64) -> f64 {
  (weight_pct * WEIGHT_SCALE).round() / WEIGHT_SCALE
}

/// Lowercase, dedupe and sort the requested dashboard sections.
pub fn normalize_sections(include: &[String]) -> Vec<String> {
  include
    .iter()
    .map(|s| s.trim().to_lowercase())
    .filter(|s| !s.is_empty())
    .collect::<BTreeSet<_>>()
    .into_iter()
    .collect()
}

/// Four decimal places of a percentage weight
const WEIGHT_SCALE: f64 = 10_000.0;

fn canonical_holdings(holdings: &[Holding]) -> String {
  holdings
    .iter()
    .map(|h| format!("{}={:.4}", h.ticker, h.weight_pct))
    .collect::<Vec<_>>()
    .join(",")
}

//! Where the watcher learns which portfolios exist.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::PathBuf;

use crate::analytics::Portfolio;

#[async_trait]
pub trait PortfolioStore: Send + Sync {
  async fn list_portfolios(&self) -> Result<Vec<Portfolio>>;
}

/// Portfolios read from a YAML file:
///
/// ```yaml
/// portfolios:
///   - id: core
///     name: Core
///     is_active: true
///     holdings:
///       - { ticker: AAPL, weight_pct: 60 }
/// ```
pub struct YamlPortfolioStore {
  path: PathBuf,
}

#[derive(Deserialize)]
struct PortfolioFile {
  #[serde(default)]
  portfolios: Vec<Portfolio>,
}

impl YamlPortfolioStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }
}

#[async_trait]
impl PortfolioStore for YamlPortfolioStore {
  async fn list_portfolios(&self) -> Result<Vec<Portfolio>> {
    let contents = tokio::fs::read_to_string(&self.path)
      .await
      .map_err(|e| eyre!("Failed to read portfolios file {}: {}", self.path.display(), e))?;

    let file: PortfolioFile = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse portfolios file {}: {}", self.path.display(), e))?;

    Ok(file.portfolios)
  }
}

/// The first active portfolio, or the first one if none is active.
pub fn default_portfolio(portfolios: &[Portfolio]) -> Option<&Portfolio> {
  portfolios
    .iter()
    .find(|p| p.is_active)
    .or_else(|| portfolios.first())
}

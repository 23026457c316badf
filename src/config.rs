use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub analytics: AnalyticsConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub sync: SyncConfig,
  /// YAML file listing portfolios for the watcher's portfolio store
  pub portfolios_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
  /// Base URL of the analytics service
  pub url: String,
  /// Hard wall-clock limit for a single call
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  /// When false, the host application is expected to use its mock source
  #[serde(default = "default_true")]
  pub enabled: bool,
  #[serde(default = "default_dashboard_path")]
  pub dashboard_path: String,
  #[serde(default = "default_signals_path")]
  pub signals_path: String,
}

impl AnalyticsConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_dashboard_ttl_secs")]
  pub dashboard_ttl_secs: u64,
  #[serde(default = "default_signals_ttl_secs")]
  pub signals_ttl_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      dashboard_ttl_secs: default_dashboard_ttl_secs(),
      signals_ttl_secs: default_signals_ttl_secs(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  #[serde(default = "default_poll_interval_secs")]
  pub poll_interval_secs: u64,
  /// Age after which held data counts as stale even if its fetch succeeded
  #[serde(default = "default_stale_threshold_secs")]
  pub stale_threshold_secs: u64,
  #[serde(default = "default_signal_window_days")]
  pub signal_window_days: u32,
  /// Dashboard sections to request (empty = upstream default)
  #[serde(default)]
  pub include: Vec<String>,
  #[serde(default = "default_true")]
  pub pause_polling_when_hidden: bool,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      poll_interval_secs: default_poll_interval_secs(),
      stale_threshold_secs: default_stale_threshold_secs(),
      signal_window_days: default_signal_window_days(),
      include: Vec::new(),
      pause_polling_when_hidden: true,
    }
  }
}

/// Upper bound for every `*_secs` setting (ten years).
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// A `*_secs` setting as a chrono duration, clamped to [`MAX_DURATION_SECS`].
pub fn duration_from_secs(secs: u64) -> chrono::Duration {
  i64::try_from(secs.min(MAX_DURATION_SECS))
    .ok()
    .and_then(chrono::Duration::try_seconds)
    .unwrap_or(chrono::Duration::MAX)
}

fn default_timeout_secs() -> u64 {
  10
}

fn default_true() -> bool {
  true
}

fn default_dashboard_path() -> String {
  "/v1/dashboard".to_string()
}

fn default_signals_path() -> String {
  "/v1/signals".to_string()
}

fn default_dashboard_ttl_secs() -> u64 {
  120
}

fn default_signals_ttl_secs() -> u64 {
  300
}

fn default_poll_interval_secs() -> u64 {
  300
}

fn default_stale_threshold_secs() -> u64 {
  600
}

fn default_signal_window_days() -> u32 {
  30
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./intel-sync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/intel-sync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/intel-sync/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("intel-sync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("intel-sync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml_str(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    if config.analytics.timeout_secs == 0 {
      return Err(eyre!("analytics.timeout_secs must be greater than zero"));
    }
    if config.sync.poll_interval_secs == 0 {
      return Err(eyre!("sync.poll_interval_secs must be greater than zero"));
    }
    for (name, secs) in [
      ("analytics.timeout_secs", config.analytics.timeout_secs),
      ("cache.dashboard_ttl_secs", config.cache.dashboard_ttl_secs),
      ("cache.signals_ttl_secs", config.cache.signals_ttl_secs),
      ("sync.poll_interval_secs", config.sync.poll_interval_secs),
      ("sync.stale_threshold_secs", config.sync.stale_threshold_secs),
    ] {
      if secs > MAX_DURATION_SECS {
        return Err(eyre!(
          "{} must be at most {} seconds, got {}",
          name,
          MAX_DURATION_SECS,
          secs
        ));
      }
    }
    Ok(config)
  }

  /// Get the analytics API key from environment variables.
  ///
  /// Checks INTEL_SYNC_API_KEY first, then ANALYTICS_API_KEY as fallback.
  pub fn get_api_key() -> Result<String> {
    std::env::var("INTEL_SYNC_API_KEY")
      .or_else(|_| std::env::var("ANALYTICS_API_KEY"))
      .map_err(|_| {
        eyre!("Analytics API key not found. Set INTEL_SYNC_API_KEY or ANALYTICS_API_KEY.")
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::from_yaml_str("analytics:\n  url: http://localhost:8000\n").unwrap();

    assert_eq!(config.analytics.timeout(), Duration::from_secs(10));
    assert!(config.analytics.enabled);
    assert_eq!(config.cache.dashboard_ttl_secs, 120);
    assert_eq!(config.cache.signals_ttl_secs, 300);
    assert_eq!(config.sync.poll_interval_secs, 300);
    assert_eq!(config.sync.stale_threshold_secs, 600);
    assert!(config.sync.pause_polling_when_hidden);
    assert!(config.portfolios_file.is_none());
  }

  #[test]
  fn test_overrides() {
    let yaml = r#"
analytics:
  url: https://analytics.internal
  timeout_secs: 3
  enabled: false
cache:
  dashboard_ttl_secs: 60
sync:
  poll_interval_secs: 30
  include: [risk, performance]
portfolios_file: /tmp/portfolios.yaml
"#;
    let config = Config::from_yaml_str(yaml).unwrap();

    assert_eq!(config.analytics.timeout_secs, 3);
    assert!(!config.analytics.enabled);
    assert_eq!(config.cache.dashboard_ttl_secs, 60);
    assert_eq!(config.cache.signals_ttl_secs, 300);
    assert_eq!(config.sync.include, vec!["risk", "performance"]);
    assert_eq!(
      config.portfolios_file.as_deref(),
      Some(Path::new("/tmp/portfolios.yaml"))
    );
  }

  #[test]
  fn test_zero_timeout_rejected() {
    let yaml = "analytics:\n  url: http://x\n  timeout_secs: 0\n";
    assert!(Config::from_yaml_str(yaml).is_err());
  }

  #[test]
  fn test_out_of_range_durations_rejected() {
    let yaml = "analytics:\n  url: http://x\ncache:\n  dashboard_ttl_secs: 18446744073709551615\n";
    let err = Config::from_yaml_str(yaml).unwrap_err();
    assert!(err.to_string().contains("cache.dashboard_ttl_secs"));

    let yaml = "analytics:\n  url: http://x\nsync:\n  stale_threshold_secs: 10000000000000000\n";
    assert!(Config::from_yaml_str(yaml).is_err());
  }

  #[test]
  fn test_duration_from_secs_clamps() {
    assert_eq!(duration_from_secs(120), chrono::Duration::minutes(2));
    assert_eq!(
      duration_from_secs(u64::MAX),
      chrono::Duration::seconds(MAX_DURATION_SECS as i64)
    );
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    let err = Config::load(Some(Path::new("/definitely/not/here.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }
}

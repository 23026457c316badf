use chrono::Utc;
use clap::Parser;
use color_eyre::{
  eyre::{bail, eyre},
  Result,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use intel_sync::analytics::{AggregationGateway, AnalyticsClient, GatewayPolicy, PayloadCache, Portfolio};
use intel_sync::clock;
use intel_sync::config::Config;
use intel_sync::marker::{AcknowledgementMarker, SqliteMarkerStore};
use intel_sync::portfolio::{default_portfolio, PortfolioStore, YamlPortfolioStore};
use intel_sync::sync::{DashboardSource, SignalSource, SyncOptions, SyncSession};
use intel_sync::telemetry;

const TICK: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(name = "intel-sync")]
#[command(about = "Keeps a portfolio's analytics dashboard and signals in sync")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/intel-sync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Portfolio id to watch (default: first active portfolio)
  #[arg(short, long)]
  portfolio: Option<String>,

  /// Log to stderr instead of the log file
  #[arg(long)]
  log_stderr: bool,

  /// Mark notifications as read and exit
  #[arg(long)]
  acknowledge: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = telemetry::init(args.log_stderr)?;

  let marker = SqliteMarkerStore::open()?;
  if args.acknowledge {
    marker.acknowledge(Utc::now())?;
    info!("notifications acknowledged");
    return Ok(());
  }

  let config = Config::load(args.config.as_deref())?;
  if !config.analytics.enabled {
    bail!("Analytics integration is disabled (analytics.enabled = false)");
  }

  let subject = select_portfolio(&config, args.portfolio.as_deref()).await?;
  info!(portfolio = %subject.id, holdings = subject.holdings.len(), "watching portfolio");

  let clock = clock::system();
  let transport = Arc::new(AnalyticsClient::new(&config.analytics)?);
  let cache = Arc::new(PayloadCache::new(clock.clone()));
  let gateway = AggregationGateway::new(transport, cache, GatewayPolicy::from_config(&config));
  let options = SyncOptions::from_config(&config.sync);

  let mut dashboard = SyncSession::new(
    Arc::new(DashboardSource::new(gateway.clone(), config.sync.include.clone())),
    clock.clone(),
    options.clone(),
  );
  let mut signals = SyncSession::new(
    Arc::new(SignalSource::new(gateway, config.sync.signal_window_days)),
    clock.clone(),
    options,
  );

  dashboard.select_subject(subject.clone());
  signals.select_subject(subject);
  futures::join!(dashboard.settle(), signals.settle());
  report("dashboard", &dashboard, &marker);
  report("signals", &signals, &marker);

  let shutdown = tokio::signal::ctrl_c();
  tokio::pin!(shutdown);

  let mut ticker = tokio::time::interval(TICK);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
  let mut last_tick = clock.now();

  loop {
    tokio::select! {
      result = &mut shutdown => {
        if let Err(e) = result {
          warn!(error = %e, "failed to listen for ctrl-c");
        }
        info!("shutting down");
        break;
      }
      changed = dashboard.next_update() => {
        if changed {
          report("dashboard", &dashboard, &marker);
        }
      }
      changed = signals.next_update() => {
        if changed {
          report("signals", &signals, &marker);
        }
      }
      _ = ticker.tick() => {
        let now = clock.now();
        let gap = now - last_tick;
        last_tick = now;

        // The monotonic timer stops while the machine sleeps, wall time does not
        if gap.to_std().is_ok_and(|g| g > TICK * 2) {
          info!(gap_secs = gap.num_seconds(), "resumed after suspension");
          dashboard.set_visible(false);
          signals.set_visible(false);
          dashboard.set_visible(true);
          signals.set_visible(true);
        }

        if dashboard.tick() {
          report("dashboard", &dashboard, &marker);
        }
        if signals.tick() {
          report("signals", &signals, &marker);
        }
      }
    }
  }

  dashboard.teardown();
  signals.teardown();
  Ok(())
}

async fn select_portfolio(config: &Config, requested: Option<&str>) -> Result<Portfolio> {
  let path = config
    .portfolios_file
    .clone()
    .ok_or_else(|| eyre!("portfolios_file is not set in the config"))?;
  let portfolios = YamlPortfolioStore::new(path).list_portfolios().await?;

  let found = match requested {
    Some(id) => portfolios.iter().find(|p| p.id == id),
    None => default_portfolio(&portfolios),
  };

  match (found, requested) {
    (Some(p), _) => Ok(p.clone()),
    (None, Some(id)) => Err(eyre!("Portfolio {} not found", id)),
    (None, None) => Err(eyre!("No portfolios defined")),
  }
}

fn report<T: Send + 'static>(name: &str, session: &SyncSession<T>, marker: &dyn AcknowledgementMarker) {
  let state = session.state();
  let unread = match session.has_unacknowledged_update(marker) {
    Ok(unread) => unread,
    Err(e) => {
      warn!(error = %e, "failed to read acknowledgement marker");
      false
    }
  };

  info!(
    view = name,
    status = ?state.status,
    stale = session.is_stale(),
    last_fetched_at = ?state.last_fetched_at,
    message = state.error_message.as_deref().unwrap_or(""),
    unread,
    "sync state"
  );
}

//! Client synchronization session.
//!
//! Inspired by TanStack Query, a `SyncSession<T>` owns the UI-facing state for
//! one selected subject and keeps it refreshed: on selection, on a fixed poll
//! interval, and when the consuming view becomes visible again after the data
//! went stale.
//!
//! All state changes happen on the owner's event loop. Fetches run on spawned
//! tasks and report back over a channel; the owner applies them with
//! [`SyncSession::poll`] (non-blocking, e.g. on every tick) or
//! [`SyncSession::next_update`] (awaitable, e.g. inside `tokio::select!`).
//!
//! # Example
//!
//! ```ignore
//! let mut session = SyncSession::new(source, clock::system(), SyncOptions::default());
//! session.select_default(&portfolios);
//!
//! loop {
//!   tokio::select! {
//!     _ = session.next_update() => render(session.state()),
//!     _ = ticker.tick() => { session.tick(); }
//!   }
//! }
//! ```

use chrono::{DateTime, Duration, Utc};
use color_eyre::Result;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::source::SyncSource;
use super::state::{SyncState, SyncStatus};
use crate::analytics::Portfolio;
use crate::cache::CacheResult;
use crate::clock::SharedClock;
use crate::config::{duration_from_secs, SyncConfig};
use crate::error::{FailureKind, FetchError};
use crate::marker::AcknowledgementMarker;
use crate::portfolio::default_portfolio;

/// Timing policy for a session.
#[derive(Debug, Clone)]
pub struct SyncOptions {
  pub poll_interval: Duration,
  /// Age after which held data counts as stale regardless of status
  pub stale_threshold: Duration,
  /// Suspend the poll timer while the view is hidden
  pub pause_when_hidden: bool,
}

impl Default for SyncOptions {
  fn default() -> Self {
    Self {
      poll_interval: Duration::minutes(5),
      stale_threshold: Duration::minutes(10),
      pause_when_hidden: true,
    }
  }
}

impl SyncOptions {
  pub fn from_config(config: &SyncConfig) -> Self {
    Self {
      poll_interval: duration_from_secs(config.poll_interval_secs),
      stale_threshold: duration_from_secs(config.stale_threshold_secs),
      pause_when_hidden: config.pause_polling_when_hidden,
    }
  }
}

/// Why a fetch was attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
  Mount,
  Poll,
  Visibility,
  Manual,
}

/// A finished fetch, tagged with the selection it was started for.
struct Completion<T> {
  subject_id: String,
  epoch: u64,
  result: Result<CacheResult<T>, FetchError>,
}

pub struct SyncSession<T> {
  state: SyncState<T>,
  subject: Option<Portfolio>,
  source: Arc<dyn SyncSource<T>>,
  clock: SharedClock,
  options: SyncOptions,
  /// Bumped on every selection; results from older epochs are discarded
  epoch: u64,
  /// Epoch of the fetch currently running, if any
  in_flight: Option<u64>,
  next_poll_at: Option<DateTime<Utc>>,
  visible: bool,
  torn_down: bool,
  sender: mpsc::UnboundedSender<Completion<T>>,
  receiver: mpsc::UnboundedReceiver<Completion<T>>,
}

impl<T: Send + 'static> SyncSession<T> {
  pub fn new(source: Arc<dyn SyncSource<T>>, clock: SharedClock, options: SyncOptions) -> Self {
    let (sender, receiver) = mpsc::unbounded_channel();
    Self {
      state: SyncState::default(),
      subject: None,
      source,
      clock,
      options,
      epoch: 0,
      in_flight: None,
      next_poll_at: None,
      visible: true,
      torn_down: false,
      sender,
      receiver,
    }
  }

  pub fn state(&self) -> &SyncState<T> {
    &self.state
  }

  pub fn data(&self) -> Option<&T> {
    self.state.data.as_ref()
  }

  pub fn status(&self) -> SyncStatus {
    self.state.status
  }

  pub fn subject(&self) -> Option<&Portfolio> {
    self.subject.as_ref()
  }

  /// Whether a fetch for the current selection is running.
  pub fn is_fetching(&self) -> bool {
    self.in_flight == Some(self.epoch)
  }

  pub fn is_visible(&self) -> bool {
    self.visible
  }

  pub fn next_poll_at(&self) -> Option<DateTime<Utc>> {
    self.next_poll_at
  }

  /// Stale by status, or because the last success is older than the threshold.
  pub fn is_stale(&self) -> bool {
    self
      .state
      .is_stale(self.clock.now(), self.options.stale_threshold)
  }

  /// Select a subject, dropping the previous subject's data, and fetch it.
  ///
  /// Selecting the already selected subject only picks up its new holdings.
  /// Returns whether a fetch was started.
  pub fn select_subject(&mut self, subject: Portfolio) -> bool {
    if self.torn_down {
      return false;
    }
    if self.state.selected_subject_id.as_deref() == Some(subject.id.as_str()) {
      self.subject = Some(subject);
      return false;
    }

    info!(subject = %subject.id, "subject selected");
    self.epoch += 1;
    self.state.select(Some(subject.id.clone()));
    self.subject = Some(subject);
    self.next_poll_at = Some(self.clock.now() + self.options.poll_interval);
    self.trigger(Trigger::Mount)
  }

  /// Select the first active portfolio, else the first one.
  pub fn select_default(&mut self, portfolios: &[Portfolio]) -> bool {
    match default_portfolio(portfolios) {
      Some(portfolio) => self.select_subject(portfolio.clone()),
      None => false,
    }
  }

  /// Refresh now. A no-op while a fetch for the subject is running.
  pub fn refresh(&mut self) -> bool {
    self.trigger(Trigger::Manual)
  }

  /// Drive the session from the owner's timer.
  ///
  /// Applies finished fetches and fires the poll when it is due. The poll
  /// cadence is fixed: the next poll is scheduled from when this one was due,
  /// not from when its fetch completes. Returns whether the state changed.
  pub fn tick(&mut self) -> bool {
    let before = self.state.status;
    let mut changed = self.poll();

    let now = self.clock.now();
    let polling = self.visible || !self.options.pause_when_hidden;
    if let Some(due) = self.next_poll_at {
      if polling && now >= due {
        self.next_poll_at = Some(next_due(due, now, self.options.poll_interval));
        self.trigger(Trigger::Poll);
      }
    }

    changed |= self.state.status != before;
    changed
  }

  /// Report the consuming view's visibility.
  ///
  /// Becoming visible with data older than the stale threshold (or no data
  /// at all) triggers one immediate refresh and pushes the next poll a full
  /// interval out. Returns whether a fetch was started.
  pub fn set_visible(&mut self, visible: bool) -> bool {
    if !visible {
      if self.visible {
        debug!("view hidden");
      }
      self.visible = false;
      return false;
    }
    if self.visible {
      return false;
    }

    self.visible = true;
    let now = self.clock.now();
    let overdue = self
      .state
      .age(now)
      .map_or(true, |age| age > self.options.stale_threshold);
    debug!(overdue, "view visible again");

    if overdue && self.trigger(Trigger::Visibility) {
      self.next_poll_at = Some(now + self.options.poll_interval);
      return true;
    }
    false
  }

  /// Apply any finished fetches without waiting.
  ///
  /// Returns `true` if the state changed.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    while let Ok(completion) = self.receiver.try_recv() {
      changed |= self.apply(completion);
    }
    changed
  }

  /// Wait for the next finished fetch and apply it.
  ///
  /// Pends forever while nothing is in flight, which makes it suitable as a
  /// `tokio::select!` branch. Returns `true` if the state changed.
  pub async fn next_update(&mut self) -> bool {
    match self.receiver.recv().await {
      Some(completion) => self.apply(completion),
      None => false,
    }
  }

  /// Wait until no fetch for the current selection is running.
  pub async fn settle(&mut self) {
    while self.is_fetching() {
      match self.receiver.recv().await {
        Some(completion) => {
          self.apply(completion);
        }
        None => break,
      }
    }
  }

  /// Whether data arrived after the user last acknowledged notifications.
  pub fn has_unacknowledged_update(&self, marker: &dyn AcknowledgementMarker) -> Result<bool> {
    let acknowledged_at = marker.last_acknowledged_at()?;
    Ok(self.state.has_unacknowledged_update(acknowledged_at))
  }

  /// Tear the session down: state is dropped and late results are ignored.
  pub fn teardown(&mut self) {
    debug!(subject = ?self.state.selected_subject_id, "session torn down");
    self.torn_down = true;
    self.epoch += 1;
    self.in_flight = None;
    self.subject = None;
    self.next_poll_at = None;
    self.state = SyncState::default();
    self.receiver.close();
  }

  fn trigger(&mut self, reason: Trigger) -> bool {
    if self.torn_down {
      return false;
    }
    let Some(subject) = self.subject.clone() else {
      return false;
    };
    if self.is_fetching() {
      debug!(subject = %subject.id, ?reason, "fetch already in flight, ignoring trigger");
      return false;
    }

    debug!(subject = %subject.id, ?reason, "starting fetch");
    self.state.begin_fetch();
    self.in_flight = Some(self.epoch);

    let epoch = self.epoch;
    let source = Arc::clone(&self.source);
    let sender = self.sender.clone();
    tokio::spawn(async move {
      // A panicking source still has to release the in-flight slot
      let result = AssertUnwindSafe(source.fetch(&subject))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
          let message = panic_message(panic.as_ref());
          warn!(subject = %subject.id, panic = %message, "fetch task panicked");
          Err(FetchError::new(
            FailureKind::ServerError,
            format!("Fetch failed unexpectedly: {}", message),
          ))
        });
      // Ignore send errors - the session may have been torn down
      let _ = sender.send(Completion {
        subject_id: subject.id,
        epoch,
        result,
      });
    });
    true
  }

  fn apply(&mut self, completion: Completion<T>) -> bool {
    if self.in_flight == Some(completion.epoch) {
      self.in_flight = None;
    }

    let current = completion.epoch == self.epoch
      && self.state.selected_subject_id.as_deref() == Some(completion.subject_id.as_str());
    if !current {
      debug!(subject = %completion.subject_id, "discarding result for superseded selection");
      return false;
    }

    let previous = self.state.status;
    match completion.result {
      Ok(result) => {
        let now = self.clock.now();
        self.state.apply_success(result.data, result.stale, now);
      }
      Err(err) => {
        warn!(subject = %completion.subject_id, kind = %err.kind, error = %err, "refresh failed");
        self.state.apply_failure(&err.message);
      }
    }

    if previous != self.state.status {
      info!(
        subject = %completion.subject_id,
        from = ?previous,
        to = ?self.state.status,
        "sync status changed"
      );
    }
    true
  }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
  panic
    .downcast_ref::<&str>()
    .map(|s| s.to_string())
    .or_else(|| panic.downcast_ref::<String>().cloned())
    .unwrap_or_else(|| "unknown panic".to_string())
}

/// First multiple of `interval` after `due` that is later than `now`.
fn next_due(due: DateTime<Utc>, now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
  let interval_ms = interval.num_milliseconds().max(1);
  let missed = (now - due).num_milliseconds().max(0) / interval_ms;
  due + Duration::milliseconds(interval_ms * (missed + 1))
}

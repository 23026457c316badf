//! UI-facing state of a synchronization session.

use chrono::{DateTime, Duration, Utc};

/// Shown while cached data is displayed after a failed refresh.
pub const REFRESH_FAILED_MESSAGE: &str = "refresh failed, showing cached data";

/// Shown when a refresh returned data flagged as outdated.
pub const STALE_DATA_MESSAGE: &str = "showing stale data";

/// Where the session stands for the selected subject
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
  /// No subject, or subject selected but not fetched yet
  Idle,
  /// First fetch for the subject in progress; nothing to show yet
  Loading,
  /// Latest fetch returned fresh data
  Success,
  /// Showing data known to be outdated
  Stale,
  /// Nothing to show: the subject's first fetch failed
  Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncState<T> {
  pub data: Option<T>,
  pub status: SyncStatus,
  pub error_message: Option<String>,
  pub last_fetched_at: Option<DateTime<Utc>>,
  pub selected_subject_id: Option<String>,
}

impl<T> Default for SyncState<T> {
  fn default() -> Self {
    Self {
      data: None,
      status: SyncStatus::Idle,
      error_message: None,
      last_fetched_at: None,
      selected_subject_id: None,
    }
  }
}

impl<T> SyncState<T> {
  /// Forget everything about the previous subject.
  pub(crate) fn select(&mut self, subject_id: Option<String>) {
    *self = Self {
      selected_subject_id: subject_id,
      ..Self::default()
    };
  }

  /// Soft refresh: only show a loading placeholder when there is nothing else
  /// to show.
  pub(crate) fn begin_fetch(&mut self) {
    if self.data.is_none() {
      self.status = SyncStatus::Loading;
    }
  }

  pub(crate) fn apply_success(&mut self, data: T, stale: bool, now: DateTime<Utc>) {
    self.data = Some(data);
    self.last_fetched_at = Some(now);
    if stale {
      self.status = SyncStatus::Stale;
      self.error_message = Some(STALE_DATA_MESSAGE.to_string());
    } else {
      self.status = SyncStatus::Success;
      self.error_message = None;
    }
  }

  /// Failures degrade the status but never erase data already held.
  pub(crate) fn apply_failure(&mut self, message: &str) {
    if self.data.is_some() {
      self.status = SyncStatus::Stale;
      self.error_message = Some(REFRESH_FAILED_MESSAGE.to_string());
    } else {
      self.status = SyncStatus::Error;
      self.error_message = Some(message.to_string());
    }
  }

  /// Time since the last successful fetch.
  pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
    self.last_fetched_at.map(|at| now - at)
  }

  /// Stale by flag, or because the last success is older than `threshold`.
  ///
  /// The clock-based half still fires when polling itself has stalled.
  pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
    self.status == SyncStatus::Stale || self.age(now).is_some_and(|age| age > threshold)
  }

  pub fn is_loading(&self) -> bool {
    self.status == SyncStatus::Loading
  }

  /// Whether data arrived after the user last acknowledged notifications.
  pub fn has_unacknowledged_update(&self, acknowledged_at: Option<DateTime<Utc>>) -> bool {
    match (self.last_fetched_at, acknowledged_at) {
      (Some(fetched), Some(ack)) => fetched > ack,
      (Some(_), None) => true,
      (None, _) => false,
    }
  }
}

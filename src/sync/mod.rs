//! Keeping a selected subject's data current for the UI.

pub mod session;
pub mod source;
pub mod state;

pub use session::{SyncOptions, SyncSession, Trigger};
pub use source::{DashboardSource, SignalSource, SyncSource};
pub use state::{SyncState, SyncStatus, REFRESH_FAILED_MESSAGE, STALE_DATA_MESSAGE};

//! Persisted "notifications acknowledged" marker.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const ACKNOWLEDGED_KEY: &str = "notifications_acknowledged_at";

/// Where the user's last acknowledgement time is kept.
pub trait AcknowledgementMarker: Send + Sync {
  fn last_acknowledged_at(&self) -> Result<Option<DateTime<Utc>>>;

  fn acknowledge(&self, at: DateTime<Utc>) -> Result<()>;
}

/// SQLite-backed marker store.
pub struct SqliteMarkerStore {
  conn: Mutex<Connection>,
}

impl SqliteMarkerStore {
  /// Open or create the marker database at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  pub fn open_at(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create marker directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open marker database at {}: {}", path.display(), e))?;
    Self::from_connection(conn)
  }

  pub fn in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory marker database: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("intel-sync").join("markers.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(MARKER_SCHEMA)
      .map_err(|e| eyre!("Failed to run marker migrations: {}", e))?;

    Ok(())
  }
}

const MARKER_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ui_markers (
    name TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl AcknowledgementMarker for SqliteMarkerStore {
  fn last_acknowledged_at(&self) -> Result<Option<DateTime<Utc>>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let value: Option<String> = conn
      .query_row(
        "SELECT value FROM ui_markers WHERE name = ?",
        params![ACKNOWLEDGED_KEY],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read marker: {}", e))?;

    value
      .map(|v| {
        DateTime::parse_from_rfc3339(&v)
          .map(|dt| dt.with_timezone(&Utc))
          .map_err(|e| eyre!("Invalid marker timestamp {:?}: {}", v, e))
      })
      .transpose()
  }

  fn acknowledge(&self, at: DateTime<Utc>) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO ui_markers (name, value, updated_at) VALUES (?, ?, datetime('now'))",
        params![ACKNOWLEDGED_KEY, at.to_rfc3339()],
      )
      .map_err(|e| eyre!("Failed to store marker: {}", e))?;

    Ok(())
  }
}

//! Durable key/value state storage.
//!
//! Every component persists its state under a fixed key (the key set mirrors
//! the app's historical storage layout, so existing state survives). Access
//! is single-threaded and last-write-wins; there is no transactional
//! grouping across keys.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Persisted key names.
pub mod keys {
  /// Serialized `CacheRecord` of the last network-fetched dataset.
  pub const WISDOM_DATA: &str = "wisdomData";
  /// Version string of the persisted dataset, read by the update checker.
  pub const WISDOM_VERSION: &str = "wisdomVersion";
  /// ISO-8601 timestamp of the last successful network fetch.
  pub const LAST_UPDATE: &str = "lastUpdate";
  /// Lifetime view counter, stored as an integer string.
  pub const WISDOM_COUNT: &str = "wisdomCount";
  /// Serialized favorites ledger.
  pub const WISDOM_FAVORITES: &str = "wisdomFavorites";
  /// Epoch-millis string of the last dismissed update notice.
  pub const LAST_UPDATE_NOTIFICATION: &str = "lastUpdateNotification";
}

/// Storage backend for app state.
///
/// Values are strings; the JSON helpers cover the keys that hold structured
/// records. Implementations must tolerate concurrent handles to the same
/// underlying file (the app itself is single-threaded).
pub trait StateStore: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<String>>;

  fn put(&self, key: &str, value: &str) -> Result<()>;

  fn delete(&self, key: &str) -> Result<()>;

  /// Remove every key. Used by reset and by applying an update.
  fn clear(&self) -> Result<()>;

  /// Read and deserialize a JSON-valued key.
  fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
    match self.get(key)? {
      Some(raw) => {
        let value = serde_json::from_str(&raw)
          .map_err(|e| eyre!("Failed to deserialize key '{}': {}", key, e))?;
        Ok(Some(value))
      }
      None => Ok(None),
    }
  }

  /// Serialize and write a JSON-valued key.
  fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
    let raw =
      serde_json::to_string(value).map_err(|e| eyre!("Failed to serialize key '{}': {}", key, e))?;
    self.put(key, &raw)
  }
}

// Components each hold a handle to the one process-wide store.
impl<S: StateStore> StateStore for std::sync::Arc<S> {
  fn get(&self, key: &str) -> Result<Option<String>> {
    (**self).get(key)
  }

  fn put(&self, key: &str, value: &str) -> Result<()> {
    (**self).put(key, value)
  }

  fn delete(&self, key: &str) -> Result<()> {
    (**self).delete(key)
  }

  fn clear(&self) -> Result<()> {
    (**self).clear()
  }
}

/// SQLite-backed state store.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open or create the store at an explicit path.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create state directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open state store at {}: {}", path.display(), e))?;
    Self::from_conn(conn)
  }

  /// Open a store that lives only for this process. Used as the fallback
  /// when the on-disk store cannot be opened, and by tests.
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory store: {}", e))?;
    Self::from_conn(conn)
  }

  fn from_conn(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(STATE_SCHEMA)
      .map_err(|e| eyre!("Failed to run state store migrations: {}", e))?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }
}

/// Platform data directory for everything the app persists.
pub fn default_data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("sage"))
}

const STATE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS app_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl StateStore for SqliteStore {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT value FROM app_state WHERE key = ?")
      .map_err(|e| eyre!("Failed to prepare read: {}", e))?;

    let value = stmt.query_row(params![key], |row| row.get(0)).ok();
    Ok(value)
  }

  fn put(&self, key: &str, value: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO app_state (key, value, updated_at)
         VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write key '{}': {}", key, e))?;

    Ok(())
  }

  fn delete(&self, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM app_state WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to delete key '{}': {}", key, e))?;

    Ok(())
  }

  fn clear(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM app_state", [])
      .map_err(|e| eyre!("Failed to clear state store: {}", e))?;

    Ok(())
  }
}

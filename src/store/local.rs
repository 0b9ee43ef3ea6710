//! Local fallback store trait and SQLite implementation.

use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

use super::error::StoreError;
use super::traits::{LocalOrder, Record};

/// On-device store holding one table per resource type, keyed by record id.
pub trait LocalStore: Send + Sync + 'static {
  /// All records of a resource in its natural [`LocalOrder`].
  fn get_all<T: Record>(&self) -> Result<Vec<T>, StoreError>;

  /// Insert a record; an existing id is overwritten in place.
  fn put<T: Record>(&self, record: &T) -> Result<(), StoreError>;

  /// Remove a record. Deleting an unknown id is not an error.
  fn delete<T: Record>(&self, id: &str) -> Result<(), StoreError>;
}

/// SQLite-based local store.
pub struct SqliteLocalStore {
  conn: Mutex<Connection>,
}

impl SqliteLocalStore {
  /// Open the store at `path`, or at the default location when `None`.
  pub fn open(path: Option<&Path>) -> Result<Self, StoreError> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| StoreError::local(format!("Failed to create data directory: {}", e)))?;
    }

    let conn = Connection::open(&path).map_err(|e| {
      StoreError::local(format!(
        "Failed to open local database at {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::with_connection(conn)
  }

  /// Open a throwaway store that lives only as long as the value.
  pub fn open_in_memory() -> Result<Self, StoreError> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> Result<Self, StoreError> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf, StoreError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| StoreError::local("Could not determine data directory"))?;

    Ok(data_dir.join("kassi").join("local.db"))
  }

  fn run_migrations(&self) -> Result<(), StoreError> {
    let conn = self.lock()?;
    conn
      .execute_batch(LOCAL_SCHEMA)
      .map_err(|e| StoreError::local(format!("Failed to run local migrations: {}", e)))
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
    self
      .conn
      .lock()
      .map_err(|e| StoreError::local(format!("Lock poisoned: {}", e)))
  }
}

/// Schema for the local record tables.
const LOCAL_SCHEMA: &str = r#"
-- One row per record; `resource` separates the logical tables
CREATE TABLE IF NOT EXISTS records (
    resource TEXT NOT NULL,
    id TEXT NOT NULL,
    data BLOB NOT NULL,
    sort_key INTEGER NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (resource, id)
);

CREATE INDEX IF NOT EXISTS idx_records_sort
    ON records(resource, sort_key);
"#;

impl LocalStore for SqliteLocalStore {
  fn get_all<T: Record>(&self) -> Result<Vec<T>, StoreError> {
    let conn = self.lock()?;

    // rowid survives upserts, so it tracks first insertion
    let sql = match T::local_order() {
      LocalOrder::Insertion => "SELECT id, data FROM records WHERE resource = ? ORDER BY rowid",
      LocalOrder::Timestamp => {
        "SELECT id, data FROM records WHERE resource = ? ORDER BY sort_key, rowid"
      }
    };

    let mut stmt = conn
      .prepare(sql)
      .map_err(|e| StoreError::local(format!("Failed to prepare query: {}", e)))?;

    let rows: Vec<(String, Vec<u8>)> = stmt
      .query_map(params![T::resource()], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
      })?
      .collect::<Result<_, _>>()?;

    let records = rows
      .into_iter()
      .filter_map(|(id, data)| match serde_json::from_slice::<T>(&data) {
        Ok(record) => Some(record),
        Err(e) => {
          warn!(resource = T::resource(), %id, error = %e, "Skipping unreadable local record");
          None
        }
      })
      .collect();

    Ok(records)
  }

  fn put<T: Record>(&self, record: &T) -> Result<(), StoreError> {
    let conn = self.lock()?;
    let data = serde_json::to_vec(record).map_err(|source| StoreError::Decode {
      what: T::resource(),
      source,
    })?;

    conn
      .execute(
        "INSERT INTO records (resource, id, data, sort_key, stored_at)
         VALUES (?, ?, ?, ?, datetime('now'))
         ON CONFLICT(resource, id) DO UPDATE SET
           data = excluded.data,
           sort_key = excluded.sort_key,
           stored_at = excluded.stored_at",
        params![T::resource(), record.record_id(), data, record.timestamp()],
      )
      .map_err(|e| StoreError::local(format!("Failed to store record: {}", e)))?;

    Ok(())
  }

  fn delete<T: Record>(&self, id: &str) -> Result<(), StoreError> {
    let conn = self.lock()?;
    conn
      .execute(
        "DELETE FROM records WHERE resource = ? AND id = ?",
        params![T::resource(), id],
      )
      .map_err(|e| StoreError::local(format!("Failed to delete record: {}", e)))?;
    Ok(())
  }
}

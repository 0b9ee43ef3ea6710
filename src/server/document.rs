//! The server's persisted state: one JSON document, read and rewritten whole.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{error, info};

const DOCUMENT_FILE: &str = "db.json";

/// Stored records stay untyped: bodies are validated when they are posted, and
/// anything already on disk is kept as written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
  #[serde(default)]
  pub files: Vec<Value>,
  #[serde(default)]
  pub messages: Vec<Value>,
  /// Top-level keys other than the two collections
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// Id of a stored record, if it has a string one.
pub fn record_id(record: &Value) -> Option<&str> {
  record.get("id").and_then(Value::as_str)
}

/// JSON file holding both collections.
pub struct DocumentStore {
  path: PathBuf,
  /// Serializes read-modify-write cycles within this process
  write_lock: Mutex<()>,
}

impl DocumentStore {
  /// Open `data_dir/db.json`, creating the directory and an empty document if needed.
  pub async fn open(data_dir: &Path) -> Result<Self> {
    if !data_dir.exists() {
      info!(path = %data_dir.display(), "Creating data directory");
      tokio::fs::create_dir_all(data_dir)
        .await
        .map_err(|e| eyre!("Failed to create data directory {}: {}", data_dir.display(), e))?;
    }

    let store = Self {
      path: data_dir.join(DOCUMENT_FILE),
      write_lock: Mutex::new(()),
    };

    if !store.path.exists() {
      info!(path = %store.path.display(), "Creating document file");
      store.write(&Document::default()).await?;
    }

    Ok(store)
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Current document. Unreadable files are logged and read as empty.
  pub async fn read(&self) -> Document {
    self.load().await.unwrap_or_else(|e| {
      error!(error = %e, "Serving empty document");
      Document::default()
    })
  }

  /// Current document, failing when the file exists but cannot be read or parsed.
  async fn load(&self) -> Result<Document> {
    let contents = match tokio::fs::read_to_string(&self.path).await {
      Ok(contents) => contents,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Document::default()),
      Err(e) => return Err(eyre!("Failed to read document {}: {}", self.path.display(), e)),
    };

    serde_json::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse document {}: {}", self.path.display(), e))
  }

  /// Apply `mutate` to the current document and persist it if it reports a change.
  ///
  /// Returns whether anything was written. A document that cannot be read is
  /// an error and is left untouched on disk.
  pub async fn update<F>(&self, mutate: F) -> Result<bool>
  where
    F: FnOnce(&mut Document) -> bool,
  {
    let _guard = self.write_lock.lock().await;

    let mut document = self.load().await?;
    if !mutate(&mut document) {
      return Ok(false);
    }

    self.write(&document).await?;
    Ok(true)
  }

  async fn write(&self, document: &Document) -> Result<()> {
    let data = serde_json::to_string_pretty(document)
      .map_err(|e| eyre!("Failed to serialize document: {}", e))?;

    tokio::fs::write(&self.path, data)
      .await
      .map_err(|e| eyre!("Failed to write document {}: {}", self.path.display(), e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_open_creates_empty_document() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");

    let store = DocumentStore::open(&data_dir).await.unwrap();

    assert!(store.path().exists());
    let raw = std::fs::read_to_string(store.path()).unwrap();
    assert_eq!(
      serde_json::from_str::<serde_json::Value>(&raw).unwrap(),
      serde_json::json!({"files": [], "messages": []})
    );
  }

  #[tokio::test]
  async fn test_update_persists_changes() {
    let dir = tempfile::tempdir().unwrap();
    let store = DocumentStore::open(dir.path()).await.unwrap();

    let changed = store
      .update(|doc| {
        doc.messages.push(serde_json::json!({"id": "m1", "role": "user", "text": "hi"}));
        true
      })
      .await
      .unwrap();
    assert!(changed);

    let reopened = DocumentStore::open(dir.path()).await.unwrap();
    assert_eq!(reopened.read().await.messages.len(), 1);
  }

  #[tokio::test]
  async fn test_unchanged_update_does_not_write() {
    let dir = tempfile::tempdir().unwrap();
    let store = DocumentStore::open(dir.path()).await.unwrap();
    std::fs::write(store.path(), "{\"files\": [], \"messages\": [], \"custom\": 1}").unwrap();

    let changed = store.update(|_| false).await.unwrap();

    assert!(!changed);
    let raw = std::fs::read_to_string(store.path()).unwrap();
    assert!(raw.contains("custom"));
  }

  #[tokio::test]
  async fn test_corrupt_document_reads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = DocumentStore::open(dir.path()).await.unwrap();
    std::fs::write(store.path(), "{not json").unwrap();

    assert_eq!(store.read().await, Document::default());
  }

  #[tokio::test]
  async fn test_corrupt_document_is_never_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let store = DocumentStore::open(dir.path()).await.unwrap();
    std::fs::write(store.path(), "{not json").unwrap();

    let result = store
      .update(|doc| {
        doc.files.push(serde_json::json!({"id": "a"}));
        true
      })
      .await;

    assert!(result.is_err());
    assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "{not json");
  }

  #[tokio::test]
  async fn test_rewrite_keeps_unknown_fields() {
    let dir = tempfile::tempdir().unwrap();
    let store = DocumentStore::open(dir.path()).await.unwrap();
    std::fs::write(
      store.path(),
      r#"{"files": [{"id": "a", "tags": ["x"]}], "messages": [], "version": 2}"#,
    )
    .unwrap();

    store
      .update(|doc| {
        doc.messages.push(serde_json::json!({"id": "m1"}));
        true
      })
      .await
      .unwrap();

    let raw: Value = serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
    assert_eq!(raw["files"][0]["tags"], serde_json::json!(["x"]));
    assert_eq!(raw["version"], 2);
    assert_eq!(record_id(&raw["messages"][0]), Some("m1"));
  }
}

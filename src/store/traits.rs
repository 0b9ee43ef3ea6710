//! Core traits and types for the dual-store data layer.

use serde::{de::DeserializeOwned, Serialize};

/// Which store an add writes to first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
  /// Try the remote store; only on failure write locally.
  RemoteFirst,
  /// Write locally, then push to the remote store in the background.
  FallbackFirst,
}

/// Natural order of a resource in the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalOrder {
  /// Order records were first written
  Insertion,
  /// Ascending [`Record::timestamp`], ties broken by insertion
  Timestamp,
}

/// Trait for entities persisted through [`super::DataAccess`].
///
/// Implementors describe where their collection lives on the remote store,
/// which local table holds them and which write policy applies.
pub trait Record: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Unique identifier within the resource type
  fn record_id(&self) -> &str;

  /// Creation time in milliseconds since the epoch
  fn timestamp(&self) -> i64;

  /// Remote collection path (e.g. "/files")
  fn collection() -> &'static str;

  /// Local table name (e.g. "file")
  fn resource() -> &'static str;

  fn write_policy() -> WritePolicy;

  fn local_order() -> LocalOrder;

  /// Path of a single record on the remote store, with the id percent-encoded
  /// as one path segment.
  fn item_path(id: &str) -> String {
    let segment: String = url::form_urlencoded::byte_serialize(id.as_bytes()).collect();
    format!("{}/{}", Self::collection(), segment.replace('+', "%20"))
  }
}

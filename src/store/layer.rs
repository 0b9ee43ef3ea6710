//! Data access facade that orchestrates the remote and local stores.

use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::records::{FileRecord, MessageRecord};

use super::connectivity::{ConnectionStatus, ConnectivityTracker};
use super::error::StoreError;
use super::local::LocalStore;
use super::remote::{RemoteStore, RequestOptions};
use super::traits::{Record, WritePolicy};

/// Health endpoint used by [`DataAccess::probe`].
pub const HEALTH_PATH: &str = "/api/health";

/// Data access facade over a remote canonical store and a local fallback.
///
/// Every operation tries the remote store first and falls back to the local
/// store when the remote request fails, except adds of
/// [`WritePolicy::FallbackFirst`] records, which go local first and are pushed
/// to the remote store in the background. No operation returns an error: the
/// only visible trace of a failure is [`DataAccess::connection_status`].
///
/// Known limitations, kept on purpose:
/// - a successful remote delete leaves any local copy in place
/// - records that landed only in the local store are never pushed later
pub struct DataAccess<R: RemoteStore, L: LocalStore> {
  remote: Arc<R>,
  local: Arc<L>,
  connectivity: ConnectivityTracker,
}

impl<R: RemoteStore, L: LocalStore> DataAccess<R, L> {
  pub fn new(remote: R, local: L) -> Self {
    Self {
      remote: Arc::new(remote),
      local: Arc::new(local),
      connectivity: ConnectivityTracker::new(),
    }
  }

  /// Status after the most recently completed remote request.
  pub fn connection_status(&self) -> ConnectionStatus {
    self.connectivity.status()
  }

  /// A shared handle on the connectivity flag, for status displays.
  pub fn connectivity(&self) -> ConnectivityTracker {
    self.connectivity.clone()
  }

  /// Ping the remote health endpoint and report the resulting status.
  pub async fn probe(&self) -> ConnectionStatus {
    let _ = self.try_remote(HEALTH_PATH, RequestOptions::get()).await;
    self.connection_status()
  }

  // --- generic operations ---

  /// All records of a resource: the remote collection verbatim when reachable,
  /// otherwise the whole local table.
  pub async fn list<T: Record>(&self) -> Vec<T> {
    let remote = async {
      match self.try_remote(T::collection(), RequestOptions::get()).await? {
        Some(body) => serde_json::from_value(body).map_err(|source| StoreError::Decode {
          what: T::resource(),
          source,
        }),
        None => Ok(Vec::new()),
      }
    };

    self
      .attempt_then_fallback("list", remote, |local| local.get_all::<T>())
      .await
  }

  /// Add a record according to its [`WritePolicy`].
  pub async fn add<T: Record>(&self, record: T) -> BackgroundSync {
    match T::write_policy() {
      WritePolicy::RemoteFirst => {
        self.add_remote_first(&record).await;
        BackgroundSync::none()
      }
      WritePolicy::FallbackFirst => self.add_fallback_first(record),
    }
  }

  /// Delete remotely, or locally when the remote store is unreachable.
  pub async fn delete<T: Record>(&self, id: &str) {
    let path = T::item_path(id);
    let remote = async {
      self
        .try_remote(&path, RequestOptions::delete())
        .await
        .map(|_| ())
    };

    self
      .attempt_then_fallback("delete", remote, |local| local.delete::<T>(id))
      .await
  }

  async fn add_remote_first<T: Record>(&self, record: &T) {
    let remote = async {
      let body = to_body(record)?;
      self
        .try_remote(T::collection(), RequestOptions::post(body))
        .await
        .map(|_| ())
    };

    self
      .attempt_then_fallback("add", remote, |local| {
        error!(
          resource = T::resource(),
          id = record.record_id(),
          "Remote store unreachable, saving locally only"
        );
        local.put(record)
      })
      .await
  }

  fn add_fallback_first<T: Record>(&self, record: T) -> BackgroundSync {
    self.local_or_default("add", self.local.put(&record));

    let remote = Arc::clone(&self.remote);
    let connectivity = self.connectivity.clone();
    let handle = tokio::spawn(async move {
      let outcome = match to_body(&record) {
        Ok(body) => {
          remote_attempt(
            remote.as_ref(),
            &connectivity,
            T::collection(),
            RequestOptions::post(body),
          )
          .await
        }
        Err(e) => Err(e),
      };

      if let Err(e) = outcome {
        debug!(
          resource = T::resource(),
          id = record.record_id(),
          error = %e,
          "Record kept in local store only"
        );
      }
    });

    BackgroundSync {
      handle: Some(handle),
    }
  }

  // --- combinators ---

  async fn try_remote(&self, path: &str, options: RequestOptions) -> Result<Option<Value>, StoreError> {
    remote_attempt(self.remote.as_ref(), &self.connectivity, path, options).await
  }

  /// Run the remote step; if it fails, run `fallback` against the local store.
  async fn attempt_then_fallback<T, Fut, F>(&self, operation: &'static str, remote: Fut, fallback: F) -> T
  where
    T: Default,
    Fut: Future<Output = Result<T, StoreError>>,
    F: FnOnce(&L) -> Result<T, StoreError>,
  {
    match remote.await {
      Ok(value) => value,
      Err(e) => {
        debug!(operation, error = %e, "Falling back to local store");
        self.local_or_default(operation, fallback(self.local.as_ref()))
      }
    }
  }

  /// Local failures are logged and degrade to an empty result.
  fn local_or_default<T: Default>(&self, operation: &'static str, result: Result<T, StoreError>) -> T {
    result.unwrap_or_else(|e| {
      error!(operation, error = %e, "Local store operation failed");
      T::default()
    })
  }
}

// Named operations for the two resource types.
impl<R: RemoteStore, L: LocalStore> DataAccess<R, L> {
  pub async fn get_all_files(&self) -> Vec<FileRecord> {
    self.list().await
  }

  pub async fn add_file(&self, file: FileRecord) {
    self.add(file).await;
  }

  pub async fn delete_file(&self, id: &str) {
    self.delete::<FileRecord>(id).await
  }

  pub async fn get_all_messages(&self) -> Vec<MessageRecord> {
    self.list().await
  }

  /// Returns as soon as the message is stored locally; the remote push keeps
  /// running behind the returned handle.
  pub async fn add_message(&self, message: MessageRecord) -> BackgroundSync {
    self.add(message).await
  }
}

impl<R: RemoteStore, L: LocalStore> Clone for DataAccess<R, L> {
  fn clone(&self) -> Self {
    Self {
      remote: Arc::clone(&self.remote),
      local: Arc::clone(&self.local),
      connectivity: self.connectivity.clone(),
    }
  }
}

/// Handle to a background remote write.
///
/// Dropping it detaches the write; awaiting [`BackgroundSync::settled`] waits
/// for it to finish. Either way the outcome is never reported as an error.
#[derive(Debug)]
pub struct BackgroundSync {
  handle: Option<JoinHandle<()>>,
}

impl BackgroundSync {
  fn none() -> Self {
    Self { handle: None }
  }

  pub async fn settled(self) {
    if let Some(handle) = self.handle {
      if let Err(e) = handle.await {
        warn!(error = %e, "Background sync task did not complete");
      }
    }
  }
}

/// One remote request, recorded on the connectivity tracker.
async fn remote_attempt<R: RemoteStore>(
  remote: &R,
  connectivity: &ConnectivityTracker,
  path: &str,
  options: RequestOptions,
) -> Result<Option<Value>, StoreError> {
  match remote.request(path, options).await {
    Ok(body) => {
      connectivity.record_success();
      Ok(body)
    }
    Err(e) => {
      warn!(path, error = %e, "Remote store request failed");
      connectivity.record_failure();
      Err(e)
    }
  }
}

fn to_body<T: Record>(record: &T) -> Result<Value, StoreError> {
  serde_json::to_value(record).map_err(|source| StoreError::Decode {
    what: T::resource(),
    source,
  })
}

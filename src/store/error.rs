use thiserror::Error;

/// Failures inside the data-access layer.
///
/// None of these reach callers of [`super::DataAccess`]; they are absorbed and
/// logged there.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("remote store unavailable at {path}: {reason}")]
  RemoteUnavailable { path: String, reason: String },

  #[error("local store failure: {0}")]
  LocalStoreFailure(String),

  #[error("malformed record: {0}")]
  MalformedRecord(String),

  #[error("failed to decode {what}: {source}")]
  Decode {
    what: &'static str,
    #[source]
    source: serde_json::Error,
  },
}

impl StoreError {
  pub fn remote(path: &str, reason: impl ToString) -> Self {
    Self::RemoteUnavailable {
      path: path.to_string(),
      reason: reason.to_string(),
    }
  }

  pub fn local(reason: impl ToString) -> Self {
    Self::LocalStoreFailure(reason.to_string())
  }
}

impl From<rusqlite::Error> for StoreError {
  fn from(e: rusqlite::Error) -> Self {
    Self::local(e)
  }
}

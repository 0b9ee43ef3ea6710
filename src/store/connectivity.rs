use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Where the data layer believes it is being served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
  Cloud,
  Local,
}

impl fmt::Display for ConnectionStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ConnectionStatus::Cloud => write!(f, "cloud"),
      ConnectionStatus::Local => write!(f, "local"),
    }
  }
}

/// Outcome of the most recently completed remote request.
///
/// Clones share the same flag, so a UI can hold one and read it at any time.
/// The value is a hint: concurrent requests overwrite each other in
/// completion order.
#[derive(Debug, Clone, Default)]
pub struct ConnectivityTracker {
  offline: Arc<AtomicBool>,
}

impl ConnectivityTracker {
  /// Starts out assuming the remote store is reachable.
  pub fn new() -> Self {
    Self::default()
  }

  pub fn record_success(&self) {
    self.offline.store(false, Ordering::Relaxed);
  }

  pub fn record_failure(&self) {
    self.offline.store(true, Ordering::Relaxed);
  }

  pub fn status(&self) -> ConnectionStatus {
    if self.offline.load(Ordering::Relaxed) {
      ConnectionStatus::Local
    } else {
      ConnectionStatus::Cloud
    }
  }
}

//! Cloud-first data layer with an on-device fallback.
//!
//! This module provides the resilient data access used by every client command:
//! - Reads and writes try the remote kassi server first
//! - On failure they fall back to a local SQLite store, without surfacing errors
//! - Messages are written locally first and pushed to the server in the background
//! - A shared connectivity flag records whether the last request reached the server

mod connectivity;
mod error;
mod layer;
mod local;
pub mod remote;
mod resources;
mod traits;

pub use connectivity::{ConnectionStatus, ConnectivityTracker};
pub use error::StoreError;
pub use layer::{BackgroundSync, DataAccess, HEALTH_PATH};
pub use local::{LocalStore, SqliteLocalStore};
pub use remote::{HttpRemoteStore, RemoteStore, RequestOptions};
pub use traits::{LocalOrder, Record, WritePolicy};

/// Facade wired to the real HTTP server and SQLite store.
pub type AppDataAccess = DataAccess<HttpRemoteStore, SqliteLocalStore>;

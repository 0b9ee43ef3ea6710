//! The kassi HTTP server: the remote canonical store clients talk to.

mod document;
mod routes;

use axum::{
  extract::DefaultBodyLimit,
  routing::{delete, get},
  Router,
};
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tower_http::{
  cors::CorsLayer,
  services::{ServeDir, ServeFile},
  trace::TraceLayer,
};
use tracing::info;

use crate::config::ServerConfig;
use crate::store::HEALTH_PATH;

pub use document::DocumentStore;

#[derive(Clone)]
pub struct ServerState {
  pub documents: Arc<DocumentStore>,
}

impl ServerState {
  pub fn new(documents: DocumentStore) -> Self {
    Self {
      documents: Arc::new(documents),
    }
  }
}

/// Build the API router, serving the built frontend for any other path when
/// `static_dir` exists.
pub fn router(state: ServerState, config: &ServerConfig) -> Router {
  let api = Router::new()
    .route(HEALTH_PATH, get(routes::health))
    .route("/files", get(routes::list_files).post(routes::add_file))
    .route("/files/{id}", delete(routes::delete_file))
    .route("/messages", get(routes::list_messages).post(routes::add_message))
    .with_state(state);

  let app = if config.static_dir.is_dir() {
    let index = config.static_dir.join("index.html");
    api.fallback_service(ServeDir::new(&config.static_dir).fallback(ServeFile::new(index)))
  } else {
    api
  };

  app
    .layer(DefaultBodyLimit::max(config.body_limit_mb * 1024 * 1024))
    .layer(CorsLayer::permissive())
    .layer(TraceLayer::new_for_http())
}

/// Run the server until Ctrl-C.
pub async fn serve(config: &ServerConfig) -> Result<()> {
  let documents = DocumentStore::open(&config.data_dir).await?;
  info!(path = %documents.path().display(), "Document store ready");

  let app = router(ServerState::new(documents), config);

  let addr = format!("{}:{}", config.host, config.port);
  let listener = TcpListener::bind(&addr)
    .await
    .map_err(|e| eyre!("Failed to bind {}: {}", addr, e))?;
  info!("HTTP server listening on {}", addr);

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| eyre!("Server error: {}", e))?;

  info!("Server has shut down gracefully.");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = signal::ctrl_c().await {
    tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
    std::future::pending::<()>().await;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
  };
  use tower::ServiceExt;

  #[tokio::test]
  async fn test_unknown_paths_serve_frontend_index() {
    let dir = tempfile::tempdir().unwrap();
    let dist = dir.path().join("dist");
    std::fs::create_dir_all(&dist).unwrap();
    std::fs::write(dist.join("index.html"), "<html>kassi</html>").unwrap();

    let config = ServerConfig {
      static_dir: dist,
      ..ServerConfig::default()
    };
    let documents = DocumentStore::open(&dir.path().join("data")).await.unwrap();
    let app = router(ServerState::new(documents), &config);

    let resp = app
      .oneshot(
        Request::builder()
          .uri("/chat/some/route")
          .body(Body::empty())
          .expect("failed to build request"),
      )
      .await
      .expect("request failed");

    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"<html>kassi</html>");
  }

  #[tokio::test]
  async fn test_data_layer_against_live_server() {
    use crate::config::RemoteConfig;
    use crate::records::{FileRecord, MessageRecord};
    use crate::store::{ConnectionStatus, DataAccess, HttpRemoteStore, SqliteLocalStore};

    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig {
      static_dir: dir.path().join("no-frontend"),
      ..ServerConfig::default()
    };
    let documents = DocumentStore::open(&dir.path().join("data")).await.unwrap();
    let app = router(ServerState::new(documents), &config);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
      axum::serve(listener, app)
        .with_graceful_shutdown(async {
          let _ = stop_rx.await;
        })
        .await
        .unwrap();
    });

    let remote = HttpRemoteStore::new(&RemoteConfig {
      url: format!("http://{}", addr),
      timeout_secs: Some(5),
    })
    .unwrap();
    let data = DataAccess::new(remote, SqliteLocalStore::open_in_memory().unwrap());

    let mut shared = FileRecord::new("casos.csv", "health", "municipio;casos");
    shared.id = "shared".to_string();
    data.add_file(shared.clone()).await;
    data.add_file(shared).await;
    data.add_message(MessageRecord::user("hello")).await.settled().await;

    assert_eq!(data.get_all_files().await.len(), 1);
    assert_eq!(data.get_all_messages().await.len(), 1);
    assert_eq!(data.connection_status(), ConnectionStatus::Cloud);

    let mut awkward = FileRecord::new("dez.csv", "health", "x");
    awkward.id = "2023/12 casos?#%".to_string();
    data.add_file(awkward.clone()).await;
    assert_eq!(data.get_all_files().await.len(), 2);
    data.delete_file(&awkward.id).await;
    assert_eq!(data.connection_status(), ConnectionStatus::Cloud);
    let files = data.get_all_files().await;
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].id, "shared");

    stop_tx.send(()).unwrap();
    server.await.unwrap();

    let mut offline = FileRecord::new("local.csv", "health", "x");
    offline.id = "offline".to_string();
    data.add_file(offline).await;

    let files = data.get_all_files().await;
    assert_eq!(data.connection_status(), ConnectionStatus::Local);
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].id, "offline");
    assert_eq!(data.probe().await, ConnectionStatus::Local);
  }
}

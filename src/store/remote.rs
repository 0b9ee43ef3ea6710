//! Remote store client: one request, one outcome, no retries.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::time::Duration;

use crate::config::RemoteConfig;

use super::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Post,
  Delete,
}

impl From<Method> for reqwest::Method {
  fn from(method: Method) -> Self {
    match method {
      Method::Get => reqwest::Method::GET,
      Method::Post => reqwest::Method::POST,
      Method::Delete => reqwest::Method::DELETE,
    }
  }
}

/// Method and optional JSON body of a remote request.
#[derive(Debug, Clone)]
pub struct RequestOptions {
  pub method: Method,
  pub body: Option<Value>,
}

impl RequestOptions {
  pub fn get() -> Self {
    Self {
      method: Method::Get,
      body: None,
    }
  }

  pub fn post(body: Value) -> Self {
    Self {
      method: Method::Post,
      body: Some(body),
    }
  }

  pub fn delete() -> Self {
    Self {
      method: Method::Delete,
      body: None,
    }
  }
}

/// The canonical store reachable over the network.
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
  /// Issue a single request against `path`.
  ///
  /// Returns the parsed body when the response is JSON, `None` when it has no
  /// JSON body, and [`StoreError::RemoteUnavailable`] on transport failure or a
  /// non-success status.
  async fn request(&self, path: &str, options: RequestOptions) -> Result<Option<Value>, StoreError>;
}

/// [`RemoteStore`] backed by the kassi HTTP server.
#[derive(Clone)]
pub struct HttpRemoteStore {
  client: reqwest::Client,
  base_url: String,
}

impl HttpRemoteStore {
  pub fn new(config: &RemoteConfig) -> Result<Self> {
    url::Url::parse(&config.url)
      .map_err(|e| eyre!("Invalid remote url {}: {}", config.url, e))?;

    let mut builder = reqwest::Client::builder();
    if let Some(secs) = config.timeout_secs {
      builder = builder.timeout(Duration::from_secs(secs));
    }
    let client = builder
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base_url: config.url.trim_end_matches('/').to_string(),
    })
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
  async fn request(&self, path: &str, options: RequestOptions) -> Result<Option<Value>, StoreError> {
    let url = format!("{}{}", self.base_url, path);

    let mut request = self.client.request(options.method.into(), &url);
    if let Some(body) = &options.body {
      request = request.json(body);
    }

    let response = request
      .send()
      .await
      .map_err(|e| StoreError::remote(path, e))?;

    let status = response.status();
    if !status.is_success() {
      return Err(StoreError::remote(path, format!("Server returned {}", status)));
    }

    let is_json = response
      .headers()
      .get(CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .is_some_and(|ct| ct.contains("application/json"));

    if !is_json {
      return Ok(None);
    }

    let body = response
      .json::<Value>()
      .await
      .map_err(|e| StoreError::remote(path, e))?;

    Ok(Some(body))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use axum::{http::StatusCode, routing::get, Json, Router};
  use serde_json::json;

  async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
  }

  fn client(url: String) -> HttpRemoteStore {
    HttpRemoteStore::new(&RemoteConfig {
      url,
      timeout_secs: Some(5),
    })
    .unwrap()
  }

  #[tokio::test]
  async fn test_json_body_is_parsed() {
    let url = spawn_server(Router::new().route("/files", get(|| async { Json(json!([{"id": "a"}])) }))).await;

    let body = client(url).request("/files", RequestOptions::get()).await.unwrap();
    assert_eq!(body, Some(json!([{"id": "a"}])));
  }

  #[tokio::test]
  async fn test_non_json_body_is_none() {
    let url = spawn_server(Router::new().route("/plain", get(|| async { "ok" }))).await;

    let body = client(url).request("/plain", RequestOptions::get()).await.unwrap();
    assert_eq!(body, None);
  }

  #[tokio::test]
  async fn test_error_status_is_unavailable() {
    let url = spawn_server(Router::new().route(
      "/files",
      get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "boom"}))) }),
    ))
    .await;

    let err = client(url).request("/files", RequestOptions::get()).await.unwrap_err();
    assert!(matches!(err, StoreError::RemoteUnavailable { ref path, .. } if path == "/files"));
  }

  #[tokio::test]
  async fn test_connection_refused_is_unavailable() {
    // Bind then drop to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(format!("http://{}", addr))
      .request("/files", RequestOptions::get())
      .await
      .unwrap_err();
    assert!(matches!(err, StoreError::RemoteUnavailable { .. }));
  }

  #[test]
  fn test_invalid_url_rejected() {
    let result = HttpRemoteStore::new(&RemoteConfig {
      url: "not a url".to_string(),
      timeout_secs: None,
    });
    assert!(result.is_err());
  }

  #[test]
  fn test_trailing_slash_trimmed() {
    let store = client("http://localhost:3001/".to_string());
    assert_eq!(store.base_url(), "http://localhost:3001");
  }
}

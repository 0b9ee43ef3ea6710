use axum::{
  extract::{rejection::JsonRejection, Path, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::records::{FileRecord, MessageRecord};
use crate::store::{Record, StoreError};

use super::document::{record_id, Document};
use super::ServerState;

/// Errors returned by route handlers
#[derive(Debug)]
pub enum ApiError {
  /// Missing id or unparseable body
  InvalidData(StoreError),
  /// The document could not be written
  Persist(color_eyre::Report),
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    match self {
      ApiError::InvalidData(e) => {
        debug!(error = %e, "Rejected record");
        (StatusCode::BAD_REQUEST, Json(json!({"error": "Invalid data"}))).into_response()
      }
      ApiError::Persist(e) => {
        error!(error = %e, "Failed to persist document");
        (
          StatusCode::INTERNAL_SERVER_ERROR,
          Json(json!({"error": "Failed to persist data"})),
        )
          .into_response()
      }
    }
  }
}

pub async fn health(State(state): State<ServerState>) -> Json<Value> {
  Json(json!({
    "status": "online",
    "dbPath": state.documents.path().display().to_string(),
  }))
}

pub async fn list_files(State(state): State<ServerState>) -> Json<Vec<Value>> {
  Json(state.documents.read().await.files)
}

pub async fn add_file(
  State(state): State<ServerState>,
  payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
  let (body, file) = validated::<FileRecord>(payload)?;

  let stored = insert_unique(&state, body.clone(), |doc| &mut doc.files).await?;
  if stored {
    info!(name = %file.name, category = %file.category, "File saved");
  }

  Ok((StatusCode::CREATED, Json(body)))
}

pub async fn delete_file(
  State(state): State<ServerState>,
  Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
  state
    .documents
    .update(|doc| {
      doc.files.retain(|f| record_id(f) != Some(id.as_str()));
      true
    })
    .await
    .map_err(ApiError::Persist)?;

  info!(%id, "File deleted");
  Ok(Json(json!({"success": true})))
}

pub async fn list_messages(State(state): State<ServerState>) -> Json<Vec<Value>> {
  Json(state.documents.read().await.messages)
}

pub async fn add_message(
  State(state): State<ServerState>,
  payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
  let (body, _) = validated::<MessageRecord>(payload)?;
  insert_unique(&state, body.clone(), |doc| &mut doc.messages).await?;
  Ok((StatusCode::CREATED, Json(body)))
}

/// Check a posted body against `T`, returning it unchanged along with its typed form.
fn validated<T: Record>(payload: Result<Json<Value>, JsonRejection>) -> Result<(Value, T), ApiError> {
  let malformed = |reason: String| ApiError::InvalidData(StoreError::MalformedRecord(reason));

  let Json(body) = payload.map_err(|e| malformed(e.body_text()))?;
  let record: T = serde_json::from_value(body.clone())
    .map_err(|e| malformed(format!("{}: {}", T::resource(), e)))?;
  if record.record_id().is_empty() {
    return Err(malformed(format!("{} without id", T::resource())));
  }
  Ok((body, record))
}

/// Append `record` unless its id is already stored. Returns whether it was added.
async fn insert_unique<F>(state: &ServerState, record: Value, collection: F) -> Result<bool, ApiError>
where
  F: FnOnce(&mut Document) -> &mut Vec<Value>,
{
  state
    .documents
    .update(|doc| {
      let id = record_id(&record);
      let items = collection(doc);
      if items.iter().any(|r| record_id(r) == id) {
        return false;
      }
      items.push(record);
      true
    })
    .await
    .map_err(ApiError::Persist)
}

#[cfg(test)]
mod tests {
  use super::super::{router, DocumentStore, ServerState};
  use crate::config::ServerConfig;
  use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
  };
  use serde_json::{json, Value};
  use tower::ServiceExt;

  async fn app(dir: &tempfile::TempDir) -> Router {
    let documents = DocumentStore::open(dir.path()).await.unwrap();
    let config = ServerConfig {
      static_dir: dir.path().join("no-frontend"),
      ..ServerConfig::default()
    };
    router(ServerState::new(documents), &config)
  }

  async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
      Some(v) => {
        builder = builder.header("content-type", "application/json");
        Body::from(v.to_string())
      }
      None => Body::empty(),
    };

    let resp = app
      .clone()
      .oneshot(builder.body(body).expect("failed to build request"))
      .await
      .expect("request failed");

    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
  }

  fn file_body(id: &str) -> Value {
    json!({"id": id, "name": "casos.csv", "category": "health", "content": "a;b", "timestamp": 1})
  }

  #[tokio::test]
  async fn test_health() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir).await;

    let (status, body) = send(&app, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "online");
    assert!(body["dbPath"].as_str().unwrap().ends_with("db.json"));
  }

  #[tokio::test]
  async fn test_add_file_rejects_missing_id() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir).await;

    let (status, body) = send(
      &app,
      "POST",
      "/files",
      Some(json!({"name": "x", "category": "c", "content": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid data");

    let (status, _) = send(&app, "POST", "/files", Some(json!("garbage"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, files) = send(&app, "GET", "/files", None).await;
    assert_eq!(files, json!([]));
  }

  #[tokio::test]
  async fn test_add_file_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir).await;

    let (status, body) = send(&app, "POST", "/files", Some(file_body("a"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["id"], "a");
    let (status, _) = send(&app, "POST", "/files", Some(file_body("a"))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, files) = send(&app, "GET", "/files", None).await;
    assert_eq!(files.as_array().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_delete_file() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir).await;
    send(&app, "POST", "/files", Some(file_body("a"))).await;
    send(&app, "POST", "/files", Some(file_body("b"))).await;

    let (status, body) = send(&app, "DELETE", "/files/a", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));

    let (_, files) = send(&app, "GET", "/files", None).await;
    assert_eq!(files[0]["id"], "b");
    assert_eq!(files.as_array().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_messages_round_trip_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir).await;

    for (id, text) in [("m1", "hello"), ("m2", "world")] {
      let (status, _) = send(
        &app,
        "POST",
        "/messages",
        Some(json!({"id": id, "role": "user", "text": text, "timestamp": 1})),
      )
      .await;
      assert_eq!(status, StatusCode::CREATED);
    }

    let (_, messages) = send(&app, "GET", "/messages", None).await;
    assert_eq!(messages[0]["text"], "hello");
    assert_eq!(messages[1]["text"], "world");
  }

  #[tokio::test]
  async fn test_add_keeps_records_that_do_not_fit_the_types() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
      dir.path().join("db.json"),
      json!({
        "files": [
          {"id": "a", "name": "casos.csv", "category": "health", "content": "", "timestamp": 1},
          {"id": "legacy", "name": "old.csv", "content": "", "timestamp": "2023-01-01"}
        ],
        "messages": [{"id": "m1", "role": "system", "text": "hi", "timestamp": 1}]
      })
      .to_string(),
    )
    .unwrap();
    let app = app(&dir).await;

    let (status, _) = send(&app, "POST", "/files", Some(file_body("b"))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, files) = send(&app, "GET", "/files", None).await;
    let ids: Vec<&str> = files
      .as_array()
      .unwrap()
      .iter()
      .map(|f| f["id"].as_str().unwrap())
      .collect();
    assert_eq!(ids, ["a", "legacy", "b"]);
    assert_eq!(files[1]["timestamp"], "2023-01-01");

    let (_, messages) = send(&app, "GET", "/messages", None).await;
    assert_eq!(messages[0]["role"], "system");
  }

  #[tokio::test]
  async fn test_add_fails_without_overwriting_unreadable_document() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir).await;
    std::fs::write(dir.path().join("db.json"), "{\"files\": [").unwrap();

    let (status, _) = send(&app, "POST", "/files", Some(file_body("b"))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
      std::fs::read_to_string(dir.path().join("db.json")).unwrap(),
      "{\"files\": ["
    );
  }

  #[tokio::test]
  async fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    send(&app(&dir).await, "POST", "/files", Some(file_body("a"))).await;

    let (_, files) = send(&app(&dir).await, "GET", "/files", None).await;
    assert_eq!(files[0]["id"], "a");
  }
}

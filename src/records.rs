use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Milliseconds since the Unix epoch, the timestamp unit used on the wire.
pub fn now_millis() -> i64 {
  Utc::now().timestamp_millis()
}

fn new_id() -> String {
  Uuid::new_v4().to_string()
}

/// An uploaded knowledge file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
  #[serde(default)]
  pub id: String,
  pub name: String,
  pub category: String,
  pub content: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub period: Option<String>,
  /// Indicator the file measures (e.g. "dengue cases")
  #[serde(
    default,
    rename = "caseName",
    alias = "indicator",
    skip_serializing_if = "Option::is_none"
  )]
  pub indicator: Option<String>,
  #[serde(default)]
  pub timestamp: i64,
}

impl FileRecord {
  pub fn new(name: impl Into<String>, category: impl Into<String>, content: impl Into<String>) -> Self {
    Self {
      id: new_id(),
      name: name.into(),
      category: category.into(),
      content: content.into(),
      description: None,
      source: None,
      period: None,
      indicator: None,
      timestamp: now_millis(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  User,
  Model,
}

impl Role {
  pub fn as_str(&self) -> &'static str {
    match self {
      Role::User => "user",
      Role::Model => "model",
    }
  }
}

/// A single chat turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
  #[serde(default)]
  pub id: String,
  pub role: Role,
  pub text: String,
  #[serde(default)]
  pub timestamp: i64,
  /// Set while a model reply is still being generated
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub is_loading: Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub chart_data: Option<ChartData>,
}

impl MessageRecord {
  pub fn user(text: impl Into<String>) -> Self {
    Self {
      id: new_id(),
      role: Role::User,
      text: text.into(),
      timestamp: now_millis(),
      is_loading: None,
      chart_data: None,
    }
  }

  /// Placeholder for a model reply that has not arrived yet.
  pub fn pending_model() -> Self {
    Self {
      id: new_id(),
      role: Role::Model,
      text: String::new(),
      timestamp: now_millis(),
      is_loading: Some(true),
      chart_data: None,
    }
  }

  pub fn is_pending(&self) -> bool {
    self.is_loading.unwrap_or(false)
  }

  /// Turn a pending placeholder into the final reply.
  pub fn finish(mut self, text: impl Into<String>, chart: Option<ChartData>) -> Self {
    self.text = text.into();
    self.chart_data = chart;
    self.is_loading = None;
    self
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
  Bar,
  Line,
  Pie,
  Area,
}

/// Chart payload produced by the assistant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
  #[serde(rename = "type")]
  pub kind: ChartKind,
  pub title: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  /// One object per category: a `label` key plus one numeric key per series
  #[serde(default)]
  pub data: Vec<Map<String, Value>>,
}

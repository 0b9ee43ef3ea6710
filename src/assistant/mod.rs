//! Language-model collaborator: turns history, files and a prompt into a reply.

mod gemini;
mod prompt;

use async_trait::async_trait;
use thiserror::Error;

use crate::records::{ChartData, FileRecord, MessageRecord};

pub use gemini::GeminiClient;

/// A model answer, optionally carrying a chart.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
  pub text: String,
  pub chart: Option<ChartData>,
}

impl Reply {
  pub fn text(text: impl Into<String>) -> Self {
    Self {
      text: text.into(),
      chart: None,
    }
  }
}

#[derive(Debug, Error)]
pub enum AssistantError {
  #[error("API key is missing. Set KASSI_GEMINI_API_KEY or GEMINI_API_KEY.")]
  MissingApiKey,

  #[error("request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("model returned {status}: {message}")]
  Status { status: u16, message: String },

  #[error("response blocked: {0}")]
  Blocked(String),
}

impl AssistantError {
  /// Markdown warning shown in place of a reply.
  pub fn user_message(&self) -> String {
    let summary = match self {
      AssistantError::Status { status: 400, .. } => {
        "Invalid data sent (400). The files may be too large.".to_string()
      }
      AssistantError::Status { status: 429, .. } => {
        "Too many requests. Try again in a few seconds.".to_string()
      }
      AssistantError::Status { status: 500, .. } => {
        "Internal error at the model provider. Try again.".to_string()
      }
      AssistantError::Status { message, .. } if message.contains("SAFETY") => {
        "The response was blocked by the model's safety filters.".to_string()
      }
      AssistantError::Blocked(_) => {
        "The response was blocked by the model's safety filters.".to_string()
      }
      other => format!("Model error: {}", other),
    };

    format!(
      "⚠️ **{}**\n\nTry sending smaller files or asking more specific questions.",
      summary
    )
  }
}

/// Anything that can answer a prompt given the conversation and the knowledge files.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
  /// Only configuration problems are errors; request failures come back as a
  /// warning [`Reply`].
  async fn generate(
    &self,
    history: &[MessageRecord],
    files: &[FileRecord],
    prompt: &str,
  ) -> Result<Reply, AssistantError>;
}

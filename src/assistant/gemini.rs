//! Gemini `generateContent` client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::AssistantConfig;
use crate::records::{ChartData, FileRecord, MessageRecord};

use super::prompt;
use super::{AssistantError, Reply, ReplyGenerator};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Harm categories relaxed so health statistics are not blocked as false positives
const RELAXED_CATEGORIES: [&str; 4] = [
  "HARM_CATEGORY_HATE_SPEECH",
  "HARM_CATEGORY_SEXUALLY_EXPLICIT",
  "HARM_CATEGORY_DANGEROUS_CONTENT",
  "HARM_CATEGORY_HARASSMENT",
];

const DEFAULT_CHART_TEXT: &str = "Analysis complete:";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
  contents: Vec<Content>,
  system_instruction: Content,
  safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  role: Option<String>,
  #[serde(default)]
  parts: Vec<Part>,
}

impl Content {
  fn text(role: Option<&str>, text: &str) -> Self {
    Self {
      role: role.map(String::from),
      parts: vec![Part {
        text: Some(text.to_string()),
      }],
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  text: Option<String>,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
  category: &'static str,
  threshold: &'static str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
  #[serde(default)]
  candidates: Vec<Candidate>,
  prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
  content: Option<Content>,
  finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
  block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
  error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
  #[serde(default)]
  message: String,
}

impl GenerateContentResponse {
  /// Concatenated text of the first candidate.
  fn into_text(self) -> Result<String, AssistantError> {
    if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
      return Err(AssistantError::Blocked(reason));
    }

    let Some(candidate) = self.candidates.into_iter().next() else {
      return Ok(String::new());
    };

    if candidate.finish_reason.as_deref() == Some("SAFETY") {
      return Err(AssistantError::Blocked("SAFETY".to_string()));
    }

    Ok(
      candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default(),
    )
  }
}

/// Client for the Gemini API
#[derive(Clone)]
pub struct GeminiClient {
  client: reqwest::Client,
  config: AssistantConfig,
  api_key: Option<String>,
}

impl GeminiClient {
  pub fn new(config: &AssistantConfig, api_key: Option<String>) -> Self {
    Self {
      client: reqwest::Client::new(),
      config: config.clone(),
      api_key,
    }
  }

  fn build_request(&self, history: &[MessageRecord], files: &[FileRecord], prompt: &str) -> GenerateContentRequest {
    let mut contents: Vec<Content> = prompt::history_turns(history)
      .map(|m| Content::text(Some(m.role.as_str()), &m.text))
      .collect();
    contents.push(Content::text(Some("user"), prompt));

    let instruction =
      prompt::system_instruction(&self.config.persona, files, self.config.file_char_budget);

    GenerateContentRequest {
      contents,
      system_instruction: Content::text(None, &instruction),
      safety_settings: RELAXED_CATEGORIES
        .iter()
        .map(|&category| SafetySetting {
          category,
          threshold: "BLOCK_NONE",
        })
        .collect(),
    }
  }

  async fn call(&self, api_key: &str, body: &GenerateContentRequest) -> Result<String, AssistantError> {
    let url = format!(
      "{}/models/{}:generateContent",
      self.config.endpoint.trim_end_matches('/'),
      self.config.model
    );

    let response = self
      .client
      .post(&url)
      .header(API_KEY_HEADER, api_key)
      .json(body)
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      let bytes = response.bytes().await?;
      let message = serde_json::from_slice::<ErrorEnvelope>(&bytes)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned());
      return Err(AssistantError::Status {
        status: status.as_u16(),
        message,
      });
    }

    response.json::<GenerateContentResponse>().await?.into_text()
  }
}

#[async_trait]
impl ReplyGenerator for GeminiClient {
  async fn generate(
    &self,
    history: &[MessageRecord],
    files: &[FileRecord],
    prompt: &str,
  ) -> Result<Reply, AssistantError> {
    let api_key = self.api_key.as_deref().ok_or(AssistantError::MissingApiKey)?;

    let body = self.build_request(history, files, prompt);
    info!(
      model = %self.config.model,
      turns = body.contents.len(),
      files = files.len(),
      "Requesting model reply"
    );

    match self.call(api_key, &body).await {
      Ok(raw) => Ok(parse_reply(&raw)),
      Err(e) => {
        error!(error = %e, "Model request failed");
        Ok(Reply::text(e.user_message()))
      }
    }
  }
}

#[derive(Debug, Deserialize)]
struct StructuredReply {
  message: Option<String>,
  answer: Option<String>,
  chart: Option<Value>,
}

/// Split a raw model answer into text and an optional chart.
///
/// The model is asked to answer chart requests with a bare JSON object; this
/// takes the outermost `{...}` span, strips markdown fences and falls back to
/// the raw text when it is not a structured reply.
pub fn parse_reply(raw: &str) -> Reply {
  let span = match (raw.find('{'), raw.rfind('}')) {
    (Some(start), Some(end)) if start < end => &raw[start..=end],
    _ => return Reply::text(raw),
  };

  let cleaned = span.replace("```json", "").replace("```", "");
  match serde_json::from_str::<StructuredReply>(&cleaned) {
    Ok(parsed) if parsed.chart.is_some() || parsed.message.is_some() => Reply {
      text: parsed
        .message
        .or(parsed.answer)
        .unwrap_or_else(|| DEFAULT_CHART_TEXT.to_string()),
      chart: parsed.chart.and_then(chart_data),
    },
    Ok(_) => Reply::text(raw),
    Err(e) => {
      warn!(error = %e, "Reply looked like JSON but did not parse, using text");
      Reply::text(raw)
    }
  }
}

fn chart_data(value: Value) -> Option<ChartData> {
  serde_json::from_value(value)
    .map_err(|e| warn!(error = %e, "Dropping chart that does not match the chart format"))
    .ok()
}

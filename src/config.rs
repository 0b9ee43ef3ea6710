use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub remote: RemoteConfig,
  #[serde(default)]
  pub local: LocalConfig,
  #[serde(default)]
  pub server: ServerConfig,
  #[serde(default)]
  pub assistant: AssistantConfig,
}

/// Where client commands find the kassi server
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
  #[serde(default = "default_remote_url")]
  pub url: String,
  /// Request timeout; unset leaves the HTTP client's default
  #[serde(default)]
  pub timeout_secs: Option<u64>,
}

impl Default for RemoteConfig {
  fn default() -> Self {
    Self {
      url: default_remote_url(),
      timeout_secs: None,
    }
  }
}

fn default_remote_url() -> String {
  "http://localhost:3001".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocalConfig {
  /// SQLite file for the local fallback store (defaults to the user data dir)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host: String,
  #[serde(default = "default_port")]
  pub port: u16,
  /// Directory holding db.json
  #[serde(default = "default_data_dir")]
  pub data_dir: PathBuf,
  /// Built frontend to serve, if present
  #[serde(default = "default_static_dir")]
  pub static_dir: PathBuf,
  #[serde(default = "default_body_limit_mb")]
  pub body_limit_mb: usize,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host: default_host(),
      port: default_port(),
      data_dir: default_data_dir(),
      static_dir: default_static_dir(),
      body_limit_mb: default_body_limit_mb(),
    }
  }
}

fn default_host() -> String {
  "0.0.0.0".to_string()
}

fn default_port() -> u16 {
  3001
}

fn default_data_dir() -> PathBuf {
  PathBuf::from("data")
}

fn default_static_dir() -> PathBuf {
  PathBuf::from("dist")
}

fn default_body_limit_mb() -> usize {
  50
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantConfig {
  #[serde(default = "default_endpoint")]
  pub endpoint: String,
  #[serde(default = "default_model")]
  pub model: String,
  /// Characters of each file's content included in the prompt
  #[serde(default = "default_file_char_budget")]
  pub file_char_budget: usize,
  /// Who the assistant introduces itself as
  #[serde(default = "default_persona")]
  pub persona: String,
}

impl Default for AssistantConfig {
  fn default() -> Self {
    Self {
      endpoint: default_endpoint(),
      model: default_model(),
      file_char_budget: default_file_char_budget(),
      persona: default_persona(),
    }
  }
}

fn default_endpoint() -> String {
  "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_model() -> String {
  "gemini-2.5-flash".to_string()
}

fn default_file_char_budget() -> usize {
  30_000
}

fn default_persona() -> String {
  "Gonçalinho, a data analyst for the city of São Gonçalo dos Campos, Bahia".to_string()
}

impl Config {
  /// Load configuration from file, then apply environment overrides.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./kassi.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/kassi/config.yaml
  ///
  /// Without any file the defaults are used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    config.with_env_overrides()
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("kassi.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("kassi").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    // An empty file is a valid "all defaults" config
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }
    serde_yaml::from_str(contents)
  }

  /// KASSI_API_URL points clients at another server; PORT moves the server.
  fn with_env_overrides(mut self) -> Result<Self> {
    if let Ok(url) = std::env::var("KASSI_API_URL") {
      if !url.is_empty() {
        self.remote.url = url;
      }
    }

    if let Ok(port) = std::env::var("PORT") {
      self.server.port = port
        .parse()
        .map_err(|e| eyre!("Invalid PORT value {:?}: {}", port, e))?;
    }

    Ok(self)
  }

  /// Get the Gemini API key from environment variables.
  ///
  /// Checks KASSI_GEMINI_API_KEY, then GEMINI_API_KEY, then API_KEY.
  pub fn get_api_key() -> Option<String> {
    ["KASSI_GEMINI_API_KEY", "GEMINI_API_KEY", "API_KEY"]
      .iter()
      .filter_map(|name| std::env::var(name).ok())
      .find(|key| !key.is_empty())
  }
}

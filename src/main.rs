mod assistant;
mod chat;
mod config;
mod logging;
mod records;
mod server;
mod store;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};

use crate::assistant::GeminiClient;
use crate::chat::Conversation;
use crate::config::Config;
use crate::logging::LogTarget;
use crate::records::{ChartData, FileRecord, MessageRecord};
use crate::store::{AppDataAccess, DataAccess, HttpRemoteStore, SqliteLocalStore};

#[derive(Parser, Debug)]
#[command(name = "kassi")]
#[command(about = "A knowledge assistant for your data files, online or offline")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./kassi.yaml or $XDG_CONFIG_HOME/kassi/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Run the server that stores files and messages
  Serve {
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory holding db.json
    #[arg(long)]
    data_dir: Option<PathBuf>,
  },

  /// Manage knowledge files
  #[command(subcommand)]
  Files(FilesCommand),

  /// Show the conversation
  #[command(subcommand)]
  Messages(MessagesCommand),

  /// Ask the assistant a question about your files
  Ask {
    #[arg(required = true)]
    prompt: Vec<String>,
  },

  /// Check whether the server is reachable
  Status,
}

#[derive(Subcommand, Debug)]
enum FilesCommand {
  /// List knowledge files
  List,

  /// Upload a text/CSV file
  Add {
    path: PathBuf,

    #[arg(short = 'C', long)]
    category: String,

    /// Display name (defaults to the file name)
    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    description: Option<String>,

    #[arg(long)]
    source: Option<String>,

    #[arg(long)]
    period: Option<String>,

    /// Indicator the file measures
    #[arg(long)]
    indicator: Option<String>,
  },

  /// Delete a file by id
  Delete { id: String },
}

#[derive(Subcommand, Debug)]
enum MessagesCommand {
  /// Print the conversation in order
  List,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;

  match args.command {
    Command::Serve { port, data_dir } => {
      let _guard = logging::init(LogTarget::Stderr)?;
      if let Some(port) = port {
        config.server.port = port;
      }
      if let Some(dir) = data_dir {
        config.server.data_dir = dir;
      }
      server::serve(&config.server).await
    }
    command => {
      let _guard = logging::init(LogTarget::File)?;
      let data = open_data(&config)?;
      let result = run_client(command, &config, &data).await;
      eprintln!("[{}]", data.connectivity().status());
      result
    }
  }
}

fn open_data(config: &Config) -> Result<AppDataAccess> {
  let remote = HttpRemoteStore::new(&config.remote)?;
  let local = SqliteLocalStore::open(config.local.path.as_deref())?;
  tracing::info!(remote = remote.base_url(), "Data layer ready");
  Ok(DataAccess::new(remote, local))
}

async fn run_client(command: Command, config: &Config, data: &AppDataAccess) -> Result<()> {
  match command {
    Command::Files(FilesCommand::List) => {
      for file in data.get_all_files().await {
        println!("{}  {:<16} {}", file.id, file.category, file.name);
      }
    }
    Command::Files(FilesCommand::Add {
      path,
      category,
      name,
      description,
      source,
      period,
      indicator,
    }) => {
      let mut file = read_file(&path, name, category)?;
      file.description = description;
      file.source = source;
      file.period = period;
      file.indicator = indicator;

      let id = file.id.clone();
      data.add_file(file).await;
      println!("{}", id);
    }
    Command::Files(FilesCommand::Delete { id }) => {
      data.delete_file(&id).await;
    }
    Command::Messages(MessagesCommand::List) => {
      for message in data.get_all_messages().await {
        print_message(&message);
      }
    }
    Command::Ask { prompt } => {
      let generator = GeminiClient::new(&config.assistant, Config::get_api_key());
      let mut conversation = Conversation::new(data.clone(), generator);

      let result = conversation.send(&prompt.join(" ")).await;
      conversation.settle().await;
      print_message(&result?);
    }
    Command::Status => {
      data.probe().await;
    }
    Command::Serve { .. } => return Err(eyre!("serve is not a client command")),
  }

  Ok(())
}

fn read_file(path: &Path, name: Option<String>, category: String) -> Result<FileRecord> {
  let bytes =
    std::fs::read(path).map_err(|e| eyre!("Failed to read {}: {}", path.display(), e))?;
  let content = String::from_utf8_lossy(&bytes).into_owned();

  let name = name
    .or_else(|| {
      path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
    })
    .ok_or_else(|| eyre!("Cannot derive a file name from {}", path.display()))?;

  Ok(FileRecord::new(name, category, content))
}

fn print_message(message: &MessageRecord) {
  println!("[{}] {}", message.role.as_str(), message.text);
  if let Some(chart) = &message.chart_data {
    print_chart(chart);
  }
}

fn print_chart(chart: &ChartData) {
  println!("  chart ({:?}): {}", chart.kind, chart.title);
  for row in &chart.data {
    let label = row
      .get("label")
      .and_then(|v| v.as_str())
      .unwrap_or("?");
    let series: Vec<String> = row
      .iter()
      .filter(|(k, _)| k.as_str() != "label")
      .map(|(k, v)| format!("{}={}", k, v))
      .collect();
    println!("    {}: {}", label, series.join(", "));
  }
}

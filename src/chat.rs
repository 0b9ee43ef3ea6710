//! Sending a prompt: persist the question, ask the model, persist the answer.

use color_eyre::Result;
use tracing::debug;

use crate::assistant::ReplyGenerator;
use crate::records::MessageRecord;
use crate::store::{BackgroundSync, DataAccess, LocalStore, RemoteStore};

/// A chat session over the data layer.
pub struct Conversation<R: RemoteStore, L: LocalStore, G: ReplyGenerator> {
  data: DataAccess<R, L>,
  generator: G,
  syncs: Vec<BackgroundSync>,
}

impl<R: RemoteStore, L: LocalStore, G: ReplyGenerator> Conversation<R, L, G> {
  pub fn new(data: DataAccess<R, L>, generator: G) -> Self {
    Self {
      data,
      generator,
      syncs: Vec::new(),
    }
  }

  /// Send `prompt` and return the model's finished message.
  ///
  /// Both turns are stored through the optimistic message path, so this only
  /// fails when the generator itself is misconfigured.
  pub async fn send(&mut self, prompt: &str) -> Result<MessageRecord> {
    let history = self.data.get_all_messages().await;
    let files = self.data.get_all_files().await;
    debug!(history = history.len(), files = files.len(), "Context loaded");

    let question = MessageRecord::user(prompt);
    self.syncs.push(self.data.add_message(question).await);

    let pending = MessageRecord::pending_model();
    let reply = self.generator.generate(&history, &files, prompt).await?;
    let answer = pending.finish(reply.text, reply.chart);

    self.syncs.push(self.data.add_message(answer.clone()).await);
    Ok(answer)
  }

  /// Wait for every background push started by this session.
  pub async fn settle(&mut self) {
    for sync in self.syncs.drain(..) {
      sync.settled().await;
    }
  }

  pub fn data(&self) -> &DataAccess<R, L> {
    &self.data
  }
}

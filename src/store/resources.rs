//! Record implementations for the assistant's resource types.

use crate::records::{FileRecord, MessageRecord};

use super::traits::{LocalOrder, Record, WritePolicy};

// Files are the shared knowledge base: the remote copy is what matters.
impl Record for FileRecord {
  fn record_id(&self) -> &str {
    &self.id
  }

  fn timestamp(&self) -> i64 {
    self.timestamp
  }

  fn collection() -> &'static str {
    "/files"
  }

  fn resource() -> &'static str {
    "file"
  }

  fn write_policy() -> WritePolicy {
    WritePolicy::RemoteFirst
  }

  fn local_order() -> LocalOrder {
    LocalOrder::Insertion
  }
}

// Sending a message must never wait on the network.
impl Record for MessageRecord {
  fn record_id(&self) -> &str {
    &self.id
  }

  fn timestamp(&self) -> i64 {
    self.timestamp
  }

  fn collection() -> &'static str {
    "/messages"
  }

  fn resource() -> &'static str {
    "message"
  }

  fn write_policy() -> WritePolicy {
    WritePolicy::FallbackFirst
  }

  fn local_order() -> LocalOrder {
    LocalOrder::Timestamp
  }
}

//! Message view for the chat that is currently open.
//!
//! Messages are kept sorted by `created_at` ascending, and an id index
//! guarantees that a message delivered twice (optimistic append followed
//! by its push, or a push racing a history fetch) appears once.

use std::collections::HashSet;

use banter_shared::Message;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpenChat {
    pub chat_id: String,
    /// All messages in this chat, sorted by created_at ascending.
    pub messages: Vec<Message>,
    /// Whether the history has been fetched from the REST API.
    pub is_loaded: bool,
    ids: HashSet<String>,
}

impl OpenChat {
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            ..Default::default()
        }
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.ids.contains(message_id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Add a message, maintaining sort order by created_at.
    /// Returns false if a message with the same ID already exists.
    pub fn add_message(&mut self, msg: Message) -> bool {
        if !self.ids.insert(msg.id.clone()) {
            return false;
        }

        // Equal timestamps keep arrival order
        let pos = self
            .messages
            .partition_point(|m| m.created_at <= msg.created_at);
        self.messages.insert(pos, msg);
        true
    }

    /// Install fetched history, keeping anything that landed while the
    /// fetch was in flight. Fetched copies win over local ones.
    pub fn merge_history(&mut self, history: Vec<Message>) {
        let landed = std::mem::take(&mut self.messages);
        self.ids.clear();

        for msg in history {
            self.add_message(msg);
        }
        for msg in landed {
            self.add_message(msg);
        }
        self.is_loaded = true;
    }

    /// Record that `reader_id` has read every message sent by `self_id`.
    ///
    /// Returns how many messages gained a receipt; repeated updates return 0.
    pub fn apply_read_receipt(&mut self, reader_id: &str, at: DateTime<Utc>, self_id: &str) -> usize {
        self.messages
            .iter_mut()
            .filter(|m| m.sender.id == self_id)
            .map(|m| m.record_read(reader_id, at))
            .filter(|changed| *changed)
            .count()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
    }
}

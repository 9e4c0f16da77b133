//! Chat list with unread counters.

use std::collections::HashMap;

use banter_shared::{Chat, Message};

/// Outcome of [`ChatList::record_latest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    /// The chat is not listed.
    Unlisted,
    /// The message is already the chat's latest.
    Repeat,
    /// First sighting of the message.
    New,
}

/// Chats ordered by latest activity, newest first.
#[derive(Debug, Clone, Default)]
pub struct ChatList {
    chats: Vec<Chat>,
    unread: HashMap<String, u32>,
}

impl ChatList {
    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    pub fn get(&self, chat_id: &str) -> Option<&Chat> {
        self.chats.iter().find(|c| c.id == chat_id)
    }

    pub fn contains(&self, chat_id: &str) -> bool {
        self.get(chat_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }

    /// Replace the list with a fresh fetch. Malformed chats are skipped and
    /// counters for chats that disappeared are dropped.
    pub fn replace_all(&mut self, chats: Vec<Chat>) {
        self.chats = chats
            .into_iter()
            .filter(|chat| {
                let ok = chat.is_well_formed();
                if !ok {
                    crate::log_warn!(
                        "Skipping malformed {:?} chat {} with {} members",
                        chat.kind,
                        chat.id,
                        chat.members.len()
                    );
                }
                ok
            })
            .collect();
        let chats = &self.chats;
        self.unread.retain(|id, _| chats.iter().any(|c| &c.id == id));
        self.sort();
    }

    /// Insert a chat at the front unless it is already listed.
    /// Returns true if the chat was new.
    pub fn prepend(&mut self, chat: Chat) -> bool {
        if self.contains(&chat.id) {
            return false;
        }
        if !chat.is_well_formed() {
            crate::log_warn!("Refusing malformed chat {}", chat.id);
            return false;
        }
        self.chats.insert(0, chat);
        self.sort();
        true
    }

    /// Point the chat's latest message at `msg` if it is newer.
    pub fn record_latest(&mut self, msg: &Message) -> Recorded {
        let Some(chat) = self.chats.iter_mut().find(|c| c.id == msg.chat_id) else {
            return Recorded::Unlisted;
        };
        if chat.latest_message.as_ref().is_some_and(|latest| latest.id == msg.id) {
            return Recorded::Repeat;
        }
        let newer = chat
            .latest_message
            .as_ref()
            .map_or(true, |latest| latest.created_at <= msg.created_at);
        if newer {
            chat.latest_message = Some(msg.clone());
            self.sort();
        }
        Recorded::New
    }

    pub fn clear_latest(&mut self, chat_id: &str) {
        if let Some(chat) = self.chats.iter_mut().find(|c| c.id == chat_id) {
            chat.latest_message = None;
            self.sort();
        }
    }

    pub fn unread(&self, chat_id: &str) -> u32 {
        self.unread.get(chat_id).copied().unwrap_or(0)
    }

    pub fn total_unread(&self) -> u32 {
        self.unread.values().sum()
    }

    pub fn increment_unread(&mut self, chat_id: &str) -> u32 {
        let count = self.unread.entry(chat_id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Reset the counter, returning the previous value.
    pub fn clear_unread(&mut self, chat_id: &str) -> u32 {
        self.unread.remove(chat_id).unwrap_or(0)
    }

    pub fn set_unread(&mut self, chat_id: &str, count: u32) {
        if count == 0 {
            self.unread.remove(chat_id);
        } else {
            self.unread.insert(chat_id.to_string(), count);
        }
    }

    /// Stable sort by activity, newest first.
    fn sort(&mut self) {
        self.chats.sort_by(|a, b| b.activity_at().cmp(&a.activity_at()));
    }
}

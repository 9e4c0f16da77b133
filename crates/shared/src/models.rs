//! Shared data models for the banter chat service.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Base URL for generated group avatars.
const GROUP_AVATAR_BASE: &str = "https://ui-avatars.com/api/?background=FF6B35&color=fff&name=";

/// Maximum characters shown in a notification preview.
pub const PREVIEW_CHARS: usize = 80;

// --- Identity ---

/// Friendship relation between the current user and another user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FriendshipStatus {
    #[default]
    None,
    PendingSent,
    PendingReceived,
    Friends,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub friendship: FriendshipStatus,
}

impl User {
    pub fn is_friend(&self) -> bool {
        self.friendship == FriendshipStatus::Friends
    }
}

/// Authenticated identity plus bearer credential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub user: User,
}

// --- Messaging ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender: User,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Read receipts keyed by reader id.
    #[serde(default)]
    pub read_by: BTreeMap<String, DateTime<Utc>>,
}

impl Message {
    /// Record that `reader_id` has read this message.
    ///
    /// Returns false when the reader authored the message or is already
    /// recorded, leaving the receipt set untouched.
    pub fn record_read(&mut self, reader_id: &str, at: DateTime<Utc>) -> bool {
        if self.sender.id == reader_id || self.read_by.contains_key(reader_id) {
            return false;
        }
        self.read_by.insert(reader_id.to_string(), at);
        true
    }

    /// Whether anyone other than `self_id` has read the message.
    pub fn is_read_by_others(&self, self_id: &str) -> bool {
        self.read_by.keys().any(|reader| reader != self_id)
    }

    /// Content shortened for notification display.
    pub fn preview(&self) -> String {
        if self.content.chars().count() > PREVIEW_CHARS {
            let head: String = self.content.chars().take(PREVIEW_CHARS).collect();
            format!("{head}...")
        } else {
            self.content.clone()
        }
    }
}

// --- Chats ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Direct,
    Group,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub kind: ChatKind,
    /// Display name, set for group chats only.
    #[serde(default)]
    pub name: Option<String>,
    pub members: Vec<User>,
    #[serde(default)]
    pub latest_message: Option<Message>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    /// Direct chats have exactly two members, groups at least three.
    pub fn is_well_formed(&self) -> bool {
        match self.kind {
            ChatKind::Direct => self.members.len() == 2,
            ChatKind::Group => self.members.len() >= 3,
        }
    }

    /// Timestamp used for list ordering: the latest message, else the chat itself.
    pub fn activity_at(&self) -> DateTime<Utc> {
        self.latest_message
            .as_ref()
            .map(|m| m.created_at)
            .unwrap_or(self.updated_at)
    }

    pub fn other_member(&self, self_id: &str) -> Option<&User> {
        self.members.iter().find(|u| u.id != self_id)
    }

    pub fn display_name(&self, self_id: &str) -> String {
        match self.kind {
            ChatKind::Group => self.name.clone().unwrap_or_default(),
            ChatKind::Direct => self
                .other_member(self_id)
                .map(|u| u.username.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
        }
    }

    pub fn avatar(&self, self_id: &str) -> Option<String> {
        match self.kind {
            ChatKind::Group => Some(format!(
                "{GROUP_AVATAR_BASE}{}",
                urlencoding::encode(self.name.as_deref().unwrap_or_default())
            )),
            ChatKind::Direct => self.other_member(self_id).and_then(|u| u.avatar.clone()),
        }
    }
}

// --- Friend graph ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FriendRequestState {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    pub id: String,
    pub from: User,
    pub to: String,
    pub status: FriendRequestState,
}

// --- Request/Response bodies ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

impl From<AuthResponse> for Session {
    fn from(resp: AuthResponse) -> Self {
        Session {
            token: resp.token,
            user: resp.user,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDirectChatRequest {
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupChatRequest {
    pub name: String,
    pub users: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub chat_id: String,
    pub content: String,
}

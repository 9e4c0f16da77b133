//! Event-stream protocol definitions.
//!
//! Every frame on the WebSocket is a JSON [`WsEnvelope`] whose payload is
//! adjacently tagged: `{"id": .., "event": "join-chat", "data": "c1", "ts": ..}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Message;

/// Authorization header carrying the bearer credential.
pub const HEADER_AUTHORIZATION: &str = "Authorization";

/// Format the bearer credential for the authorization header.
pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsEnvelope<T> {
    pub id: String,
    #[serde(flatten)]
    pub payload: T,
    pub ts: DateTime<Utc>,
}

impl<T> WsEnvelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload,
            ts: Utc::now(),
        }
    }
}

/// `messages-read` broadcast from a reader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReadNotice {
    pub chat_id: String,
    pub user_id: String,
}

/// `messages-read-update` as relayed by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReadUpdate {
    #[serde(default)]
    pub chat_id: Option<String>,
    pub user_id: String,
}

/// Friend-graph notification exchanged between the two parties.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FriendNotice {
    pub from: String,
    pub to: String,
}

/// Events the client sends to the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Announce the identity so the server can route pushes to this socket.
    Setup(String),
    JoinChat(String),
    Typing(String),
    StopTyping(String),
    NewMessage(Message),
    MessagesRead(ReadNotice),
    FriendRequestSent(FriendNotice),
    FriendRequestAccepted(FriendNotice),
}

/// Events pushed by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    UserOnline(String),
    UserOffline(String),
    MessageReceived(Message),
    Typing(String),
    StopTyping(String),
    MessagesReadUpdate(ReadUpdate),
    FriendRequestReceived(FriendNotice),
    FriendRequestAcceptedNotification(FriendNotice),
}

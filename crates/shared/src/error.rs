//! Error taxonomy shared by the directory client, event stream and reconciler.

use serde::{Deserialize, Serialize};

/// Machine-distinguishable error code carried in API error bodies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Unauthenticated,
    NotFriends,
    AlreadyFriends,
    RequestNotFound,
    InvalidGroup,
    EmptyContent,
    #[serde(other)]
    Unknown,
}

/// Error envelope returned by the backend for non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: ErrorCode,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("not authenticated")]
    Unauthenticated,
    #[error("you need to be friends to start chatting")]
    NotFriends,
    #[error("already friends")]
    AlreadyFriends,
    #[error("friend request not found")]
    RequestNotFound,
    #[error("invalid group: {0}")]
    InvalidGroup(String),
    #[error("message content is empty")]
    EmptyContent,
    #[error("no chat is open")]
    NoActiveChat,
    #[error("unknown chat {0}")]
    UnknownChat(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("deserialization error: {0}")]
    Deserialize(String),
    #[error("event stream disconnected")]
    StreamDisconnected,
    #[error("malformed event: {0}")]
    MalformedEvent(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl ChatError {
    /// Build an error from a non-success HTTP response.
    ///
    /// Known codes map onto their variant; anything else keeps the status and
    /// the most readable message available.
    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed = serde_json::from_str::<ErrorBody>(body).ok();
        let code = parsed.as_ref().map(|b| b.code);
        match code {
            Some(ErrorCode::Unauthenticated) => return ChatError::Unauthenticated,
            Some(ErrorCode::NotFriends) => return ChatError::NotFriends,
            Some(ErrorCode::AlreadyFriends) => return ChatError::AlreadyFriends,
            Some(ErrorCode::RequestNotFound) => return ChatError::RequestNotFound,
            Some(ErrorCode::EmptyContent) => return ChatError::EmptyContent,
            Some(ErrorCode::InvalidGroup) => {
                let reason = parsed.map(|b| b.message).unwrap_or_default();
                return ChatError::InvalidGroup(reason);
            }
            Some(ErrorCode::Unknown) | None => {}
        }
        if status == 401 {
            return ChatError::Unauthenticated;
        }
        let message = match parsed {
            Some(b) if !b.message.trim().is_empty() => b.message,
            _ => body.to_string(),
        };
        ChatError::Server { status, message }
    }

    /// The session must be re-established before retrying.
    pub fn requires_login(&self) -> bool {
        matches!(self, ChatError::Unauthenticated)
    }

    /// Worth re-offering the action to the user.
    pub fn is_transient(&self) -> bool {
        match self {
            ChatError::Network(_) | ChatError::StreamDisconnected => true,
            ChatError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

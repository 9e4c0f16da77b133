//! HTTP client for the chat backend's REST surface.

use async_trait::async_trait;
use banter_shared::{
    bearer, AuthResponse, Chat, ChatError, CreateDirectChatRequest, CreateGroupChatRequest,
    FriendRequest, LoginRequest, Message, SendMessageRequest, SignupRequest, User,
    HEADER_AUTHORIZATION,
};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Request/response operations against the backend.
///
/// Calls are stateless and never retried here; callers decide whether to
/// re-offer a failed action.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn list_chats(&self) -> Result<Vec<Chat>, ChatError>;
    async fn create_direct_chat(&self, user_id: &str) -> Result<Chat, ChatError>;
    async fn create_group_chat(&self, name: &str, member_ids: &[String]) -> Result<Chat, ChatError>;
    async fn list_users(&self) -> Result<Vec<User>, ChatError>;
    async fn list_online_users(&self) -> Result<Vec<User>, ChatError>;
    async fn list_friend_requests(&self) -> Result<Vec<FriendRequest>, ChatError>;
    async fn send_friend_request(&self, user_id: &str) -> Result<(), ChatError>;
    async fn accept_friend_request(&self, user_id: &str) -> Result<(), ChatError>;
    async fn reject_friend_request(&self, user_id: &str) -> Result<(), ChatError>;
    async fn list_messages(&self, chat_id: &str) -> Result<Vec<Message>, ChatError>;
    async fn send_message(&self, chat_id: &str, content: &str) -> Result<Message, ChatError>;
    async fn mark_read(&self, chat_id: &str) -> Result<(), ChatError>;
    async fn clear_chat(&self, chat_id: &str) -> Result<(), ChatError>;
}

/// Group names must be non-blank and carry at least two other members.
pub fn validate_group(name: &str, member_ids: &[String]) -> Result<(), ChatError> {
    if name.trim().is_empty() {
        return Err(ChatError::InvalidGroup("group name is required".into()));
    }
    let mut distinct: Vec<&String> = member_ids.iter().collect();
    distinct.sort();
    distinct.dedup();
    if distinct.len() < 2 {
        return Err(ChatError::InvalidGroup(
            "select at least 2 members".into(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: String::new(),
            token: None,
        }
    }

    /// Set the base URL for API requests
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Attach the bearer credential sent with every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if self.base_url.is_empty() {
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            }
        } else {
            let base = self.base_url.trim_end_matches('/');
            let path = path.trim_start_matches('/');
            format!("{base}/{path}")
        }
    }

    fn token(&self) -> Result<&str, ChatError> {
        match self.token.as_deref() {
            Some(t) if !t.trim().is_empty() => Ok(t),
            _ => Err(ChatError::Unauthenticated),
        }
    }

    /// Send a request and return the raw body of a successful response.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        authenticated: bool,
    ) -> Result<String, ChatError> {
        let url = self.url(path);
        let mut rb = self.client.request(method.clone(), &url);

        if authenticated {
            rb = rb.header(HEADER_AUTHORIZATION, bearer(self.token()?));
        }
        if let Some(bytes) = body {
            rb = rb.header("Content-Type", "application/json").body(bytes);
        }

        crate::log_debug!("{} {}", method, url);
        let resp = rb
            .send()
            .await
            .map_err(|e| ChatError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();
        let text = resp
            .text()
            .await
            .map_err(|e| ChatError::Network(format!("failed to read body: {e}")))?;

        if !is_success {
            return Err(ChatError::from_response(status, &text));
        }
        Ok(text)
    }

    fn decode<TRes: DeserializeOwned>(text: &str) -> Result<TRes, ChatError> {
        let text = if text.is_empty() { "null" } else { text };
        serde_json::from_str(text).map_err(|e| ChatError::Deserialize(e.to_string()))
    }

    fn encode<TReq: Serialize>(body: &TReq) -> Result<Vec<u8>, ChatError> {
        serde_json::to_vec(body).map_err(|e| ChatError::Deserialize(e.to_string()))
    }

    /// Make an authenticated GET request
    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ChatError> {
        let text = self.send(Method::GET, path, None, true).await?;
        Self::decode(&text)
    }

    /// Make an authenticated POST request with JSON body
    pub async fn post_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ChatError> {
        let text = self
            .send(Method::POST, path, Some(Self::encode(body)?), true)
            .await?;
        Self::decode(&text)
    }

    /// Make an authenticated POST request whose response body is ignored
    pub async fn post_empty(&self, path: &str) -> Result<(), ChatError> {
        self.send(Method::POST, path, Some(b"{}".to_vec()), true)
            .await
            .map(|_| ())
    }

    /// Make an authenticated PUT request whose response body is ignored
    pub async fn put_empty(&self, path: &str) -> Result<(), ChatError> {
        self.send(Method::PUT, path, Some(b"{}".to_vec()), true)
            .await
            .map(|_| ())
    }

    /// Make an authenticated DELETE request
    pub async fn delete(&self, path: &str) -> Result<(), ChatError> {
        self.send(Method::DELETE, path, None, true).await.map(|_| ())
    }

    // --- Authentication (no credential required) ---

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ChatError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let text = self
            .send(Method::POST, "/api/auth/login", Some(Self::encode(&body)?), false)
            .await?;
        Self::decode(&text)
    }

    pub async fn signup(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, ChatError> {
        let body = SignupRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        let text = self
            .send(Method::POST, "/api/auth/signup", Some(Self::encode(&body)?), false)
            .await?;
        Self::decode(&text)
    }
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

fn segment(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}

#[async_trait]
impl Directory for ApiClient {
    async fn list_chats(&self) -> Result<Vec<Chat>, ChatError> {
        self.get_json("/api/chats").await
    }

    async fn create_direct_chat(&self, user_id: &str) -> Result<Chat, ChatError> {
        let body = CreateDirectChatRequest {
            user_id: user_id.to_string(),
        };
        self.post_json("/api/chats", &body).await
    }

    async fn create_group_chat(&self, name: &str, member_ids: &[String]) -> Result<Chat, ChatError> {
        self.token()?;
        validate_group(name, member_ids)?;
        let body = CreateGroupChatRequest {
            name: name.trim().to_string(),
            users: member_ids.to_vec(),
        };
        self.post_json("/api/chats/group", &body).await
    }

    async fn list_users(&self) -> Result<Vec<User>, ChatError> {
        self.get_json("/api/users").await
    }

    async fn list_online_users(&self) -> Result<Vec<User>, ChatError> {
        self.get_json("/api/users/online").await
    }

    async fn list_friend_requests(&self) -> Result<Vec<FriendRequest>, ChatError> {
        self.get_json("/api/friends/requests").await
    }

    async fn send_friend_request(&self, user_id: &str) -> Result<(), ChatError> {
        self.post_empty(&format!("/api/friends/request/{}", segment(user_id)))
            .await
    }

    async fn accept_friend_request(&self, user_id: &str) -> Result<(), ChatError> {
        self.post_empty(&format!("/api/friends/accept/{}", segment(user_id)))
            .await
    }

    async fn reject_friend_request(&self, user_id: &str) -> Result<(), ChatError> {
        self.post_empty(&format!("/api/friends/reject/{}", segment(user_id)))
            .await
    }

    async fn list_messages(&self, chat_id: &str) -> Result<Vec<Message>, ChatError> {
        self.get_json(&format!("/api/messages/{}", segment(chat_id)))
            .await
    }

    async fn send_message(&self, chat_id: &str, content: &str) -> Result<Message, ChatError> {
        self.token()?;
        if content.trim().is_empty() {
            return Err(ChatError::EmptyContent);
        }
        let body = SendMessageRequest {
            chat_id: chat_id.to_string(),
            content: content.to_string(),
        };
        self.post_json("/api/messages", &body).await
    }

    async fn mark_read(&self, chat_id: &str) -> Result<(), ChatError> {
        self.put_empty(&format!("/api/messages/read/{}", segment(chat_id)))
            .await
    }

    async fn clear_chat(&self, chat_id: &str) -> Result<(), ChatError> {
        self.delete(&format!("/api/messages/clear/{}", segment(chat_id)))
            .await
    }
}

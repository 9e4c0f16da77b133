//! Session persistence on top of a [`KeyValueStore`].

use std::sync::Arc;

use banter_shared::{ChatError, Session, User};

use crate::storage::KeyValueStore;

const TOKEN_KEY: &str = "token";
const USER_KEY: &str = "user";

/// Holds the authenticated identity and bearer credential.
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Load the stored session. Both keys must be present and the user must decode.
    pub fn get(&self) -> Option<Session> {
        let token = self.store.get(TOKEN_KEY)?;
        let user_json = self.store.get(USER_KEY)?;
        match serde_json::from_str::<User>(&user_json) {
            Ok(user) if !token.trim().is_empty() => Some(Session { token, user }),
            Ok(_) => None,
            Err(e) => {
                crate::log_warn!("Discarding stored user record: {}", e);
                None
            }
        }
    }

    pub fn set(&self, session: &Session) -> Result<(), ChatError> {
        let user_json = serde_json::to_string(&session.user)
            .map_err(|e| ChatError::Storage(format!("encode user: {e}")))?;
        self.store.set(TOKEN_KEY, &session.token)?;
        self.store.set(USER_KEY, &user_json)
    }

    pub fn clear(&self) {
        self.store.remove(TOKEN_KEY);
        self.store.remove(USER_KEY);
    }

    pub fn is_authenticated(&self) -> bool {
        self.get().is_some()
    }
}

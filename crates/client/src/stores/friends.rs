//! Pending friend requests addressed to the current user.

use banter_shared::{FriendRequest, FriendRequestState};

#[derive(Debug, Clone, Default)]
pub struct FriendRequests {
    requests: Vec<FriendRequest>,
}

impl FriendRequests {
    /// Replace the cached requests, keeping only pending ones.
    pub fn replace_all(&mut self, requests: Vec<FriendRequest>) {
        self.requests = requests
            .into_iter()
            .filter(|r| r.status == FriendRequestState::Pending)
            .collect();
    }

    pub fn pending(&self) -> &[FriendRequest] {
        &self.requests
    }

    /// Whether `user_id` has a pending request to us.
    pub fn has_from(&self, user_id: &str) -> bool {
        self.requests.iter().any(|r| r.from.id == user_id)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

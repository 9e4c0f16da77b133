//! Cached users and their presence.

use banter_shared::User;

/// All known users plus the subset currently online.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    users: Vec<User>,
    online: Vec<User>,
}

impl Roster {
    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn online(&self) -> &[User] {
        &self.online
    }

    pub fn get(&self, user_id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.id == user_id)
    }

    pub fn friends(&self) -> impl Iterator<Item = &User> {
        self.users.iter().filter(|u| u.is_friend())
    }

    pub fn is_friend(&self, user_id: &str) -> bool {
        self.get(user_id).is_some_and(User::is_friend)
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.online.iter().any(|u| u.id == user_id)
    }

    pub fn set_users(&mut self, users: Vec<User>) {
        self.users = users;
        for user in &mut self.users {
            user.is_online = self.online.iter().any(|u| u.id == user.id);
        }
    }

    pub fn set_online(&mut self, online: Vec<User>) {
        self.online = online;
        for user in &mut self.users {
            user.is_online = self.online.iter().any(|u| u.id == user.id);
        }
    }

    /// Update one user's presence in place.
    ///
    /// Returns false when the user is not cached, leaving the roster as is.
    pub fn mark_online(&mut self, user_id: &str, online: bool) -> bool {
        let Some(user) = self.users.iter_mut().find(|u| u.id == user_id) else {
            return false;
        };
        user.is_online = online;
        let user = user.clone();

        if online {
            if !self.is_online(user_id) {
                self.online.push(user);
            }
        } else {
            self.online.retain(|u| u.id != user_id);
        }
        true
    }
}

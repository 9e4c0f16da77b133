//! User-initiated operations and directory refreshes.

use std::sync::Arc;

use banter_shared::{Chat, ChatError, ClientEvent, FriendNotice, Message, ReadNotice};

use super::Reconciler;
use crate::api_client::validate_group;
use crate::stores::OpenChat;

/// A slice of state that can be refetched from the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    Chats,
    Users,
    OnlineUsers,
    FriendRequests,
}

impl Reconciler {
    // --- Loading ---

    /// Load chats, users, online users and friend requests.
    pub async fn load_initial(&self) -> Result<(), ChatError> {
        tokio::try_join!(
            self.refresh(Refresh::Chats),
            self.refresh(Refresh::Users),
            self.refresh(Refresh::OnlineUsers),
            self.refresh(Refresh::FriendRequests),
        )?;
        crate::log_info!(
            "Loaded {} chats for {}",
            self.with_state(|s| s.chats.len()),
            self.inner.me.username
        );
        Ok(())
    }

    pub async fn refresh(&self, what: Refresh) -> Result<(), ChatError> {
        let directory = &self.inner.directory;
        match what {
            Refresh::Chats => {
                let chats = directory.list_chats().await?;
                self.mutate(|s| s.chats.replace_all(chats));
            }
            Refresh::Users => {
                let users = directory.list_users().await?;
                self.mutate(|s| s.roster.set_users(users));
            }
            Refresh::OnlineUsers => {
                let online = directory.list_online_users().await?;
                self.mutate(|s| s.roster.set_online(online));
            }
            Refresh::FriendRequests => {
                let requests = directory.list_friend_requests().await?;
                self.mutate(|s| s.requests.replace_all(requests));
            }
        }
        Ok(())
    }

    /// Refresh in order, logging failures.
    pub(super) async fn refresh_logged(&self, targets: &[Refresh]) {
        for what in targets {
            if let Err(e) = self.refresh(*what).await {
                crate::log_warn!("Refreshing {:?} failed: {}", what, e);
            }
        }
    }

    /// Refresh on a background task. Used from stream handlers, which must not block.
    pub(super) fn spawn_refresh(&self, targets: &'static [Refresh]) {
        self.spawn_background(move |this| async move { this.refresh_logged(targets).await });
    }

    /// Close the gap left by a dropped connection: reload everything, re-join
    /// the active chat and merge its history.
    pub async fn resync(&self) {
        crate::log_info!("Resyncing after reconnect");
        if let Err(e) = self.load_initial().await {
            crate::log_warn!("Resync load failed: {}", e);
        }

        let Some(chat_id) = self.active_chat() else {
            return;
        };
        self.emit_logged(ClientEvent::JoinChat(chat_id.clone()));
        match self.inner.directory.list_messages(&chat_id).await {
            Ok(history) => {
                let applied = self.mutate(|s| match s.open.as_mut() {
                    Some(view) if view.chat_id == chat_id => {
                        view.merge_history(history);
                        true
                    }
                    _ => false,
                });
                if applied {
                    self.propagate_read(&chat_id).await;
                }
            }
            Err(e) => crate::log_warn!("Resync history for {} failed: {}", chat_id, e),
        }
    }

    // --- Selection ---

    /// Open a chat: clear its unread count, join it on the stream and fetch
    /// its history.
    ///
    /// Pushes that land while the fetch is pending are merged with the
    /// history. A response for a chat that is no longer active is dropped.
    pub async fn select_chat(&self, chat_id: &str) -> Result<(), ChatError> {
        if !self.with_state(|s| s.chats.contains(chat_id)) {
            return Err(ChatError::UnknownChat(chat_id.to_string()));
        }
        self.stop_typing();
        self.inner.mark_read.cancel();

        let (generation, previous_view, previous_unread) = self.mutate(|s| {
            s.selection += 1;
            s.peer_typing = false;
            let previous_view = s.open.replace(OpenChat::new(chat_id));
            let previous_unread = s.chats.clear_unread(chat_id);
            (s.selection, previous_view, previous_unread)
        });

        self.emit_logged(ClientEvent::JoinChat(chat_id.to_string()));

        match self.inner.directory.list_messages(chat_id).await {
            Ok(history) => {
                let applied = self.mutate(|s| match s.open.as_mut() {
                    Some(view) if view.chat_id == chat_id => {
                        view.merge_history(history);
                        true
                    }
                    _ => false,
                });
                if applied {
                    self.propagate_read(chat_id).await;
                } else {
                    crate::log_debug!("Discarding stale history for {}", chat_id);
                }
                Ok(())
            }
            Err(e) => {
                let me = self.inner.me.id.clone();
                self.mutate(|s| {
                    if s.selection != generation {
                        return;
                    }
                    // Pushes that landed in the abandoned view count as unread again
                    let landed = s
                        .open
                        .as_ref()
                        .map(|v| v.messages.iter().filter(|m| m.sender.id != me).count())
                        .unwrap_or(0) as u32;
                    s.open = previous_view;
                    s.chats.set_unread(chat_id, previous_unread + landed);
                });
                crate::log_error!("Failed to open chat {}: {}", chat_id, e);
                Err(e)
            }
        }
    }

    /// Start (or find) a direct chat with a friend and open it.
    pub async fn open_direct_chat(&self, user_id: &str) -> Result<String, ChatError> {
        if !self.with_state(|s| s.roster.is_friend(user_id)) {
            return Err(ChatError::NotFriends);
        }
        let chat = self.inner.directory.create_direct_chat(user_id).await?;
        let chat_id = chat.id.clone();
        self.mutate(|s| s.chats.prepend(chat));
        self.select_chat(&chat_id).await?;
        Ok(chat_id)
    }

    /// Mark the chat read on the server and tell the other members.
    /// Failures are logged and dropped.
    pub(super) async fn propagate_read(&self, chat_id: &str) {
        if let Err(e) = self.inner.directory.mark_read(chat_id).await {
            crate::log_warn!("Failed to mark {} read: {}", chat_id, e);
            return;
        }
        if self.inner.stream.is_connected() {
            self.emit_logged(ClientEvent::MessagesRead(ReadNotice {
                chat_id: chat_id.to_string(),
                user_id: self.inner.me.id.clone(),
            }));
        }
    }

    /// Debounced [`Reconciler::propagate_read`] for pushes into the open chat.
    pub(super) fn schedule_mark_read(&self, chat_id: &str) {
        let weak = Arc::downgrade(&self.inner);
        let chat_id = chat_id.to_string();
        self.inner
            .mark_read
            .schedule(self.inner.config.mark_read_delay, async move {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let this = Reconciler { inner };
                if this.with_state(|s| s.is_active(&chat_id)) {
                    this.propagate_read(&chat_id).await;
                }
            });
    }

    // --- Composer ---

    /// Replace the composer text and drive the typing indicator.
    pub fn update_composer(&self, text: impl Into<String>) {
        let text = text.into();
        let (chat_id, started) = self.mutate(|s| {
            s.composer = text;
            let chat_id = s.active_chat_id().map(str::to_string);
            let started = chat_id.is_some() && !s.is_typing;
            if started {
                s.is_typing = true;
            }
            (chat_id, started)
        });
        let Some(chat_id) = chat_id else {
            return;
        };

        if started {
            self.emit_logged(ClientEvent::Typing(chat_id.clone()));
        }

        let weak = Arc::downgrade(&self.inner);
        self.inner
            .typing_stop
            .schedule(self.inner.config.typing_idle, async move {
                if let Some(inner) = weak.upgrade() {
                    Reconciler { inner }.finish_typing(&chat_id);
                }
            });
    }

    /// End the typing period now, if one is running.
    pub fn stop_typing(&self) {
        self.inner.typing_stop.cancel();
        if let Some(chat_id) = self.active_chat() {
            self.finish_typing(&chat_id);
        }
    }

    fn finish_typing(&self, chat_id: &str) {
        let was_typing = self.mutate(|s| std::mem::replace(&mut s.is_typing, false));
        if was_typing {
            self.emit_logged(ClientEvent::StopTyping(chat_id.to_string()));
        }
    }

    /// Send the composer contents to the active chat.
    ///
    /// The composer is cleared before the request. On failure its text is
    /// restored, ahead of anything typed in the meantime.
    pub async fn send_message(&self) -> Result<Message, ChatError> {
        let (chat_id, content) = {
            let mut state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let chat_id = state
                .active_chat_id()
                .ok_or(ChatError::NoActiveChat)?
                .to_string();
            if state.composer.trim().is_empty() {
                return Err(ChatError::EmptyContent);
            }
            (chat_id, std::mem::take(&mut state.composer))
        };
        self.inner.changes.send_modify(|rev| *rev += 1);
        self.stop_typing();

        match self.inner.directory.send_message(&chat_id, &content).await {
            Ok(msg) => {
                self.mutate(|s| {
                    if let Some(view) = s.open.as_mut().filter(|v| v.chat_id == chat_id) {
                        view.add_message(msg.clone());
                    }
                    s.chats.record_latest(&msg);
                });
                self.emit_logged(ClientEvent::NewMessage(msg.clone()));
                Ok(msg)
            }
            Err(e) => {
                self.mutate(|s| {
                    let typed_since = std::mem::take(&mut s.composer);
                    s.composer = content + &typed_since;
                });
                crate::log_error!("Failed to send message to {}: {}", chat_id, e);
                Err(e)
            }
        }
    }

    // --- Groups ---

    pub fn set_group_name(&self, name: impl Into<String>) {
        let name = name.into();
        self.mutate(|s| s.group_draft.name = name);
    }

    pub fn toggle_group_member(&self, user_id: &str) {
        self.mutate(|s| s.group_draft.toggle_member(user_id));
    }

    pub fn clear_group_draft(&self) {
        self.mutate(|s| s.group_draft.clear());
    }

    /// Create a group chat from the draft and clear it on success.
    pub async fn submit_group_draft(&self) -> Result<Chat, ChatError> {
        let draft = self.with_state(|s| s.group_draft.clone());
        let chat = self.create_group_chat(&draft.name, &draft.members).await?;
        self.mutate(|s| s.group_draft.clear());
        Ok(chat)
    }

    /// Create a group chat. Needs a non-blank name and at least two
    /// distinct members other than ourselves.
    pub async fn create_group_chat(&self, name: &str, member_ids: &[String]) -> Result<Chat, ChatError> {
        let mut members: Vec<String> = Vec::with_capacity(member_ids.len());
        for id in member_ids {
            if *id != self.inner.me.id && !members.contains(id) {
                members.push(id.clone());
            }
        }
        validate_group(name, &members)?;

        let chat = self
            .inner
            .directory
            .create_group_chat(name.trim(), &members)
            .await?;
        crate::log_info!("Created group {} with {} members", chat.id, chat.members.len());
        self.mutate(|s| s.chats.prepend(chat.clone()));
        Ok(chat)
    }

    // --- History ---

    /// Delete the active chat's history for everyone.
    pub async fn clear_active_chat(&self) -> Result<(), ChatError> {
        let chat_id = self.active_chat().ok_or(ChatError::NoActiveChat)?;
        self.inner.directory.clear_chat(&chat_id).await?;
        self.mutate(|s| {
            if let Some(view) = s.open.as_mut().filter(|v| v.chat_id == chat_id) {
                view.clear();
            }
            s.chats.clear_latest(&chat_id);
        });
        Ok(())
    }

    pub fn dismiss_notification(&self) {
        self.inner.notification_dismiss.cancel();
        self.mutate(|s| s.notification = None);
    }

    // --- Friend graph ---

    pub async fn send_friend_request(&self, user_id: &str) -> Result<(), ChatError> {
        self.inner.directory.send_friend_request(user_id).await?;
        self.emit_logged(ClientEvent::FriendRequestSent(FriendNotice {
            from: self.inner.me.id.clone(),
            to: user_id.to_string(),
        }));
        self.refresh_logged(&[Refresh::FriendRequests, Refresh::Users])
            .await;
        Ok(())
    }

    pub async fn accept_friend_request(&self, user_id: &str) -> Result<(), ChatError> {
        self.inner.directory.accept_friend_request(user_id).await?;
        self.emit_logged(ClientEvent::FriendRequestAccepted(FriendNotice {
            from: self.inner.me.id.clone(),
            to: user_id.to_string(),
        }));
        self.refresh_logged(&[Refresh::FriendRequests, Refresh::Users, Refresh::OnlineUsers])
            .await;
        Ok(())
    }

    pub async fn reject_friend_request(&self, user_id: &str) -> Result<(), ChatError> {
        self.inner.directory.reject_friend_request(user_id).await?;
        self.refresh_logged(&[Refresh::FriendRequests, Refresh::Users])
            .await;
        Ok(())
    }
}

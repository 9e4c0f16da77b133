//! Applying stream events to the state.

use std::sync::Arc;

use banter_shared::{ChatError, Message, ReadUpdate, ServerEvent};
use chrono::Utc;

use super::commands::Refresh;
use super::{Notification, Reconciler};
use crate::stores::Recorded;
use crate::ws::{ConnectionState, StreamEvent};

/// Where an incoming message ended up.
enum Landing {
    OpenChat,
    Notified,
    Silent,
}

impl Reconciler {
    /// Fold one stream event into the state.
    ///
    /// Runs on the connection task, so anything that needs the network is
    /// spawned rather than awaited.
    pub fn apply_event(&self, event: &StreamEvent) -> Result<(), ChatError> {
        match event {
            StreamEvent::Connected => {
                self.mutate(|s| s.connection = ConnectionState::Connected);
            }
            StreamEvent::Disconnected => {
                self.mutate(|s| {
                    s.connection = ConnectionState::Disconnected;
                    s.peer_typing = false;
                });
            }
            StreamEvent::Reconnected => {
                self.mutate(|s| s.connection = ConnectionState::Connected);
                self.spawn_background(|this| async move { this.resync().await });
            }
            StreamEvent::ReconnectFailed { attempts } => {
                crate::log_error!("Event stream gave up after {} attempts", attempts);
                self.mutate(|s| {
                    s.connection = ConnectionState::Failed {
                        reason: format!("gave up after {attempts} attempts"),
                    }
                });
            }
            StreamEvent::Server(server) => match server {
                ServerEvent::UserOnline(user_id) => self.apply_presence(user_id, true),
                ServerEvent::UserOffline(user_id) => self.apply_presence(user_id, false),
                ServerEvent::MessageReceived(msg) => self.apply_message(msg)?,
                ServerEvent::Typing(chat_id) => self.apply_peer_typing(chat_id, true),
                ServerEvent::StopTyping(chat_id) => self.apply_peer_typing(chat_id, false),
                ServerEvent::MessagesReadUpdate(update) => self.apply_read_update(update),
                ServerEvent::FriendRequestReceived(notice) => {
                    crate::log_info!("Friend request from {}", notice.from);
                    self.spawn_refresh(&[Refresh::FriendRequests, Refresh::Users]);
                }
                ServerEvent::FriendRequestAcceptedNotification(notice) => {
                    crate::log_info!("{} accepted our friend request", notice.from);
                    self.spawn_refresh(&[Refresh::Users, Refresh::OnlineUsers]);
                }
            },
        }
        Ok(())
    }

    fn apply_presence(&self, user_id: &str, online: bool) {
        if user_id == self.inner.me.id {
            return;
        }
        let known = self.mutate(|s| s.roster.mark_online(user_id, online));
        if !known {
            crate::log_debug!("Presence for unknown user {}, refreshing", user_id);
            self.spawn_refresh(&[Refresh::Users, Refresh::OnlineUsers]);
        }
    }

    fn apply_message(&self, msg: &Message) -> Result<(), ChatError> {
        if msg.id.is_empty() || msg.chat_id.is_empty() {
            return Err(ChatError::MalformedEvent(
                "message without id or chat".to_string(),
            ));
        }

        let own = msg.sender.id == self.inner.me.id;
        let (recorded, landing) = self.mutate(|s| {
            let recorded = s.chats.record_latest(msg);
            let landing = if s.is_active(&msg.chat_id) {
                let added = s
                    .open
                    .as_mut()
                    .is_some_and(|view| view.add_message(msg.clone()));
                if added {
                    Landing::OpenChat
                } else {
                    Landing::Silent
                }
            } else if own || recorded == Recorded::Repeat {
                Landing::Silent
            } else {
                s.chats.increment_unread(&msg.chat_id);
                s.notification = Some(Notification::for_message(msg));
                Landing::Notified
            };
            (recorded, landing)
        });

        if recorded == Recorded::Unlisted {
            crate::log_debug!("Message for unlisted chat {}, refreshing", msg.chat_id);
            self.spawn_refresh(&[Refresh::Chats]);
        }

        match landing {
            Landing::OpenChat if !own => self.schedule_mark_read(&msg.chat_id),
            Landing::Notified => self.schedule_dismiss(&msg.id),
            _ => {}
        }
        Ok(())
    }

    fn schedule_dismiss(&self, message_id: &str) {
        let weak = Arc::downgrade(&self.inner);
        let message_id = message_id.to_string();
        self.inner
            .notification_dismiss
            .schedule(self.inner.config.notification_ttl, async move {
                if let Some(inner) = weak.upgrade() {
                    Reconciler { inner }.mutate(|s| {
                        if s.notification.as_ref().is_some_and(|n| n.message_id == message_id) {
                            s.notification = None;
                        }
                    });
                }
            });
    }

    fn apply_peer_typing(&self, chat_id: &str, typing: bool) {
        self.mutate(|s| {
            if s.is_active(chat_id) {
                s.peer_typing = typing;
            }
        });
    }

    fn apply_read_update(&self, update: &ReadUpdate) {
        let me = &self.inner.me.id;
        if update.user_id == *me {
            return;
        }
        let at = Utc::now();
        self.mutate(|s| {
            let Some(view) = s.open.as_mut() else {
                return;
            };
            if update.chat_id.as_deref().is_some_and(|id| id != view.chat_id) {
                return;
            }
            let marked = view.apply_read_receipt(&update.user_id, at, me);
            if marked > 0 {
                crate::log_debug!("{} read {} messages in {}", update.user_id, marked, view.chat_id);
            }
        });
    }
}

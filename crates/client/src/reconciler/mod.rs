//! Conversation state reconciler.
//!
//! Owns the in-memory model of chats, the open conversation, unread
//! counters, presence and friend requests. Directory responses, stream
//! pushes and local commands all funnel through one lock, and every
//! mutation bumps a revision on a `watch` channel so a presentation layer
//! can re-render.
//!
//! ```rust,ignore
//! let reconciler = Reconciler::new(me, directory, stream.clone(), config.sync);
//! reconciler.attach(&stream);
//! reconciler.load_initial().await?;
//!
//! let mut changes = reconciler.subscribe();
//! while changes.changed().await.is_ok() {
//!     let unread = reconciler.with_state(|s| s.chats.total_unread());
//!     // render...
//! }
//! ```

mod commands;
mod debounce;
mod events;
#[cfg(test)]
mod tests;

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use banter_shared::{Message, User};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::api_client::Directory;
use crate::config::SyncConfig;
use crate::stores::{ChatList, FriendRequests, OpenChat, Roster};
use crate::ws::{ConnectionState, EventKind, EventSink, EventStream};

pub use commands::Refresh;
pub use debounce::Debouncer;

/// Transient new-message notice for a chat that is not open.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub chat_id: String,
    pub message_id: String,
    pub sender_name: String,
    pub sender_avatar: Option<String>,
    pub preview: String,
    pub raised_at: DateTime<Utc>,
}

impl Notification {
    fn for_message(msg: &Message) -> Self {
        Self {
            chat_id: msg.chat_id.clone(),
            message_id: msg.id.clone(),
            sender_name: msg.sender.username.clone(),
            sender_avatar: msg.sender.avatar.clone(),
            preview: msg.preview(),
            raised_at: Utc::now(),
        }
    }
}

/// Group-creation dialog state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupDraft {
    pub name: String,
    pub members: Vec<String>,
}

impl GroupDraft {
    /// Add the user if absent, remove if present.
    pub fn toggle_member(&mut self, user_id: &str) {
        if let Some(pos) = self.members.iter().position(|id| id == user_id) {
            self.members.remove(pos);
        } else {
            self.members.push(user_id.to_string());
        }
    }

    pub fn clear(&mut self) {
        self.name.clear();
        self.members.clear();
    }
}

/// Everything the presentation layer renders.
#[derive(Debug, Clone, Default)]
pub struct ChatState {
    pub chats: ChatList,
    /// The active chat's messages; `None` when no chat is selected.
    pub open: Option<OpenChat>,
    pub roster: Roster,
    pub requests: FriendRequests,
    pub composer: String,
    /// Whether we have announced `typing` for the active chat.
    pub is_typing: bool,
    /// Whether the other side of the active chat is typing.
    pub peer_typing: bool,
    pub notification: Option<Notification>,
    pub group_draft: GroupDraft,
    pub connection: ConnectionState,
    /// Bumped on every selection so late failures can tell they were overtaken.
    selection: u64,
}

impl ChatState {
    pub fn active_chat_id(&self) -> Option<&str> {
        self.open.as_ref().map(|v| v.chat_id.as_str())
    }

    pub fn is_active(&self, chat_id: &str) -> bool {
        self.active_chat_id() == Some(chat_id)
    }
}

struct Inner {
    me: User,
    directory: Arc<dyn Directory>,
    stream: Arc<dyn EventSink>,
    config: SyncConfig,
    state: Mutex<ChatState>,
    changes: watch::Sender<u64>,
    typing_stop: Debouncer,
    notification_dismiss: Debouncer,
    mark_read: Debouncer,
    /// Refresh and resync tasks started from stream handlers.
    background: Mutex<Vec<AbortHandle>>,
}

/// Cheap to clone; all clones share one state.
#[derive(Clone)]
pub struct Reconciler {
    inner: Arc<Inner>,
}

impl Reconciler {
    pub fn new(
        me: User,
        directory: Arc<dyn Directory>,
        stream: Arc<dyn EventSink>,
        config: SyncConfig,
    ) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                me,
                directory,
                stream,
                config,
                state: Mutex::new(ChatState::default()),
                changes,
                typing_stop: Debouncer::default(),
                notification_dismiss: Debouncer::default(),
                mark_read: Debouncer::default(),
                background: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Route every stream event kind into [`Reconciler::apply_event`].
    ///
    /// Handlers hold a weak reference, so the stream never keeps the
    /// reconciler alive.
    pub fn attach(&self, stream: &EventStream) {
        for kind in EventKind::ALL {
            let weak = Arc::downgrade(&self.inner);
            stream.on(kind, move |event| match weak.upgrade() {
                Some(inner) => Reconciler { inner }.apply_event(event),
                None => Ok(()),
            });
        }
    }

    pub fn me(&self) -> &User {
        &self.inner.me
    }

    /// Revision counter, bumped after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.changes.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.inner.changes.borrow()
    }

    /// Read the state under the lock.
    pub fn with_state<R>(&self, f: impl FnOnce(&ChatState) -> R) -> R {
        let state = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    pub fn snapshot(&self) -> ChatState {
        self.with_state(ChatState::clone)
    }

    pub fn active_chat(&self) -> Option<String> {
        self.with_state(|s| s.active_chat_id().map(str::to_string))
    }

    pub fn unread(&self, chat_id: &str) -> u32 {
        self.with_state(|s| s.chats.unread(chat_id))
    }

    pub fn composer(&self) -> String {
        self.with_state(|s| s.composer.clone())
    }

    /// Discard all state, pending deferred actions and in-flight refreshes.
    pub fn reset(&self) {
        self.inner.typing_stop.cancel();
        self.inner.notification_dismiss.cancel();
        self.inner.mark_read.cancel();
        let background = std::mem::take(
            &mut *self.inner.background.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for handle in background {
            handle.abort();
        }
        self.mutate(|s| *s = ChatState::default());
    }

    /// Run `task` on its own tokio task, aborted by [`Reconciler::reset`].
    fn spawn_background<F, Fut>(&self, task: F)
    where
        F: FnOnce(Reconciler) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            if let Some(inner) = weak.upgrade() {
                task(Reconciler { inner }).await;
            }
        })
        .abort_handle();

        let mut background = self.inner.background.lock().unwrap_or_else(PoisonError::into_inner);
        background.retain(|h| !h.is_finished());
        background.push(handle);
    }

    /// Apply `f` under the lock and publish a new revision.
    fn mutate<R>(&self, f: impl FnOnce(&mut ChatState) -> R) -> R {
        let out = {
            let mut state = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut state)
        };
        self.inner.changes.send_modify(|rev| *rev += 1);
        out
    }

    fn emit_logged(&self, event: banter_shared::ClientEvent) {
        if let Err(e) = self.inner.stream.emit(event) {
            crate::log_warn!("Could not emit stream event: {}", e);
        }
    }
}

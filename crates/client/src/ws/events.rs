//! Typed stream events and the handler dispatch table.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use banter_shared::{ChatError, ServerEvent};

/// Everything a handler can observe on the event stream.
///
/// Transport transitions are synthesized by the connection task; the rest
/// are server pushes.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Connected,
    Disconnected,
    Reconnected,
    ReconnectFailed { attempts: u32 },
    Server(ServerEvent),
}

/// Dispatch key for [`StreamEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Disconnected,
    Reconnected,
    ReconnectFailed,
    UserOnline,
    UserOffline,
    MessageReceived,
    TypingStart,
    TypingStop,
    MessagesReadUpdate,
    FriendRequestReceived,
    FriendRequestAccepted,
}

impl EventKind {
    pub const ALL: [EventKind; 12] = [
        EventKind::Connected,
        EventKind::Disconnected,
        EventKind::Reconnected,
        EventKind::ReconnectFailed,
        EventKind::UserOnline,
        EventKind::UserOffline,
        EventKind::MessageReceived,
        EventKind::TypingStart,
        EventKind::TypingStop,
        EventKind::MessagesReadUpdate,
        EventKind::FriendRequestReceived,
        EventKind::FriendRequestAccepted,
    ];
}

impl StreamEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            StreamEvent::Connected => EventKind::Connected,
            StreamEvent::Disconnected => EventKind::Disconnected,
            StreamEvent::Reconnected => EventKind::Reconnected,
            StreamEvent::ReconnectFailed { .. } => EventKind::ReconnectFailed,
            StreamEvent::Server(event) => match event {
                ServerEvent::UserOnline(_) => EventKind::UserOnline,
                ServerEvent::UserOffline(_) => EventKind::UserOffline,
                ServerEvent::MessageReceived(_) => EventKind::MessageReceived,
                ServerEvent::Typing(_) => EventKind::TypingStart,
                ServerEvent::StopTyping(_) => EventKind::TypingStop,
                ServerEvent::MessagesReadUpdate(_) => EventKind::MessagesReadUpdate,
                ServerEvent::FriendRequestReceived(_) => EventKind::FriendRequestReceived,
                ServerEvent::FriendRequestAcceptedNotification(_) => {
                    EventKind::FriendRequestAccepted
                }
            },
        }
    }
}

pub type Handler = Arc<dyn Fn(&StreamEvent) -> Result<(), ChatError> + Send + Sync>;

/// Handlers keyed by event kind, invoked in registration order.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<EventKind, Vec<Handler>>>,
}

impl HandlerRegistry {
    pub fn register(&self, kind: EventKind, handler: Handler) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        handlers.entry(kind).or_default().push(handler);
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers.get(&kind).map(Vec::len).unwrap_or(0)
    }

    /// Run every handler for the event's kind.
    ///
    /// A failing handler drops only this event for itself; the remaining
    /// handlers still run.
    pub fn dispatch(&self, event: &StreamEvent) {
        let kind = event.kind();
        let targets: Vec<Handler> = {
            let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
            handlers.get(&kind).cloned().unwrap_or_default()
        };
        for handler in targets {
            if let Err(e) = handler(event) {
                crate::log_warn!("Handler for {:?} dropped event: {}", kind, e);
            }
        }
    }
}

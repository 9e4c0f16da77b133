//! The event stream handle owned by a session.

use std::sync::{Arc, Mutex, PoisonError};

use banter_shared::{ChatError, ClientEvent, WsEnvelope};
use futures_channel::mpsc::{unbounded, UnboundedSender};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::connection::runner::Runner;
use super::connection::{ConnectionState, ReconnectConfig};
use super::events::{EventKind, HandlerRegistry, StreamEvent};

/// Outbound half of the event stream, as seen by the reconciler.
pub trait EventSink: Send + Sync {
    /// Queue a client event. Fails with [`ChatError::StreamDisconnected`]
    /// when no connection exists.
    fn emit(&self, event: ClientEvent) -> Result<(), ChatError>;

    fn is_connected(&self) -> bool;
}

/// A live connection task and the queue feeding it.
struct Link {
    identity: String,
    sender: UnboundedSender<WsEnvelope<ClientEvent>>,
    task: JoinHandle<()>,
}

/// Auto-reconnecting push channel.
///
/// Handlers belong to the stream, so they survive any number of
/// `connect` calls and reconnects.
pub struct EventStream {
    url: String,
    reconnect: ReconnectConfig,
    registry: Arc<HandlerRegistry>,
    state: Arc<watch::Sender<ConnectionState>>,
    link: Mutex<Option<Link>>,
}

impl EventStream {
    pub fn new(url: impl Into<String>, reconnect: ReconnectConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            url: url.into(),
            reconnect,
            registry: Arc::new(HandlerRegistry::default()),
            state: Arc::new(state),
            link: Mutex::new(None),
        }
    }

    /// Open the channel and announce `identity`.
    ///
    /// A live link for the same identity is kept; anything else is replaced.
    /// Must be called from within a tokio runtime.
    pub fn connect(&self, identity: &str) {
        let mut link = self.link.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(current) = link.as_ref() {
            if current.identity == identity
                && !current.task.is_finished()
                && !self.state.borrow().is_failed()
            {
                crate::log_debug!("Event stream already open for {}", identity);
                return;
            }
        }
        if let Some(old) = link.take() {
            crate::log_info!("Replacing event stream link for {}", old.identity);
            old.task.abort();
        }

        let (sender, outbound) = unbounded();
        let runner = Runner {
            url: self.url.clone(),
            identity: identity.to_string(),
            reconnect: self.reconnect.clone(),
            outbound,
            registry: self.registry.clone(),
            state: self.state.clone(),
        };
        let task = tokio::spawn(runner.run());
        *link = Some(Link {
            identity: identity.to_string(),
            sender,
            task,
        });
    }

    /// Register a handler for one event kind.
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&StreamEvent) -> Result<(), ChatError> + Send + Sync + 'static,
    {
        self.registry.register(kind, Arc::new(handler));
    }

    /// Tear down the channel. Safe to call repeatedly.
    pub fn disconnect(&self) {
        let taken = self
            .link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(link) = taken {
            crate::log_info!("Disconnecting event stream for {}", link.identity);
            link.task.abort();
        }
        self.state.send_replace(ConnectionState::Disconnected);
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl EventSink for EventStream {
    fn emit(&self, event: ClientEvent) -> Result<(), ChatError> {
        let link = self.link.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(link) = link.as_ref() else {
            return Err(ChatError::StreamDisconnected);
        };
        link.sender
            .unbounded_send(WsEnvelope::new(event))
            .map_err(|_| ChatError::StreamDisconnected)
    }

    fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.disconnect();
    }
}

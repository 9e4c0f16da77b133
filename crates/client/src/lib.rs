//! Banter client - synchronization engine for the banter chat service
//!
//! This crate keeps a local model of chats, messages, presence and friend
//! requests in step with the backend's REST surface and its WebSocket
//! event stream. A presentation layer reads state from the
//! [`Reconciler`] and drives it with commands.

pub mod api_client;
pub mod config;
pub mod engine;
pub mod logging;
pub mod reconciler;
pub mod session;
pub mod storage;
pub mod stores;
pub mod ws;

pub use api_client::{ApiClient, Directory};
pub use config::{ClientConfig, SyncConfig};
pub use engine::{ActiveSession, ChatEngine};
pub use reconciler::{ChatState, Reconciler};
pub use session::SessionStore;
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use ws::{ConnectionState, EventKind, EventSink, EventStream, StreamEvent};

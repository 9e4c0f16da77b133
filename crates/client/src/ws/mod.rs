//! Event stream for real-time pushes from the chat backend.
//!
//! This module provides:
//! - Connection management with fixed-delay auto-reconnect
//! - A `setup` handshake re-issued on every (re)connect
//! - Typed dispatch of pushes to registered handlers
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │               EventStream                │
//! │  (handler registry, outbound queue)      │
//! └──────────────────────────────────────────┘
//!                      │ spawns
//!                      ▼
//!             ┌─────────────────┐
//!             │     Runner      │
//!             │ connect, setup, │
//!             │ pump, reconnect │
//!             └─────────────────┘
//!                      │ dispatch
//!                      ▼
//!             ┌─────────────────┐
//!             │ HandlerRegistry │──▶ Reconciler
//!             └─────────────────┘
//! ```

mod connection;
mod events;
mod stream;

pub use connection::{ConnectionState, ReconnectConfig};
pub use events::{EventKind, Handler, HandlerRegistry, StreamEvent};
pub use stream::{EventSink, EventStream};

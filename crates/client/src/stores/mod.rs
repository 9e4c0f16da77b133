//! In-memory stores that make up the reconciler's state.

pub mod chats;
pub mod friends;
pub mod messages;
pub mod presence;

pub use chats::{ChatList, Recorded};
pub use friends::FriendRequests;
pub use messages::OpenChat;
pub use presence::Roster;

//! Protocol module
//!
//! JSON event protocol spoken over WebSocket text frames. Every frame is an
//! envelope of the form `{"event": "<name>", "data": <payload>}`:
//! - `inbound` - client events and their decoding
//! - `outbound` - server events and their encoding

pub mod inbound;
pub mod outbound;

pub use inbound::ClientEvent;
pub use outbound::{Frame, ServerEvent};

/// Inbound event names
pub mod events {
    pub const USER_JOIN: &str = "user:join";
    pub const USER_MOVE: &str = "user:move";
    pub const ITEM_COLLECT: &str = "item:collect";
    pub const ITEM_PICKUP: &str = "item:pickup";
    pub const ITEM_DROP: &str = "item:drop";
    pub const ITEM_USE: &str = "item:use";
    pub const ITEM_UNUSE: &str = "item:unuse";
    pub const CHAT_MESSAGE: &str = "chat:message";

    pub const ITEMS_UPDATE: &str = "items:update";
    pub const USERS_UPDATE: &str = "users:update";
    pub const SESSION_WELCOME: &str = "session:welcome";
}

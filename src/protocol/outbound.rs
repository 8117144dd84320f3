//! Outbound server events

use std::sync::Arc;

use serde::Serialize;

use super::events;
use crate::error::ProtocolError;
use crate::game::item::{Item, Position, WorldItem};
use crate::game::user::{ChatMessage, Stats, User, UserId};

/// An encoded text frame, shared between every session it is sent to
pub type Frame = Arc<str>;

/// A user as it appears in a users snapshot
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView<'a> {
    pub id: UserId,
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<&'a str>,
    pub position: Position,
    pub inventory: &'a [Item],
    pub stats: Stats,
    pub active_item: Option<&'a Item>,
    pub latest_message: Option<&'a ChatMessage>,
}

impl<'a> From<&'a User> for UserView<'a> {
    fn from(user: &'a User) -> Self {
        Self {
            id: user.id,
            name: &user.name,
            avatar: user.avatar.as_deref(),
            position: user.position,
            inventory: &user.inventory,
            stats: user.stats,
            active_item: user.active(),
            latest_message: user.latest_message.as_ref(),
        }
    }
}

/// An event sent from the server
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent<'a> {
    /// Every item currently in the world
    #[serde(rename = "items:update")]
    ItemsUpdate(Vec<&'a WorldItem>),
    /// Every connected user
    #[serde(rename = "users:update")]
    UsersUpdate(Vec<UserView<'a>>),
    /// A single chat line
    #[serde(rename = "chat:message")]
    ChatMessage(&'a ChatMessage),
    /// Tells a new session which user id it acts as
    #[serde(rename = "session:welcome", rename_all = "camelCase")]
    Welcome { user_id: UserId },
}

impl ServerEvent<'_> {
    /// Event name on the wire
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::ItemsUpdate(_) => events::ITEMS_UPDATE,
            ServerEvent::UsersUpdate(_) => events::USERS_UPDATE,
            ServerEvent::ChatMessage(_) => events::CHAT_MESSAGE,
            ServerEvent::Welcome { .. } => events::SESSION_WELCOME,
        }
    }

    /// Serialize into a shareable text frame
    pub fn encode(&self) -> Result<Frame, ProtocolError> {
        serde_json::to_string(self)
            .map(Frame::from)
            .map_err(|e| ProtocolError::Encode {
                event: self.name(),
                reason: e.to_string(),
            })
    }

    /// The event's payload as a JSON value, without the envelope
    pub fn payload(&self) -> Result<serde_json::Value, ProtocolError> {
        let encode_error = |e: serde_json::Error| ProtocolError::Encode {
            event: self.name(),
            reason: e.to_string(),
        };
        match serde_json::to_value(self).map_err(encode_error)? {
            serde_json::Value::Object(mut envelope) => {
                Ok(envelope.remove("data").unwrap_or(serde_json::Value::Null))
            }
            _ => Err(ProtocolError::Encode {
                event: self.name(),
                reason: "event did not serialize to an object".to_string(),
            }),
        }
    }
}

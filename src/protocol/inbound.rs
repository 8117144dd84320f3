//! Inbound client events
//!
//! Decoding is two-step: the envelope is parsed first so that an unknown
//! event name can be told apart from a known event with a bad payload.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::events;
use crate::error::ProtocolError;
use crate::game::handlers::{ChatRequest, JoinProfile};
use crate::game::item::{ItemId, Position};
use crate::game::user::UserId;

/// Raw `{event, data}` envelope
#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Decode the payload of an envelope for the named event
fn decode_payload<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|e| ProtocolError::MalformedPayload {
        event: event.to_string(),
        reason: e.to_string(),
    })
}

/// `user:join` payload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPayload {
    /// Optional id claimed by the client; must match the session when present
    pub id: Option<UserId>,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub position: Option<Position>,
}

/// `user:move` payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovePayload {
    pub user_id: UserId,
    pub position: Position,
}

/// `item:pickup`, `item:collect` and `item:use` payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPayload {
    pub user_id: UserId,
    pub item_id: ItemId,
}

/// `item:drop` payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropPayload {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub position: Position,
}

/// `item:unuse` payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnusePayload {
    pub user_id: UserId,
}

/// `chat:message` payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    pub user_id: UserId,
    pub message: String,
    pub name: Option<String>,
    /// Client clock; an RFC 3339 string or epoch milliseconds
    pub timestamp: Option<Value>,
    pub avatar: Option<String>,
}

/// Normalize a client-supplied chat timestamp
///
/// Strings pass through and integer epoch milliseconds become RFC 3339.
/// Anything else yields `None`, and the server clock is used instead.
fn client_timestamp(value: Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text),
        Value::Number(number) => number
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        _ => None,
    }
}

/// A decoded client event
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Join(JoinPayload),
    Move(MovePayload),
    Pickup(ItemPayload),
    Drop(DropPayload),
    Use(ItemPayload),
    Unuse(UnusePayload),
    Chat(ChatPayload),
}

impl ClientEvent {
    /// Decode a text frame
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))?;

        let Envelope { event, data } = envelope;
        match event.as_str() {
            // A bare `{"event": "user:join"}` joins with an empty profile
            events::USER_JOIN if data.is_null() => Ok(Self::Join(JoinPayload::default())),
            events::USER_JOIN => decode_payload(&event, data).map(Self::Join),
            events::USER_MOVE => decode_payload(&event, data).map(Self::Move),
            events::ITEM_PICKUP | events::ITEM_COLLECT => {
                decode_payload(&event, data).map(Self::Pickup)
            }
            events::ITEM_DROP => decode_payload(&event, data).map(Self::Drop),
            events::ITEM_USE => decode_payload(&event, data).map(Self::Use),
            events::ITEM_UNUSE => decode_payload(&event, data).map(Self::Unuse),
            events::CHAT_MESSAGE => decode_payload(&event, data).map(Self::Chat),
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }

    /// Event name, for logging
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Join(_) => events::USER_JOIN,
            ClientEvent::Move(_) => events::USER_MOVE,
            ClientEvent::Pickup(_) => events::ITEM_PICKUP,
            ClientEvent::Drop(_) => events::ITEM_DROP,
            ClientEvent::Use(_) => events::ITEM_USE,
            ClientEvent::Unuse(_) => events::ITEM_UNUSE,
            ClientEvent::Chat(_) => events::CHAT_MESSAGE,
        }
    }

    /// The user id the client claims to act as
    pub fn claimed_user(&self) -> Option<UserId> {
        match self {
            ClientEvent::Join(p) => p.id,
            ClientEvent::Move(p) => Some(p.user_id),
            ClientEvent::Pickup(p) | ClientEvent::Use(p) => Some(p.user_id),
            ClientEvent::Drop(p) => Some(p.user_id),
            ClientEvent::Unuse(p) => Some(p.user_id),
            ClientEvent::Chat(p) => Some(p.user_id),
        }
    }

    /// Reject events that claim to act as a different user than the session
    pub fn verify_user(&self, session: UserId) -> Result<(), ProtocolError> {
        match self.claimed_user() {
            Some(claimed) if claimed != session => {
                Err(ProtocolError::UserMismatch { claimed, session })
            }
            _ => Ok(()),
        }
    }
}

impl From<JoinPayload> for JoinProfile {
    fn from(payload: JoinPayload) -> Self {
        Self {
            name: payload.name,
            avatar: payload.avatar,
            position: payload.position,
        }
    }
}

impl From<ChatPayload> for ChatRequest {
    fn from(payload: ChatPayload) -> Self {
        Self {
            user_id: payload.user_id,
            message: payload.message,
            name: payload.name,
            timestamp: payload.timestamp.and_then(client_timestamp),
            avatar: payload.avatar,
        }
    }
}

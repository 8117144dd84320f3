//! User definitions
//!
//! A user is keyed by the id of the session that joined it.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::item::{Item, ItemId, Position};

/// User identifier (always equal to the owning session's id)
pub type UserId = Uuid;

/// Display name used when a client does not supply one
pub const DEFAULT_DISPLAY_NAME: &str = "Unknown User";

/// Experience and level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub xp: u32,
    pub level: u32,
}

impl Default for Stats {
    fn default() -> Self {
        Self { xp: 0, level: 1 }
    }
}

/// A chat line, normalized on receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub user_id: UserId,
    pub name: String,
    pub message: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl ChatMessage {
    /// Build a message, filling in the default name and the current time
    pub fn normalized(
        user_id: UserId,
        message: String,
        name: Option<String>,
        timestamp: Option<String>,
        avatar: Option<String>,
    ) -> Self {
        Self {
            user_id,
            name: name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string()),
            message,
            timestamp: timestamp
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            avatar,
        }
    }
}

/// A connected participant
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub avatar: Option<String>,
    pub position: Position,
    /// Held items, in pickup order
    pub inventory: Vec<Item>,
    pub stats: Stats,
    /// Always refers to an item in `inventory`
    pub active_item: Option<ItemId>,
    pub latest_message: Option<ChatMessage>,
}

impl User {
    /// Create a user with an empty inventory and default stats
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            avatar: None,
            position: Position::default(),
            inventory: Vec::new(),
            stats: Stats::default(),
            active_item: None,
            latest_message: None,
        }
    }

    /// Index of an item in the inventory
    pub fn find_item(&self, item_id: &str) -> Option<usize> {
        self.inventory.iter().position(|item| item.id == item_id)
    }

    /// Check whether the user holds an item
    pub fn holds(&self, item_id: &str) -> bool {
        self.find_item(item_id).is_some()
    }

    /// The active item, resolved against the inventory
    pub fn active(&self) -> Option<&Item> {
        let active_id = self.active_item.as_deref()?;
        self.inventory.iter().find(|item| item.id == active_id)
    }
}

//! Item definitions
//!
//! An item lives in exactly one of two places: on the ground as a
//! [`WorldItem`] (which carries a position), or inside one user's inventory
//! as a bare [`Item`] (which does not). Moving between the two never touches
//! the descriptive fields.

use serde::{Deserialize, Serialize};

/// Catalog-assigned item identifier, stable for the lifetime of the process
pub type ItemId = String;

/// A point in world space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    /// Create a new position
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Identity and descriptive fields of an item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub icon: String,
    pub effect: String,
    #[serde(rename = "type")]
    pub item_type: String,
}

impl Item {
    /// Create a new item
    pub fn new(
        id: impl Into<ItemId>,
        name: impl Into<String>,
        icon: impl Into<String>,
        effect: impl Into<String>,
        item_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            icon: icon.into(),
            effect: effect.into(),
            item_type: item_type.into(),
        }
    }

    /// Place this item in the world
    pub fn place(self, position: Position) -> WorldItem {
        WorldItem {
            item: self,
            position,
        }
    }
}

/// An unowned item lying in the world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldItem {
    #[serde(flatten)]
    pub item: Item,
    pub position: Position,
}

impl WorldItem {
    /// Item identifier
    pub fn id(&self) -> &str {
        &self.item.id
    }

    /// Strip the position, yielding the item as it is held in an inventory
    pub fn take(self) -> Item {
        self.item
    }
}
